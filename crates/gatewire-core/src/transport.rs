//! RouteTransport (C4): per-route `reqwest::Client` construction with
//! sensitive/proxy header scrubbing, per-scheme forward-proxy selection,
//! and a TLS-verify toggle.

use ahash::HashSet as AHashSet;
use once_cell::sync::OnceCell;
use reqwest::header::{HeaderMap, HeaderName};
use std::time::Duration;

const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);
const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_MAX_IDLE_CONNS: usize = 100;

/// The process-wide set of headers that sensitive-header stripping MUST
/// never remove, even when a route lists them. Write-once at handler
/// construction, read-only for the process's lifetime.
#[derive(Debug, Clone, Default)]
pub struct ProtectedHeaders(AHashSet<String>);

static PROTECTED_HEADERS: OnceCell<ProtectedHeaders> = OnceCell::new();

impl ProtectedHeaders {
    pub fn new(headers: impl IntoIterator<Item = String>) -> Self {
        Self(headers.into_iter().map(|h| h.to_ascii_lowercase()).collect())
    }

    fn contains(&self, header: &str) -> bool {
        self.0.contains(&header.to_ascii_lowercase())
    }
}

/// Publishes the process-wide protected-header set. Must be called before
/// the handler starts serving requests; subsequent calls are no-ops, since
/// this is a write-once/read-many global shared across every route.
pub fn set_protected_headers(headers: ProtectedHeaders) {
    let _ = PROTECTED_HEADERS.set(headers);
}

fn protected_headers() -> &'static ProtectedHeaders {
    static EMPTY: OnceCell<ProtectedHeaders> = OnceCell::new();
    PROTECTED_HEADERS
        .get()
        .unwrap_or_else(|| EMPTY.get_or_init(ProtectedHeaders::default))
}

const FORWARDED_HEADER_NAMES: [&str; 4] = [
    "x-forwarded-proto",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-server",
];

/// Computes the effective sensitive-header set for a route (its declared
/// `sensitive_headers` plus, if `remove_proxy_headers` is set, the four
/// `X-Forwarded-*` headers) and strips every one of them from `headers`
/// except those on the process-wide protected list.
pub fn scrub_headers(headers: &mut HeaderMap, sensitive: &[String], remove_proxy_headers: bool) {
    let protected = protected_headers();
    let mut effective: Vec<String> = sensitive.clone();
    if remove_proxy_headers {
        effective.extend(FORWARDED_HEADER_NAMES.iter().map(|h| h.to_string()));
    }
    for name in effective {
        if protected.contains(&name) {
            continue;
        }
        if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
            headers.remove(header_name);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: bool,
    pub insecure_skip_verify: bool,
}

/// Builds a `reqwest::Client` for a single route, honoring forward-proxy
/// selection (route override, else environment, else direct) and TLS
/// verification toggling, with conservative default timeouts.
pub fn build_client(cfg: &TransportConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(DEFAULT_DIAL_TIMEOUT)
        .tcp_keepalive(DEFAULT_KEEPALIVE)
        .pool_idle_timeout(DEFAULT_IDLE_TIMEOUT)
        .pool_max_idle_per_host(DEFAULT_MAX_IDLE_CONNS)
        .danger_accept_invalid_certs(cfg.insecure_skip_verify);

    builder = if cfg.no_proxy {
        builder.no_proxy()
    } else {
        builder = apply_scheme_proxy(builder, "http", cfg.http_proxy.as_deref())?;
        apply_scheme_proxy(builder, "https", cfg.https_proxy.as_deref())?
    };

    builder.build()
}

fn apply_scheme_proxy(
    builder: reqwest::ClientBuilder,
    scheme: &str,
    configured: Option<&str>,
) -> Result<reqwest::ClientBuilder, reqwest::Error> {
    let Some(raw) = configured else {
        // No per-route proxy: fall back to environment (HTTP_PROXY, HTTPS_PROXY,
        // NO_PROXY), which reqwest's default client already honors.
        return Ok(builder);
    };
    let proxy_url = normalize_proxy_url(raw);
    let proxy = match scheme {
        "https" => reqwest::Proxy::https(&proxy_url)?,
        _ => reqwest::Proxy::http(&proxy_url)?,
    };
    Ok(builder.proxy(proxy))
}

/// Parses a per-route proxy URL, retrying with an `http://` prefix if the
/// first parse doesn't carry an http(s) scheme.
fn normalize_proxy_url(raw: &str) -> String {
    if url::Url::parse(raw)
        .map(|u| u.scheme() == "http" || u.scheme() == "https")
        .unwrap_or(false)
    {
        raw.to_string()
    } else {
        format!("http://{raw}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_headers_are_scrubbed() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        scrub_headers(&mut headers, &["X-Api-Key".to_string()], false);
        assert!(!headers.contains_key("x-api-key"));
    }

    #[test]
    fn protected_headers_are_retained() {
        set_protected_headers(ProtectedHeaders::new(["x-request-id".to_string()]));
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "abc".parse().unwrap());
        scrub_headers(&mut headers, &["X-Request-Id".to_string()], false);
        assert!(headers.contains_key("x-request-id"));
    }

    #[test]
    fn remove_proxy_headers_strips_forwarded_set() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        scrub_headers(&mut headers, &[], true);
        assert!(!headers.contains_key("x-forwarded-for"));
    }

    #[test]
    fn proxy_url_without_scheme_gets_http_prefix() {
        assert_eq!(normalize_proxy_url("proxy.local:3128"), "http://proxy.local:3128");
        assert_eq!(normalize_proxy_url("https://proxy.local:3128"), "https://proxy.local:3128");
    }
}
