//! Forward handler (C5): rewrites the outgoing request and invokes the
//! reverse proxy, buffered (with a bounded network retry) or streaming.

use crate::context::{context_snapshot, with_context_mut, RequestContext};
use crate::error::GatewayError;
use crate::route::{ForwardTarget, ProxyRoute};
use crate::transport::{self, TransportConfig};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, warn};
use std::str::FromStr;
use url::Url;

pub const FORWARD_HEADER: &str = "x-gobis-forward";
pub const USERNAME_HEADER: &str = "x-gobis-username";
pub const GROUPS_HEADER: &str = "x-gobis-groups";

/// Builds the outgoing request for `route` against `req`/`body`, sends it
/// through a freshly-built per-route transport, and returns the gateway's
/// HTTP response. This is the innermost link of the middleware chain.
pub async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    route: &ProxyRoute,
) -> Result<HttpResponse, GatewayError> {
    if let ForwardTarget::Handler(_) = &route.target {
        // Handlers are invoked directly by the router/middleware wiring
        // layer (they need the raw `ServiceRequest`, not a built response);
        // reaching this function with a Handler target is a wiring bug.
        return Err(GatewayError::Internal(
            "forward() called for a route with an in-process handler".into(),
        ));
    }

    let ctx = context_snapshot(&req);
    let incoming_url = request_url(&req);
    let header_value = forwarded_header_value(&req, route);

    let upstream = route
        .upstream_url(&incoming_url, header_value.as_deref())?;

    let outgoing_url = compose_outgoing_url(&incoming_url, &upstream, &ctx);

    let transport_cfg = TransportConfig {
        http_proxy: route.http_proxy.clone(),
        https_proxy: route.https_proxy.clone(),
        no_proxy: route.no_proxy,
        insecure_skip_verify: route.insecure_skip_verify,
    };
    let client = transport::build_client(&transport_cfg)
        .map_err(|e| GatewayError::Internal(format!("building transport: {e}")))?;

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| GatewayError::Internal(format!("invalid method: {e}")))?;

    let mut headers = convert_headers(req.headers());
    apply_dirty_headers(&mut headers, &ctx);
    transport::scrub_headers(
        &mut headers,
        &route.sensitive_headers,
        route.remove_proxy_headers,
    );
    stamp_context_headers(&mut headers, &ctx);
    if let Some((user, pass)) = upstream_userinfo(&upstream) {
        if let Ok(value) = basic_auth_header(&user, pass.as_deref()) {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
    }

    debug!(
        "route '{}': forwarding {} {} -> {}",
        route.name,
        method,
        incoming_url.path(),
        outgoing_url
    );

    if route.no_buffer {
        send_once(&client, method, outgoing_url, headers, body).await
    } else {
        send_with_retry(&client, method, outgoing_url, headers, body).await
    }
}

async fn send_once(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: Url,
    headers: reqwest::header::HeaderMap,
    body: web::Bytes,
) -> Result<HttpResponse, GatewayError> {
    let resp = client
        .request(method, url.clone())
        .headers(headers)
        .body(body.to_vec())
        .send()
        .await
        .map_err(|e| classify(&url, e))?;
    to_actix_response(resp).await
}

/// Buffered mode retries once on a network-layer error (connect or
/// timeout), never on a non-2xx upstream response and never when streaming.
async fn send_with_retry(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: Url,
    headers: reqwest::header::HeaderMap,
    body: web::Bytes,
) -> Result<HttpResponse, GatewayError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = client
            .request(method.clone(), url.clone())
            .headers(headers.clone())
            .body(body.to_vec())
            .send()
            .await;
        match result {
            Ok(resp) => return to_actix_response(resp).await,
            Err(e) if attempts < 2 && (e.is_connect() || e.is_timeout()) => {
                warn!("retrying forward to {url} after network error: {e}");
                continue;
            }
            Err(e) => return Err(classify(&url, e)),
        }
    }
}

fn classify(url: &Url, e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout {
            url: url.to_string(),
            timeout_secs: 30,
        }
    } else {
        GatewayError::Upstream {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

async fn to_actix_response(resp: reqwest::Response) -> Result<HttpResponse, GatewayError> {
    let status = actix_web::http::StatusCode::from_u16(resp.status().as_u16())
        .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);
    for (name, value) in resp.headers().iter() {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder.insert_header((n, v));
        }
    }
    builder.insert_header((FORWARD_HEADER, "true"));
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| GatewayError::Upstream {
            url: String::new(),
            message: e.to_string(),
        })?;
    Ok(builder.body(bytes))
}

fn request_url(req: &HttpRequest) -> Url {
    let conn = req.connection_info();
    let raw = format!("{}://{}{}", conn.scheme(), conn.host(), req.uri());
    Url::parse(&raw).unwrap_or_else(|_| Url::parse("http://invalid.local/").unwrap())
}

fn forwarded_header_value(req: &HttpRequest, route: &ProxyRoute) -> Option<String> {
    if let ForwardTarget::ForwardedHeader { header, .. } = &route.target {
        req.headers()
            .get(header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    } else {
        None
    }
}

/// Builds the outgoing URL: upstream scheme/host, path = upstream path +
/// rest-path (trailing `/` trimmed), query merged additively.
fn compose_outgoing_url(incoming: &Url, upstream: &Url, ctx: &RequestContext) -> Url {
    let mut outgoing = upstream.clone();
    let rest_path = ctx.path();
    let mut path = upstream.path().trim_end_matches('/').to_string();
    if !rest_path.is_empty() {
        path.push('/');
        path.push_str(rest_path.trim_start_matches('/'));
    }
    if path.is_empty() {
        path.push('/');
    }
    outgoing.set_path(&path);

    let mut pairs: Vec<(String, String)> = incoming
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.extend(
        upstream
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned())),
    );
    if pairs.is_empty() {
        outgoing.set_query(None);
    } else {
        outgoing
            .query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    outgoing
}

fn upstream_userinfo(upstream: &Url) -> Option<(String, Option<String>)> {
    if upstream.username().is_empty() {
        return None;
    }
    Some((
        upstream.username().to_string(),
        upstream.password().map(|p| p.to_string()),
    ))
}

fn basic_auth_header(
    user: &str,
    pass: Option<&str>,
) -> Result<HeaderValueR, reqwest::header::InvalidHeaderValue> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    let credentials = format!("{}:{}", user, pass.unwrap_or(""));
    let encoded = STANDARD.encode(credentials);
    reqwest::header::HeaderValue::from_str(&format!("Basic {encoded}"))
}

type HeaderValueR = reqwest::header::HeaderValue;

fn convert_headers(src: &actix_web::http::header::HeaderMap) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::new();
    for (name, value) in src.iter() {
        if let (Ok(n), Ok(v)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(n, v);
        }
    }
    out
}

/// Applies the request's dirty-header map: empty restore-value deletes the
/// header, non-empty sets it back to that value.
fn apply_dirty_headers(headers: &mut reqwest::header::HeaderMap, ctx: &RequestContext) {
    for (name, restore) in ctx.dirty_headers() {
        let Ok(header_name) = reqwest::header::HeaderName::from_str(name) else {
            continue;
        };
        if restore.is_empty() {
            headers.remove(&header_name);
        } else if let Ok(value) = reqwest::header::HeaderValue::from_str(restore) {
            headers.insert(header_name, value);
        }
    }
}

fn stamp_context_headers(headers: &mut reqwest::header::HeaderMap, ctx: &RequestContext) {
    headers.insert(
        reqwest::header::HeaderName::from_static(USERNAME_HEADER),
        reqwest::header::HeaderValue::from_str(ctx.username().unwrap_or("")).unwrap(),
    );
    let groups = ctx.groups().join(",");
    headers.insert(
        reqwest::header::HeaderName::from_static(GROUPS_HEADER),
        reqwest::header::HeaderValue::from_str(&groups).unwrap(),
    );
    headers.insert(
        reqwest::header::HeaderName::from_static(FORWARD_HEADER),
        reqwest::header::HeaderValue::from_static("true"),
    );
}

/// Stamps the response with the loop-breaker header, mirroring
/// `stamp_context_headers`'s request-side marking.
pub fn mark_forwarded_response(resp: &mut HttpResponse) {
    resp.headers_mut().insert(
        HeaderName::from_static(FORWARD_HEADER),
        HeaderValue::from_static("true"),
    );
}

/// Convenience used by tests and the outer chain wrapper to pre-seed a
/// request's context before dispatching.
pub fn seed_context(req: &HttpRequest, f: impl FnOnce(&mut RequestContext)) {
    with_context_mut(req, f);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_merge_is_additive() {
        let incoming = Url::parse("http://gw/?k1=v1").unwrap();
        let upstream = Url::parse("http://up/?k2=v2").unwrap();
        let ctx = RequestContext::default();
        let outgoing = compose_outgoing_url(&incoming, &upstream, &ctx);
        let pairs: Vec<_> = outgoing.query_pairs().collect();
        assert!(pairs.iter().any(|(k, v)| k == "k1" && v == "v1"));
        assert!(pairs.iter().any(|(k, v)| k == "k2" && v == "v2"));
    }

    #[test]
    fn path_is_joined_and_trailing_slash_trimmed() {
        let incoming = Url::parse("http://gw/app/x/y").unwrap();
        let upstream = Url::parse("http://up/root/").unwrap();
        let mut ctx = RequestContext::default();
        ctx.set_path("x/y");
        let outgoing = compose_outgoing_url(&incoming, &upstream, &ctx);
        assert_eq!(outgoing.path(), "/root/x/y");
    }
}
