//! Declarative route model (C2).
//!
//! `ProxyRoute` is the configuration unit the router and middleware chain
//! are built from. Forwarding capability is a tagged `ForwardTarget`
//! (static URL / forwarded-header indirection / in-process handler) rather
//! than three optional fields checked in priority order.

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::path::PathMatcher;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use futures_util::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// An in-process handler that replaces reverse-proxy forwarding entirely.
pub type ForwardHandlerFn =
    Arc<dyn Fn(ServiceRequest) -> LocalBoxFuture<'static, Result<ServiceResponse, actix_web::Error>> + Send + Sync>;

#[derive(Clone)]
pub enum ForwardTarget {
    /// Static upstream URL.
    Url(Url),
    /// Upstream URL read per request from a header, with an optional
    /// static `Url` constraining host (and path, if non-empty).
    ForwardedHeader {
        header: String,
        constraint: Option<Url>,
    },
    /// An injected handler; `Url`/`ForwardedHeader` are never consulted.
    Handler(ForwardHandlerFn),
}

impl fmt::Debug for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardTarget::Url(u) => f.debug_tuple("Url").field(u).finish(),
            ForwardTarget::ForwardedHeader { header, constraint } => f
                .debug_struct("ForwardedHeader")
                .field("header", header)
                .field("constraint", constraint)
                .finish(),
            ForwardTarget::Handler(_) => write!(f, "Handler(..)"),
        }
    }
}

/// Wire-level declarative route record, decoded from JSON/YAML before
/// being validated into a [`ProxyRoute`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouteConfig {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub forwarded_header: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub sensitive_headers: Vec<String>,
    #[serde(default)]
    pub http_proxy: String,
    #[serde(default)]
    pub https_proxy: String,
    #[serde(default)]
    pub no_proxy: bool,
    #[serde(default)]
    pub no_buffer: bool,
    #[serde(default)]
    pub remove_proxy_headers: bool,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default)]
    pub middleware_params: serde_json::Value,
    #[serde(default)]
    pub show_error: bool,
    #[serde(default)]
    pub use_full_path: bool,
    #[serde(default)]
    pub options_passthrough: bool,
    #[serde(default)]
    pub hosts_passthrough: Vec<String>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// A validated, ready-to-serve route.
#[derive(Clone, Debug)]
pub struct ProxyRoute {
    pub name: String,
    pub path: PathMatcher,
    pub target: ForwardTarget,
    pub methods: Vec<String>,
    pub sensitive_headers: Vec<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: bool,
    pub no_buffer: bool,
    pub remove_proxy_headers: bool,
    pub insecure_skip_verify: bool,
    pub middleware_params: serde_json::Value,
    pub show_error: bool,
    pub use_full_path: bool,
    pub options_passthrough: bool,
    pub hosts_passthrough: crate::path::HostMatchers,
    pub routes: Vec<ProxyRoute>,
}

impl ProxyRoute {
    /// Validates and compiles a [`RouteConfig`] into a servable route:
    /// non-empty name/path, a forwarding target set, localhost upstream
    /// rejected, scheme required.
    pub fn check(cfg: RouteConfig) -> Result<Self, GatewayError> {
        if cfg.name.trim().is_empty() {
            return Err(GatewayError::Config("route name must not be empty".into()));
        }
        if cfg.path.trim().is_empty() {
            return Err(GatewayError::Config(format!(
                "route '{}': path must not be empty",
                cfg.name
            )));
        }
        let path = PathMatcher::new(&cfg.path)
            .map_err(|e| GatewayError::Config(format!("route '{}': {}", cfg.name, e)))?;

        if cfg.url.is_empty() && cfg.forwarded_header.is_empty() {
            return Err(GatewayError::Config(format!(
                "route '{}': neither url nor forwarded_header set",
                cfg.name
            )));
        }

        let url_constraint = if cfg.url.is_empty() {
            None
        } else {
            Some(parse_upstream_url(&cfg.name, &cfg.url)?)
        };

        let target = if !cfg.forwarded_header.is_empty() {
            ForwardTarget::ForwardedHeader {
                header: cfg.forwarded_header.clone(),
                constraint: url_constraint,
            }
        } else {
            ForwardTarget::Url(url_constraint.expect("url set, checked above"))
        };

        let hosts_passthrough = crate::path::HostMatchers::new(&cfg.hosts_passthrough)
            .map_err(|e| GatewayError::Config(format!("route '{}': {}", cfg.name, e)))?;

        let routes = cfg
            .routes
            .into_iter()
            .map(ProxyRoute::check)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProxyRoute {
            name: cfg.name,
            path,
            target,
            methods: cfg.methods,
            sensitive_headers: cfg.sensitive_headers,
            http_proxy: non_empty(cfg.http_proxy),
            https_proxy: non_empty(cfg.https_proxy),
            no_proxy: cfg.no_proxy,
            no_buffer: cfg.no_buffer,
            remove_proxy_headers: cfg.remove_proxy_headers,
            insecure_skip_verify: cfg.insecure_skip_verify,
            middleware_params: cfg.middleware_params,
            show_error: cfg.show_error,
            use_full_path: cfg.use_full_path,
            options_passthrough: cfg.options_passthrough,
            hosts_passthrough,
            routes,
        })
    }

    /// The literal prefix before any glob suffix; used as the mount prefix
    /// for nested routes.
    pub fn path_as_start_path(&self) -> &str {
        self.path.app_path()
    }

    /// Injects a forward handler in place of reverse-proxy forwarding.
    pub fn with_handler(mut self, handler: ForwardHandlerFn) -> Self {
        self.target = ForwardTarget::Handler(handler);
        self
    }

    /// Resolves the effective upstream URL for `req`.
    pub fn upstream_url(
        &self,
        req_url: &Url,
        header_value: Option<&str>,
    ) -> Result<Url, GatewayError> {
        match &self.target {
            ForwardTarget::Handler(_) => {
                let mut url = req_url.clone();
                if !self.use_full_path {
                    url.set_path("");
                }
                Ok(url)
            }
            ForwardTarget::ForwardedHeader { constraint, .. } => {
                if let Some(raw) = header_value {
                    let mut url = Url::parse(raw).map_err(|e| {
                        GatewayError::Config(format!("invalid forwarded_header url: {e}"))
                    })?;
                    if self.use_full_path {
                        let prefixed = format!(
                            "{}{}",
                            self.path_as_start_path(),
                            url.path()
                        );
                        url.set_path(&prefixed);
                    } else {
                        url.set_path("");
                    }
                    Ok(url)
                } else if let Some(url) = constraint {
                    Ok(url.clone())
                } else {
                    Err(GatewayError::Config(format!(
                        "route '{}': forwarded_header missing and no url fallback",
                        self.name
                    )))
                }
            }
            ForwardTarget::Url(url) => {
                let mut url = url.clone();
                if self.use_full_path {
                    let prefixed = format!("{}{}", self.path_as_start_path(), url.path());
                    url.set_path(&prefixed);
                }
                Ok(url)
            }
        }
    }

    /// The path used for routing decisions: the forwarded-header URL's
    /// path when present, else the request's own path.
    pub fn request_path<'a>(&self, req_path: &'a str, header_value: Option<&'a str>) -> String {
        if let ForwardTarget::ForwardedHeader { .. } = &self.target {
            if let Some(raw) = header_value {
                if let Ok(url) = Url::parse(raw) {
                    return url.path().to_string();
                }
            }
        }
        req_path.to_string()
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_upstream_url(route_name: &str, raw: &str) -> Result<Url, GatewayError> {
    let url = Url::parse(raw)
        .map_err(|e| GatewayError::Config(format!("route '{route_name}': invalid url: {e}")))?;
    if url.scheme().is_empty() {
        return Err(GatewayError::Config(format!(
            "route '{route_name}': url missing scheme"
        )));
    }
    match url.host_str() {
        Some("localhost") | Some("127.0.0.1") => {
            return Err(GatewayError::Config(format!(
                "route '{route_name}': upstream host must not be localhost"
            )))
        }
        None => {
            return Err(GatewayError::Config(format!(
                "route '{route_name}': url missing host"
            )))
        }
        _ => {}
    }
    Ok(url)
}

/// Convenience accessor mirroring `RequestContext::set_route_name`, used by
/// the router immediately after a match.
pub fn stamp_route_name(req: &actix_web::HttpRequest, route: &ProxyRoute) {
    crate::context::with_context_mut(req, |ctx: &mut RequestContext| {
        ctx.set_route_name(route.name.clone());
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_cfg(name: &str, path: &str, url: &str) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            path: path.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_empty_name() {
        let cfg = minimal_cfg("", "/app/**", "http://up");
        assert!(ProxyRoute::check(cfg).is_err());
    }

    #[test]
    fn rejects_missing_target() {
        let cfg = RouteConfig {
            name: "a".into(),
            path: "/app/**".into(),
            ..Default::default()
        };
        assert!(ProxyRoute::check(cfg).is_err());
    }

    #[test]
    fn rejects_localhost_upstream() {
        let cfg = minimal_cfg("a", "/app/**", "http://localhost:8080");
        assert!(ProxyRoute::check(cfg).is_err());
    }

    #[test]
    fn accepts_valid_route() {
        let cfg = minimal_cfg("a", "/app/**", "http://up.example.com");
        let route = ProxyRoute::check(cfg).unwrap();
        assert_eq!(route.path_as_start_path(), "/app");
    }
}
