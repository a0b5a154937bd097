//! Router (C7): matches an incoming request to at most one route, in
//! declaration order, and dispatches to its composed handler.

use crate::context::with_context_mut;
use crate::error::GatewayError;
use crate::middleware::{compose, BoxedHandler, ErasedMiddleware};
use crate::route::{ForwardTarget, ProxyRoute};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::{FromRequest, HttpResponse, ResponseError};
use log::debug;
use std::sync::Arc;

struct CompiledRoute {
    route: Arc<ProxyRoute>,
    handler: BoxedHandler,
}

/// Stateless between requests; everything per-request lives on the
/// request's own context (C3). Constructed once at startup (or once per
/// nested-route mount point), then shared read-only across worker threads.
pub struct Router {
    routes: Vec<CompiledRoute>,
    start_path: String,
}

impl Router {
    /// Builds a router over `routes`, composing each route's full
    /// middleware chain around its forward handler. Fails with a
    /// middleware-wiring error naming the offending middleware.
    pub fn new(
        routes: Vec<ProxyRoute>,
        middlewares: Vec<Arc<dyn ErasedMiddleware>>,
        start_path: &str,
    ) -> Result<Self, GatewayError> {
        let mut compiled = Vec::with_capacity(routes.len());
        for route in routes {
            let route = Arc::new(route);
            let forward_handler = make_forward_handler(route.clone());
            let handler = compose(route.clone(), &middlewares, forward_handler)
                .map_err(GatewayError::Internal)?;
            compiled.push(CompiledRoute { route, handler });
        }
        Ok(Self {
            routes: compiled,
            start_path: start_path.to_string(),
        })
    }

    /// Builds a router for a `chain-routes` mount point: no middlewares of
    /// its own (its parent already wraps it), mounted at `start_path`.
    pub fn new_nested(routes: Vec<ProxyRoute>, start_path: String) -> Self {
        Self::new(routes, Vec::new(), &start_path)
            .expect("nested routes were already validated by ProxyRoute::check")
    }

    /// Matches `req` against the route list. On a match, dispatches to the
    /// matched route's composed handler. On no match, returns the request
    /// back to the caller (used both for the router-as-middleware
    /// fallthrough and the chain-routes not-found fallthrough).
    pub async fn try_dispatch(
        &self,
        req: ServiceRequest,
    ) -> Result<ServiceResponse, ServiceRequest> {
        let path_for_routing = routing_path(&req, &self.start_path);

        let mut matched = None;
        for (index, compiled) in self.routes.iter().enumerate() {
            if let Some(rest) = match_route(&compiled.route, &req, &path_for_routing) {
                matched = Some((index, rest));
                break;
            }
        }

        let Some((index, rest)) = matched else {
            return Err(req);
        };

        with_context_mut(req.request(), |ctx| {
            ctx.set_path(rest);
        });
        debug!(
            "matched route '{}' for path '{}'",
            self.routes[index].route.name, path_for_routing
        );
        let handler = self.routes[index].handler.clone();
        Ok(handler(req).await)
    }

    /// Dispatches `req`, returning a 404 on no match. Method mismatches are
    /// folded into the same 404 rather than a 405, preserving fall-through
    /// semantics for router-as-middleware mode.
    pub async fn dispatch(&self, req: ServiceRequest) -> Result<ServiceResponse, actix_web::Error> {
        match self.try_dispatch(req).await {
            Ok(resp) => Ok(resp),
            Err(req) => {
                let (http_req, _) = req.into_parts();
                Ok(ServiceResponse::new(http_req, HttpResponse::NotFound().finish()))
            }
        }
    }

    /// Used in route-service mode: unmatched requests are forwarded to a
    /// `forwarded_url` upstream via a synthetic passthrough route.
    pub async fn dispatch_or_forward(
        &self,
        req: ServiceRequest,
        fallback: &ProxyRoute,
    ) -> Result<ServiceResponse, actix_web::Error> {
        match self.try_dispatch(req).await {
            Ok(resp) => Ok(resp),
            Err(req) => Ok(make_forward_handler(Arc::new(fallback.clone()))(req).await),
        }
    }
}

fn routing_path(req: &ServiceRequest, start_path: &str) -> String {
    let full = req.path();
    full.strip_prefix(start_path).unwrap_or(full).to_string()
}

/// Per-route matcher: method filter, path filter, and (when
/// `ForwardedHeader` is combined with a `Url` constraint) host and path
/// agreement between the two.
fn match_route<'a>(route: &ProxyRoute, req: &'a ServiceRequest, path: &str) -> Option<String> {
    if !route.methods.is_empty() {
        let method = req.method().as_str();
        if !route.methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
            return None;
        }
    }

    let header_value = if let ForwardTarget::ForwardedHeader { header, .. } = &route.target {
        req.headers()
            .get(header.as_str())
            .and_then(|v| v.to_str().ok())
    } else {
        None
    };

    let routing_path = route.request_path(path, header_value);
    let rest = route.path.matches(&routing_path)?;

    if let ForwardTarget::ForwardedHeader {
        constraint: Some(constraint_url),
        ..
    } = &route.target
    {
        let header_url = header_value.and_then(|h| url::Url::parse(h).ok())?;
        if header_url.host_str() != constraint_url.host_str() {
            return None;
        }
        let constraint_path = constraint_url.path();
        if !constraint_path.is_empty() && constraint_path != "/" {
            let matcher = crate::path::PathMatcher::new(constraint_path).ok()?;
            matcher.matches(header_url.path())?;
        }
    }

    Some(rest.to_string())
}

fn make_forward_handler(route: Arc<ProxyRoute>) -> BoxedHandler {
    Arc::new(move |req: ServiceRequest| {
        let route = route.clone();
        Box::pin(async move {
            if let ForwardTarget::Handler(handler) = &route.target {
                let http_req = req.request().clone();
                return match handler(req).await {
                    Ok(resp) => resp,
                    Err(e) => ServiceResponse::new(http_req, e.error_response()),
                };
            }
            let (http_req, mut payload) = req.into_parts();
            let body = match actix_web::web::Bytes::from_request(&http_req, &mut payload).await {
                Ok(bytes) => bytes,
                Err(e) => return ServiceResponse::new(http_req, e.error_response()),
            };
            match crate::forward::forward(http_req.clone(), body, &route).await {
                Ok(resp) => ServiceResponse::new(http_req, resp),
                Err(e) => ServiceResponse::new(http_req, e.error_response()),
            }
        })
    })
}
