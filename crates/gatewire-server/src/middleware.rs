//! Illustrative middlewares wired into the demo server: a header stamper
//! that tags every forwarded request with the matched route's name, and an
//! allow-list authenticator that rejects requests without a recognized
//! `X-Api-Key`.
//!
//! Neither is meant for production use as-is; they exist to exercise
//! `gatewire_core::middleware::MiddlewareHandler` end to end and to give a
//! `gatewire-server` instance something visible to do out of the box.

use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::HttpResponse;
use gatewire_core::context::with_context_mut;
use gatewire_core::middleware::{BoxedHandler, MiddlewareHandler};
use gatewire_core::route::ProxyRoute;
use log::debug;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Default, Deserialize)]
pub struct NoParams {}

/// Stamps `X-Gatewire-Route` on the outgoing response with the name of the
/// route that served the request.
pub struct RouteStampMiddleware;

impl MiddlewareHandler for RouteStampMiddleware {
    type Params = NoParams;

    fn name(&self) -> &str {
        "route_stamp"
    }

    fn handler(
        &self,
        route: &ProxyRoute,
        _params: NoParams,
        next: BoxedHandler,
    ) -> Result<BoxedHandler, String> {
        let route_name = route.name.clone();
        let header_name = HeaderName::from_static("x-gatewire-route");
        Ok(std::sync::Arc::new(move |req| {
            let next = next.clone();
            let route_name = route_name.clone();
            let header_name = header_name.clone();
            Box::pin(async move {
                let mut resp = next(req).await;
                if let Ok(value) = HeaderValue::from_str(&route_name) {
                    resp.headers_mut().insert(header_name, value);
                }
                resp
            })
        }))
    }
}

/// Configuration for [`AllowListAuthMiddleware`]: the set of API keys
/// accepted in the `X-Api-Key` header.
#[derive(Default, Deserialize)]
pub struct AllowListParams {
    #[serde(default)]
    pub api_keys: HashSet<String>,
}

/// Rejects a request with 401 unless `X-Api-Key` names a key in
/// `api_keys`; otherwise records the key as the request's username and
/// calls `next`. A missing or empty `api_keys` list rejects every request,
/// matching closed-by-default access control.
pub struct AllowListAuthMiddleware;

impl MiddlewareHandler for AllowListAuthMiddleware {
    type Params = AllowListParams;

    fn name(&self) -> &str {
        "allow_list_auth"
    }

    fn handler(
        &self,
        route: &ProxyRoute,
        params: AllowListParams,
        next: BoxedHandler,
    ) -> Result<BoxedHandler, String> {
        let route_name = route.name.clone();
        Ok(std::sync::Arc::new(move |req| {
            let next = next.clone();
            let route_name = route_name.clone();
            let api_keys = params.api_keys.clone();
            Box::pin(async move {
                let key = req
                    .headers()
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());

                match key.filter(|k| api_keys.contains(k)) {
                    Some(key) => {
                        with_context_mut(req.request(), |ctx| ctx.set_username(key));
                        next(req).await
                    }
                    None => {
                        debug!("route '{}': rejected request with no matching api key", route_name);
                        let (http_req, _) = req.into_parts();
                        actix_web::dev::ServiceResponse::new(
                            http_req,
                            HttpResponse::Unauthorized().json(serde_json::json!({
                                "error": "missing or invalid X-Api-Key",
                            })),
                        )
                    }
                }
            })
        }))
    }
}
