//! Middleware chain composition (C6).
//!
//! A route's composed handler is built innermost-first around the forward
//! handler, then each registered [`MiddlewareHandler`] wraps it once, in
//! reverse registration order, so that the first-registered middleware
//! ends up outermost.

use crate::context::{with_context_mut, RequestContext};
use crate::error::PanicErrorBody;
use crate::route::ProxyRoute;
use actix_web::body::BoxBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::HttpResponse;
use futures_util::future::LocalBoxFuture;
use log::error;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A composed handler never fails: forward-handler and panic-recovery
/// errors are converted into HTTP responses internally, so every link in
/// the chain can assume `ServiceResponse` is always the outcome.
pub type BoxedHandler = Arc<dyn Fn(ServiceRequest) -> LocalBoxFuture<'static, ServiceResponse> + Send + Sync>;

/// The contract every middleware plugin satisfies. `P` is the middleware's
/// own declared parameter schema; decoding goes through [`decode_params`]
/// before `handler` is invoked, rather than a generic-to-map reflection
/// dance.
pub trait MiddlewareHandler: Send + Sync {
    type Params: Default + serde::de::DeserializeOwned + Send + Sync + 'static;

    /// A human-readable name used in wiring-error messages.
    fn name(&self) -> &str;

    /// Returns the handler wrapping `next` for this route, given its
    /// decoded parameters. Errors abort handler construction, naming this
    /// middleware.
    fn handler(
        &self,
        route: &ProxyRoute,
        params: Self::Params,
        next: BoxedHandler,
    ) -> Result<BoxedHandler, String>;
}

/// A type-erased middleware, so a chain can hold a heterogeneous list.
pub trait ErasedMiddleware: Send + Sync {
    fn name(&self) -> &str;
    fn wrap(&self, route: &ProxyRoute, next: BoxedHandler) -> Result<BoxedHandler, String>;
}

impl<M, P> ErasedMiddleware for M
where
    M: MiddlewareHandler<Params = P>,
    P: Default + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        MiddlewareHandler::name(self)
    }

    fn wrap(&self, route: &ProxyRoute, next: BoxedHandler) -> Result<BoxedHandler, String> {
        let params = decode_params::<P>(&route.middleware_params);
        self.handler(route, params, next)
    }
}

/// Decodes a route's opaque `middleware_params` value into a single
/// middleware's declared schema. Every middleware receives the same raw
/// value and picks out its own subtree by field name; unknown fields are
/// ignored and missing fields fall back to the schema's `Default`.
pub fn decode_params<P: Default + serde::de::DeserializeOwned>(raw: &Value) -> P {
    if raw.is_null() {
        return P::default();
    }
    serde_json::from_value(raw.clone()).unwrap_or_default()
}

/// Builds the fully composed handler for `route`: forward handler at the
/// core, wrapped by a chain-routes middleware if the route has nested
/// routes, then each registered middleware in reverse order, then the
/// outer passthrough/panic-recovery/context-stamping wrapper.
pub fn compose(
    route: Arc<ProxyRoute>,
    middlewares: &[Arc<dyn ErasedMiddleware>],
    forward: BoxedHandler,
) -> Result<BoxedHandler, String> {
    let mut innermost = forward.clone();

    if !route.routes.is_empty() {
        innermost = chain_routes_middleware(route.clone(), innermost);
    }

    for mw in middlewares.iter().rev() {
        innermost = mw
            .wrap(&route, innermost)
            .map_err(|reason| format!("middleware '{}' on route '{}': {}", mw.name(), route.name, reason))?;
    }

    Ok(outer_wrapper(route, innermost, forward))
}

/// Nested routes are served by an ordinary synthetic middleware whose
/// not-found fallthrough is the parent's own (already-composed) inner
/// handler, rather than special-cased in the composition loop above.
fn chain_routes_middleware(route: Arc<ProxyRoute>, parent_fallthrough: BoxedHandler) -> BoxedHandler {
    let sub_router = Arc::new(crate::router::Router::new_nested(
        route.routes.clone(),
        route.path_as_start_path().to_string(),
    ));

    Arc::new(move |req: ServiceRequest| {
        let sub_router = sub_router.clone();
        let fallthrough = parent_fallthrough.clone();
        Box::pin(async move {
            match sub_router.try_dispatch(req).await {
                Ok(resp) => resp,
                Err(req) => fallthrough(req).await,
            }
        })
    })
}

/// Wraps the composed middleware stack with:
/// - `X-Gobis-Forward` stamping on request + response,
/// - route-name context stamping,
/// - OPTIONS/hosts passthrough bypass straight to `forward_only`,
/// - a panic-recovery boundary yielding HTTP 500 (+ optional JSON body).
fn outer_wrapper(route: Arc<ProxyRoute>, inner: BoxedHandler, forward_only: BoxedHandler) -> BoxedHandler {
    Arc::new(move |req: ServiceRequest| {
        let route = route.clone();
        let inner = inner.clone();
        let forward_only = forward_only.clone();
        Box::pin(async move {
            with_context_mut(req.request(), |ctx: &mut RequestContext| {
                ctx.set_route_name(route.name.clone());
            });
            if should_bypass(&route, &req) {
                return run_guarded(route, forward_only, req).await;
            }
            run_guarded(route, inner, req).await
        })
    })
}

/// Bypasses the middleware chain directly to the forward handler when a
/// passthrough predicate matches: an OPTIONS preflight with
/// `options_passthrough` set, or a request host matching `hosts_passthrough`.
fn should_bypass(route: &ProxyRoute, req: &ServiceRequest) -> bool {
    (route.options_passthrough && is_cors_preflight(req))
        || (!route.hosts_passthrough.is_empty()
            && route.hosts_passthrough.matches(req.request().connection_info().host()))
}

async fn run_guarded(route: Arc<ProxyRoute>, inner: BoxedHandler, req: ServiceRequest) -> ServiceResponse {
    let http_req = req.request().clone();
    let result = futures_util::FutureExt::catch_unwind(AssertUnwindSafe(inner(req))).await;
    match result {
        Ok(mut resp) => {
            resp.headers_mut().insert(
                actix_web::http::header::HeaderName::from_static(crate::forward::FORWARD_HEADER),
                actix_web::http::header::HeaderValue::from_static("true"),
            );
            resp
        }
        Err(panic) => {
            let message = panic_message(panic);
            error!("route '{}': panic recovered: {}", route.name, message);
            let body = if route.show_error {
                BoxBody::new(
                    serde_json::to_string(&PanicErrorBody::new(message, route.name.clone()))
                        .unwrap_or_default(),
                )
            } else {
                BoxBody::new(())
            };
            let response = HttpResponse::InternalServerError()
                .content_type("application/json")
                .body(body);
            ServiceResponse::new(http_req, response)
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn is_cors_preflight(req: &ServiceRequest) -> bool {
    req.method() == actix_web::http::Method::OPTIONS
        && (req.headers().contains_key("access-control-request-method")
            || req.headers().contains_key("access-control-request-headers"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, serde::Deserialize)]
    struct NoParams {}

    struct PassThrough;

    impl MiddlewareHandler for PassThrough {
        type Params = NoParams;

        fn name(&self) -> &str {
            "pass_through"
        }

        fn handler(
            &self,
            _route: &ProxyRoute,
            _params: NoParams,
            next: BoxedHandler,
        ) -> Result<BoxedHandler, String> {
            Ok(next)
        }
    }

    #[test]
    fn decode_params_falls_back_to_default_on_null() {
        let decoded: NoParams = decode_params(&Value::Null);
        let _ = decoded;
    }

    #[test]
    fn cors_preflight_detection() {
        let req = actix_web::test::TestRequest::default()
            .method(actix_web::http::Method::OPTIONS)
            .insert_header(("Access-Control-Request-Method", "POST"))
            .to_srv_request();
        assert!(is_cors_preflight(&req));
    }
}
