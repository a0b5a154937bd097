//! Test doubles used by `gatewire-core`'s own integration tests: a handful
//! of trivial `MiddlewareHandler` implementations exercising the
//! panic-recovery path, passthrough bypass, and dirty-header mutation.

use crate::middleware::{BoxedHandler, MiddlewareHandler};
use crate::route::ProxyRoute;
use serde::Deserialize;

/// A middleware that always panics with a fixed message; used to exercise
/// the outer panic-recovery boundary.
pub struct PanicMiddleware {
    pub message: &'static str,
}

#[derive(Default, Deserialize)]
pub struct NoParams {}

impl MiddlewareHandler for PanicMiddleware {
    type Params = NoParams;

    fn name(&self) -> &str {
        "panic_middleware"
    }

    fn handler(
        &self,
        _route: &ProxyRoute,
        _params: NoParams,
        _next: BoxedHandler,
    ) -> Result<BoxedHandler, String> {
        let message = self.message;
        Ok(std::sync::Arc::new(move |_req| {
            let message = message;
            Box::pin(async move { panic!("{message}") })
        }))
    }
}

/// A middleware that marks a header dirty (for deletion) before calling
/// `next`, used to exercise the dirty-header round trip end to end.
pub struct DirtyHeaderMiddleware {
    pub header: &'static str,
}

impl MiddlewareHandler for DirtyHeaderMiddleware {
    type Params = NoParams;

    fn name(&self) -> &str {
        "dirty_header_middleware"
    }

    fn handler(
        &self,
        _route: &ProxyRoute,
        _params: NoParams,
        next: BoxedHandler,
    ) -> Result<BoxedHandler, String> {
        let header = self.header;
        Ok(std::sync::Arc::new(move |req| {
            crate::context::with_context_mut(req.request(), |ctx| {
                ctx.dirty_header(header, None);
            });
            let next = next.clone();
            Box::pin(async move { next(req).await })
        }))
    }
}

/// A middleware that would mutate the request body if invoked; used by
/// passthrough tests to assert it is *not* called.
pub struct BodyRewriteMiddleware {
    pub called: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl MiddlewareHandler for BodyRewriteMiddleware {
    type Params = NoParams;

    fn name(&self) -> &str {
        "body_rewrite_middleware"
    }

    fn handler(
        &self,
        _route: &ProxyRoute,
        _params: NoParams,
        next: BoxedHandler,
    ) -> Result<BoxedHandler, String> {
        let called = self.called.clone();
        Ok(std::sync::Arc::new(move |req| {
            called.store(true, std::sync::atomic::Ordering::SeqCst);
            let next = next.clone();
            Box::pin(async move { next(req).await })
        }))
    }
}
