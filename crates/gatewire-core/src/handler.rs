//! Handler façade (C8): binds a route list and middleware set into a
//! servable `actix_web` handler.

use crate::error::GatewayError;
use crate::middleware::ErasedMiddleware;
use crate::route::ProxyRoute;
use crate::router::Router;
use crate::transport::{self, ProtectedHeaders};
use actix_web::dev::{
    forward_ready, Service, ServiceRequest, ServiceResponse, Transform,
};
use actix_web::Error;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::sync::Arc;

/// Configuration bound into a [`GatewayHandler`]: the validated route list,
/// the process-wide protected-header set, and an optional mount prefix.
#[derive(Clone)]
pub struct DefaultHandlerConfig {
    pub routes: Vec<ProxyRoute>,
    pub protected_headers: Vec<String>,
    pub start_path: String,
    pub host: String,
    pub port: u16,
    /// Route-service mode: unmatched requests are forwarded here instead
    /// of yielding 404.
    pub forwarded_url: Option<ProxyRoute>,
}

impl Default for DefaultHandlerConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            protected_headers: Vec::new(),
            start_path: String::new(),
            host: "0.0.0.0".to_string(),
            port: 9080,
            forwarded_url: None,
        }
    }
}

/// Binds `DefaultHandlerConfig` into a router, once, at construction.
/// `ServeHTTP`-equivalent dispatch is exposed both as a plain async method
/// (standalone façade use) and via the `Transform`/`Service` impls below,
/// so the whole gateway can be `.wrap()`-ped in front of an actix `App`.
#[derive(Clone)]
pub struct GatewayHandler {
    router: Arc<Router>,
    forwarded_url: Option<Arc<ProxyRoute>>,
    addr: (String, u16),
}

impl GatewayHandler {
    pub fn new(
        config: DefaultHandlerConfig,
        middlewares: Vec<Arc<dyn ErasedMiddleware>>,
    ) -> Result<Self, GatewayError> {
        transport::set_protected_headers(ProtectedHeaders::new(config.protected_headers.clone()));

        let router = Router::new(config.routes, middlewares, &config.start_path)?;
        Ok(Self {
            router: Arc::new(router),
            forwarded_url: config.forwarded_url.map(Arc::new),
            addr: (config.host, config.port),
        })
    }

    /// Host/port this handler was configured to bind (defaults to
    /// `0.0.0.0:9080`).
    pub fn server_addr(&self) -> (&str, u16) {
        (&self.addr.0, self.addr.1)
    }

    pub async fn serve(&self, req: ServiceRequest) -> Result<ServiceResponse, Error> {
        if let Some(fallback) = &self.forwarded_url {
            self.router.dispatch_or_forward(req, fallback).await
        } else {
            self.router.dispatch(req).await
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for GatewayHandler
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse;
    type Error = Error;
    type Transform = GatewayService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(GatewayService {
            router: self.router.clone(),
            forwarded_url: self.forwarded_url.clone(),
            next: Arc::new(service),
        }))
    }
}

/// The actix `Service` produced by wrapping [`GatewayHandler`] around a
/// `next` service: a matched request is served by the router; an
/// unmatched one falls through to `next` ("router as middleware" mode).
pub struct GatewayService<S> {
    router: Arc<Router>,
    forwarded_url: Option<Arc<ProxyRoute>>,
    next: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for GatewayService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(next);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let router = self.router.clone();
        let forwarded_url = self.forwarded_url.clone();
        let next = self.next.clone();
        Box::pin(async move {
            if let Some(fallback) = &forwarded_url {
                return router.dispatch_or_forward(req, fallback).await;
            }
            match router.try_dispatch(req).await {
                Ok(resp) => Ok(resp),
                Err(req) => next.call(req).await.map(ServiceResponse::map_into_boxed_body),
            }
        })
    }
}
