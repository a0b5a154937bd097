//! Panic-recovery and builder-to-router integration tests.

use actix_web::test::TestRequest;
use gatewire_core::middleware::ErasedMiddleware;
use gatewire_core::router::Router;
use gatewire_core::testutil::PanicMiddleware;
use gatewire_core::RouteBuilder;
use std::sync::Arc;

fn route(name: &str, path_pattern: &str, upstream: &str, show_error: bool) -> gatewire_core::ProxyRoute {
    gatewire_core::ProxyRoute {
        name: name.to_string(),
        path: gatewire_core::path::PathMatcher::new(path_pattern).unwrap(),
        target: gatewire_core::ForwardTarget::Url(url::Url::parse(upstream).unwrap()),
        methods: Vec::new(),
        sensitive_headers: Vec::new(),
        http_proxy: None,
        https_proxy: None,
        no_proxy: false,
        no_buffer: false,
        remove_proxy_headers: false,
        insecure_skip_verify: false,
        middleware_params: serde_json::Value::Null,
        show_error,
        use_full_path: false,
        options_passthrough: false,
        hosts_passthrough: gatewire_core::path::HostMatchers::default(),
        routes: Vec::new(),
    }
}

#[actix_web::test]
async fn panic_in_middleware_is_recovered_as_500() {
    let routes = vec![route("boom", "/app/**", "http://unused.invalid", true)];

    let middlewares: Vec<Arc<dyn ErasedMiddleware>> =
        vec![Arc::new(PanicMiddleware { message: "kaboom" })];
    let router = Router::new(routes, middlewares, "").unwrap();

    let req = TestRequest::get().uri("/app/x").to_srv_request();
    let resp = router.dispatch(req).await.unwrap();
    assert_eq!(resp.status(), 500);
    let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("kaboom"));
}

#[actix_web::test]
async fn builder_produces_routes_the_router_can_serve() {
    let mut builder = RouteBuilder::new();
    builder
        .add_route("api", "/app/**", "http://unused.invalid")
        .finish();

    let routes = builder.build().unwrap();
    let router = Router::new(routes, Vec::new(), "").unwrap();

    let req = TestRequest::get().uri("/not-app").to_srv_request();
    let resp = router.dispatch(req).await.unwrap();
    assert_eq!(resp.status(), 404);
}
