//! End-to-end routing, middleware-ordering, and forwarding tests against a
//! real HTTP upstream double.
//!
//! Routes are built directly as `ProxyRoute` values (bypassing
//! `ProxyRoute::check`'s localhost-upstream rejection) since the test
//! double necessarily listens on a loopback address; the config-loading
//! path's rejection of exactly that is covered by `route.rs`'s own unit
//! tests.

use actix_web::test::TestRequest;
use gatewire_core::middleware::ErasedMiddleware;
use gatewire_core::path::{HostMatchers, PathMatcher};
use gatewire_core::router::Router;
use gatewire_core::testutil::{BodyRewriteMiddleware, DirtyHeaderMiddleware};
use gatewire_core::{ForwardTarget, ProxyRoute};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn route(name: &str, route_path: &str, upstream: &str) -> ProxyRoute {
    route_with_methods(name, route_path, upstream, &[])
}

fn route_with_methods(name: &str, route_path: &str, upstream: &str, methods: &[&str]) -> ProxyRoute {
    ProxyRoute {
        name: name.to_string(),
        path: PathMatcher::new(route_path).unwrap(),
        target: ForwardTarget::Url(Url::parse(upstream).unwrap()),
        methods: methods.iter().map(|m| m.to_string()).collect(),
        sensitive_headers: Vec::new(),
        http_proxy: None,
        https_proxy: None,
        no_proxy: false,
        no_buffer: false,
        remove_proxy_headers: false,
        insecure_skip_verify: false,
        middleware_params: serde_json::Value::Null,
        show_error: false,
        use_full_path: false,
        options_passthrough: false,
        hosts_passthrough: HostMatchers::default(),
        routes: Vec::new(),
    }
}

fn route_with_hosts_passthrough(name: &str, route_path: &str, upstream: &str, hosts: &[&str]) -> ProxyRoute {
    ProxyRoute {
        hosts_passthrough: HostMatchers::new(&hosts.iter().map(|h| h.to_string()).collect::<Vec<_>>()).unwrap(),
        ..route(name, route_path, upstream)
    }
}

fn route_with_children(name: &str, route_path: &str, children: Vec<ProxyRoute>) -> ProxyRoute {
    ProxyRoute {
        routes: children,
        ..route(name, route_path, "http://unused.invalid")
    }
}

#[actix_web::test]
async fn matched_path_forwards_to_upstream_and_stamps_forward_header() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend/hello"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
        .mount(&upstream)
        .await;

    let routes = vec![route("api", "/app/**", &format!("{}/backend", upstream.uri()))];
    let router = Router::new(routes, Vec::new(), "").unwrap();

    let req = TestRequest::get().uri("/app/hello").to_srv_request();
    let resp = router.dispatch(req).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().contains_key("x-gobis-forward"));
}

#[actix_web::test]
async fn unmatched_path_yields_404() {
    let routes = vec![route("api", "/app/**", "http://unused.invalid")];
    let router = Router::new(routes, Vec::new(), "").unwrap();

    let req = TestRequest::get().uri("/other").to_srv_request();
    let resp = router.dispatch(req).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn method_not_in_allow_list_falls_through_to_404() {
    let routes = vec![route_with_methods("posts-only", "/app/**", "http://unused.invalid", &["POST"])];
    let router = Router::new(routes, Vec::new(), "").unwrap();

    let req = TestRequest::get().uri("/app/x").to_srv_request();
    let resp = router.dispatch(req).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn first_declared_route_wins_on_overlap() {
    let upstream_a = MockServer::start().await;
    let upstream_b = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a"))
        .mount(&upstream_a)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("b"))
        .mount(&upstream_b)
        .await;

    let routes = vec![
        route("first", "/app/**", &upstream_a.uri()),
        route("second", "/app/**", &upstream_b.uri()),
    ];
    let router = Router::new(routes, Vec::new(), "").unwrap();

    let req = TestRequest::get().uri("/app/anything").to_srv_request();
    let resp = router.dispatch(req).await.unwrap();
    let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
    assert_eq!(body, "a");
}

#[actix_web::test]
async fn hosts_passthrough_bypasses_middleware_chain() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let routes = vec![route_with_hosts_passthrough(
        "internal",
        "/app/**",
        &upstream.uri(),
        &["internal.example.com"],
    )];

    let called = Arc::new(AtomicBool::new(false));
    let middlewares: Vec<Arc<dyn ErasedMiddleware>> =
        vec![Arc::new(BodyRewriteMiddleware { called: called.clone() })];

    let router = Router::new(routes, middlewares, "").unwrap();

    let req = TestRequest::get()
        .uri("/app/x")
        .insert_header(("host", "internal.example.com"))
        .to_srv_request();
    let resp = router.dispatch(req).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(!called.load(Ordering::SeqCst), "passthrough must bypass the middleware chain");
}

#[actix_web::test]
async fn dirty_header_is_stripped_before_reaching_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(move |req: &wiremock::Request| {
            if req.headers.get("x-drop-me").is_some() {
                ResponseTemplate::new(400)
            } else {
                ResponseTemplate::new(200)
            }
        })
        .mount(&upstream)
        .await;

    let routes = vec![route("api", "/app/**", &upstream.uri())];
    let middlewares: Vec<Arc<dyn ErasedMiddleware>> =
        vec![Arc::new(DirtyHeaderMiddleware { header: "x-drop-me" })];
    let router = Router::new(routes, middlewares, "").unwrap();

    let req = TestRequest::get()
        .uri("/app/x")
        .insert_header(("x-drop-me", "secret"))
        .to_srv_request();
    let resp = router.dispatch(req).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn nested_route_matches_under_parent_prefix() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/child"))
        .respond_with(ResponseTemplate::new(200).set_body_string("nested"))
        .mount(&upstream)
        .await;

    let child = route("child", "/inner", &format!("{}/child", upstream.uri()));
    let parent = route_with_children("parent", "/app/**", vec![child]);
    let router = Router::new(vec![parent], Vec::new(), "").unwrap();

    let req = TestRequest::get().uri("/app/inner").to_srv_request();
    let resp = router.dispatch(req).await.unwrap();
    let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
    assert_eq!(body, "nested");
}

#[actix_web::test]
async fn parent_middleware_runs_before_nested_child_is_reached() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let child = route("child", "/inner", &upstream.uri());
    let parent = route_with_children("parent", "/app/**", vec![child]);

    let called = Arc::new(AtomicBool::new(false));
    let middlewares: Vec<Arc<dyn ErasedMiddleware>> =
        vec![Arc::new(BodyRewriteMiddleware { called: called.clone() })];
    let router = Router::new(vec![parent], middlewares, "").unwrap();

    let req = TestRequest::get().uri("/app/inner").to_srv_request();
    let resp = router.dispatch(req).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(called.load(Ordering::SeqCst), "parent-registered middleware must still wrap nested dispatch");
}
