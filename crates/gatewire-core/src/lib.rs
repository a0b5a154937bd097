//! Routing, middleware-composition, and request-forwarding engine for an
//! embeddable HTTP reverse-proxy / API gateway.
//!
//! Given a declarative list of routes, [`router::Router`] matches each
//! incoming request by path, method, host, and optional forwarded-header
//! hint, dispatching to a per-route chain of [`middleware::MiddlewareHandler`]s
//! wrapped around a [`forward`] handler that proxies the request upstream
//! (or delegates to an in-process handler). [`handler::GatewayHandler`] is
//! the top-level façade: it binds a route list and a middleware set into
//! something that can be served directly or mounted as `actix_web`
//! middleware in front of an existing `App`.
//!
//! Concrete middleware implementations (auth, rate limiting, CORS,
//! tracing, circuit breaking), the configuration *format* beyond what's
//! needed to exercise the engine, and the HTTP server loop/TLS termination
//! are collaborators outside this crate's scope; see `gatewire-server` for
//! a runnable demonstration binary.

pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod forward;
pub mod handler;
pub mod logging;
pub mod middleware;
pub mod path;
pub mod route;
pub mod router;
pub mod transport;

pub mod testutil;

pub use builder::RouteBuilder;
pub use context::RequestContext;
pub use error::GatewayError;
pub use handler::{DefaultHandlerConfig, GatewayHandler};
pub use middleware::MiddlewareHandler;
pub use route::{ForwardTarget, ProxyRoute, RouteConfig};
pub use router::Router;
