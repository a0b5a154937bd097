//! Gateway-wide error taxonomy with HTTP response mapping.
//!
//! Covers five categories of request/route handling failure: configuration
//! errors (rejected before a handler is ever built), middleware-wiring errors
//! (a middleware refused to attach to a route), upstream network errors,
//! timeouts, and the catch-all internal/panic-recovery case.

use actix_web::HttpResponse;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid route configuration: {0}")]
    Config(String),

    #[error("middleware '{middleware}' failed to attach to route '{route}': {reason}")]
    MiddlewareWiring {
        middleware: String,
        route: String,
        reason: String,
    },

    #[error("no route matched path '{path}'")]
    RouteNotFound { path: String },

    #[error("upstream request to '{url}' failed: {message}")]
    Upstream { url: String, message: String },

    #[error("upstream request to '{url}' timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl actix_web::error::ResponseError for GatewayError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            GatewayError::Config(_) | GatewayError::MiddlewareWiring { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = self.to_string();
        HttpResponse::build(self.status_code()).json(json!({
            "error": message,
            "type": self.error_type(),
        }))
    }
}

impl GatewayError {
    fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "config",
            GatewayError::MiddlewareWiring { .. } => "middleware_wiring",
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::Upstream { .. } => "upstream",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Internal(_) => "internal",
        }
    }
}

/// Shape of the optional panic-recovery error body (`ShowError` on a route).
#[derive(Debug, serde::Serialize)]
pub struct PanicErrorBody {
    pub status: u16,
    pub title: String,
    pub details: String,
    pub route_name: String,
}

impl PanicErrorBody {
    pub fn new(details: impl Into<String>, route_name: impl Into<String>) -> Self {
        Self {
            status: 500,
            title: "Internal Server Error".to_string(),
            details: details.into(),
            route_name: route_name.into(),
        }
    }
}
