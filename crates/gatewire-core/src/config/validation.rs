//! Configuration validation with detailed error/warning/recommendation
//! reporting: structural checks, security posture checks, and basic
//! route-conflict detection over the nested route tree.

use crate::config::settings::GatewayConfig;
use crate::route::RouteConfig;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("configuration is invalid: {} error(s)", .result.errors.len())]
pub struct ValidationError {
    pub result: ValidationResult,
}

/// Errors, warnings, and recommendations accumulated across a validation
/// pass. Only `errors` block loading; `warnings`/`recommendations` are
/// surfaced to logs for operator visibility.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(error.into());
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn add_recommendation(&mut self, recommendation: impl Into<String>) {
        self.recommendations.push(recommendation.into());
    }

    fn merge(&mut self, other: ValidationResult) {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.recommendations.extend(other.recommendations);
    }
}

/// Runs basic-structure, security, performance, and route-conflict passes
/// over `config`. Returns `Err` only when the basic-structure or security
/// pass found a hard error; warnings/recommendations are attached to the
/// `Ok` result for the caller to log.
pub fn validate(config: &GatewayConfig) -> Result<ValidationResult, ValidationError> {
    let mut result = ValidationResult::new();

    result.merge(validate_basic_structure(config));
    result.merge(validate_security(config));
    result.merge(validate_performance(config));
    result.merge(validate_route_conflicts(&config.routes));

    if result.is_valid {
        Ok(result)
    } else {
        Err(ValidationError { result })
    }
}

fn validate_basic_structure(config: &GatewayConfig) -> ValidationResult {
    let mut result = ValidationResult::new();
    if config.routes.is_empty() && config.forwarded_url.is_none() {
        result.add_warning("no routes and no forwarded_url configured; every request will 404");
    }
    for route in &config.routes {
        validate_route_recursive(route, &mut result);
    }
    result
}

fn validate_route_recursive(route: &RouteConfig, result: &mut ValidationResult) {
    if route.name.trim().is_empty() {
        result.add_error("a route has an empty name");
    }
    if route.path.trim().is_empty() {
        result.add_error(format!("route '{}': path must not be empty", route.name));
    }
    if route.url.is_empty() && route.forwarded_header.is_empty() {
        result.add_error(format!(
            "route '{}': neither url nor forwarded_header is set",
            route.name
        ));
    }
    if !route.url.is_empty() && !route.forwarded_header.is_empty() {
        result.add_recommendation(format!(
            "route '{}': both url and forwarded_header set; url only constrains host/path",
            route.name
        ));
    }
    for child in &route.routes {
        validate_route_recursive(child, result);
    }
}

fn validate_security(config: &GatewayConfig) -> ValidationResult {
    let mut result = ValidationResult::new();
    for route in &config.routes {
        validate_security_recursive(route, &mut result);
    }
    result
}

fn validate_security_recursive(route: &RouteConfig, result: &mut ValidationResult) {
    if route.url.contains("localhost") || route.url.contains("127.0.0.1") {
        result.add_error(format!(
            "route '{}': upstream url must not point at localhost",
            route.name
        ));
    }
    if route.insecure_skip_verify {
        result.add_warning(format!(
            "route '{}': insecure_skip_verify disables upstream TLS verification",
            route.name
        ));
    }
    if route.show_error {
        result.add_recommendation(format!(
            "route '{}': show_error leaks panic details to clients; disable in production",
            route.name
        ));
    }
    for child in &route.routes {
        validate_security_recursive(child, result);
    }
}

fn validate_performance(config: &GatewayConfig) -> ValidationResult {
    let mut result = ValidationResult::new();
    if config.routes.len() > 500 {
        result.add_recommendation(
            "more than 500 top-level routes; consider grouping via nested routes for clearer ownership",
        );
    }
    result
}

/// Checks for duplicate route names across the (flattened) route tree;
/// duplicate names make log correlation and admin tooling ambiguous even
/// though the router itself tolerates them (first match wins).
fn validate_route_conflicts(routes: &[RouteConfig]) -> ValidationResult {
    let mut result = ValidationResult::new();
    let mut seen = HashSet::new();
    collect_names(routes, &mut seen, &mut result);
    result
}

fn collect_names(routes: &[RouteConfig], seen: &mut HashSet<String>, result: &mut ValidationResult) {
    for route in routes {
        if !seen.insert(route.name.clone()) {
            result.add_warning(format!("duplicate route name '{}'", route.name));
        }
        collect_names(&route.routes, seen, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_missing_target() {
        let config = GatewayConfig {
            routes: vec![RouteConfig {
                name: "a".into(),
                path: "/app/**".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(!err.result.errors.is_empty());
    }

    #[test]
    fn warns_on_duplicate_names() {
        let config = GatewayConfig {
            routes: vec![
                RouteConfig {
                    name: "a".into(),
                    path: "/app/**".into(),
                    url: "http://up1.example.com".into(),
                    ..Default::default()
                },
                RouteConfig {
                    name: "a".into(),
                    path: "/other/**".into(),
                    url: "http://up2.example.com".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let result = validate(&config).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("duplicate")));
    }
}
