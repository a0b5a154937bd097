//! Declarative configuration loading and validation.
//!
//! Loads JSON/YAML route files from disk with the same path-traversal and
//! size-limit posture production gateway configs need, and validates the
//! decoded tree before it's handed to [`crate::router::Router::new`].

pub mod settings;
pub mod validation;

pub use settings::{load_settings, GatewayConfig, SettingsError};
pub use validation::{validate, ValidationError};
