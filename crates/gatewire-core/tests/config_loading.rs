//! End-to-end config loading: write a real file to disk, load it through
//! the public `config` API, and validate the decoded tree.

use gatewire_core::config::settings::load_settings_from_path;
use gatewire_core::config::validate;
use std::io::Write;

#[test]
fn json_config_round_trips_through_load_and_validate() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile_in(std::env::current_dir().unwrap())
        .unwrap();
    write!(
        file,
        r#"{{
            "host": "0.0.0.0",
            "port": 9191,
            "routes": [
                {{"name": "api", "path": "/app/**", "url": "http://up.example.com"}}
            ]
        }}"#
    )
    .unwrap();

    let config = load_settings_from_path(file.path()).unwrap();

    assert_eq!(config.port, 9191);
    assert_eq!(config.routes.len(), 1);

    let result = validate(&config).unwrap();
    assert!(result.is_valid);
    assert!(result.errors.is_empty());
}

#[test]
fn invalid_config_is_rejected_with_errors() {
    let config = gatewire_core::config::GatewayConfig {
        routes: vec![gatewire_core::RouteConfig {
            name: "broken".to_string(),
            path: "/app/**".to_string(),
            url: "http://localhost:9999".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    };

    let err = validate(&config).unwrap_err();
    assert!(err.result.errors.iter().any(|e| e.contains("localhost")));
}
