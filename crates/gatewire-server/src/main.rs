//! Demo gateway server binary.
//!
//! Loads a declarative route file (JSON or YAML, see
//! `gatewire_core::config`), validates it, wires a couple of illustrative
//! middlewares, and serves the result with `actix-web`.

mod middleware;

use actix_web::{App, HttpServer};
use clap::Parser;
use gatewire_core::config::{load_settings, validate};
use gatewire_core::logging::init_from_env;
use gatewire_core::middleware::ErasedMiddleware;
use gatewire_core::{DefaultHandlerConfig, GatewayHandler, ProxyRoute, RouteConfig};
use log::{error, info, warn};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "gatewire-server", about = "Demo gatewire gateway server")]
struct Args {
    /// Host to bind, overriding the config file's `host`.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the config file's `port`.
    #[arg(long)]
    port: Option<u16>,

    /// Run in route-service mode: forward every request that matches none
    /// of the configured routes to this upstream instead of returning 404.
    /// Overrides the config file's `forwarded_url`, if any.
    #[arg(long)]
    forwarded_url: Option<String>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_from_env();

    let args = Args::parse();

    let config = load_settings().unwrap_or_else(|e| {
        error!("failed to load gateway configuration: {e}");
        std::process::exit(1);
    });

    info!("loaded configuration with {} top-level route(s)", config.routes.len());

    let validation = validate(&config).unwrap_or_else(|e| {
        for err in &e.result.errors {
            error!("config error: {err}");
        }
        std::process::exit(1);
    });
    for warning in &validation.warnings {
        warn!("config warning: {warning}");
    }
    for recommendation in &validation.recommendations {
        info!("recommendation: {recommendation}");
    }

    let routes: Vec<ProxyRoute> = config
        .routes
        .into_iter()
        .map(ProxyRoute::check)
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|e| {
            error!("failed to compile routes: {e}");
            std::process::exit(1);
        });

    let forwarded_url_cfg = args
        .forwarded_url
        .map(|url| RouteConfig {
            name: "forwarded_url".to_string(),
            path: "/**".to_string(),
            url,
            ..Default::default()
        })
        .or(config.forwarded_url);

    let forwarded_url = forwarded_url_cfg
        .map(ProxyRoute::check)
        .transpose()
        .unwrap_or_else(|e| {
            error!("failed to compile forwarded_url route: {e}");
            std::process::exit(1);
        });

    let host = args.host.unwrap_or(config.host);
    let port = args.port.unwrap_or(config.port);

    let handler_config = DefaultHandlerConfig {
        routes,
        protected_headers: config.protected_headers,
        start_path: config.start_path,
        host: host.clone(),
        port,
        forwarded_url,
    };

    let middlewares: Vec<Arc<dyn ErasedMiddleware>> = vec![
        Arc::new(middleware::RouteStampMiddleware),
        Arc::new(middleware::AllowListAuthMiddleware),
    ];

    let handler = GatewayHandler::new(handler_config, middlewares).unwrap_or_else(|e| {
        error!("failed to build gateway handler: {e}");
        std::process::exit(1);
    });

    info!("starting gatewire-server on {host}:{port}");

    let server = HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(actix_web::middleware::Compress::default())
            .wrap(handler.clone())
    })
    .bind((host.as_str(), port))?
    .run();

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("server stopped gracefully"),
                Err(e) => error!("server error: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, stopping server...");
        }
    }

    Ok(())
}
