/*
 * Responsibility
 * - Config読み込み → Router 組み立て
 * - Middleware の適用 (AppBuilder 経由、登録順 = 実行順)
 * - axum::serve() で起動
 */
use std::{panic, process};

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::builder::AppBuilder;
use crate::config::Config;
use crate::controllers;
use crate::error::AppError;
use crate::middleware::body::BodyParseOptions;
use crate::middleware::request_id::RequestIdOptions;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,app_bootstrap=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    // Keep the default hook as a fallback (prints to stderr with location/payload).
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<(), AppError> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting API in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let app = build_router(&config)?;

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .map_err(|_| AppError::Internal)?;
    axum::serve(listener, app)
        .await
        .map_err(|_| AppError::Internal)?;

    Ok(())
}

/// Middleware order (outermost first): trace → request id → CORS → security headers → SSL →
/// body parser → method override → controllers.
pub fn build_router(config: &Config) -> Result<Router, AppError> {
    let mut builder = AppBuilder::new(Router::new());

    builder
        .add_middleware(TraceLayer::new_for_http())
        .add_request_id_middleware(RequestIdOptions::default())
        .add_cors_support_middleware(config.cors.clone())
        .add_security_middlewares(config.security.clone())
        .add_enforce_ssl_middleware(config.enforce_ssl.clone())
        .add_body_parse_middleware(BodyParseOptions::default())
        .add_method_override_middleware(config.method_override.clone());

    let registry = controllers::registry();
    match &config.controllers_dir {
        Some(dir) => {
            builder.load_controllers(dir, &registry)?;
        }
        None => {
            builder.load_registered_controllers(&registry);
        }
    }

    Ok(builder.into_router())
}
