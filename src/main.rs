//! # Call Bridge Backend - Main Application Entry Point
//!
//! Boots the HTTP server that carries the telephony media-stream WebSocket
//! and the service's operational endpoints.
//!
//! ## Application Architecture:
//! - **config**: application configuration (TOML file + environment variables)
//! - **state**: shared application state and HTTP metrics
//! - **health**: system health monitoring endpoints
//! - **middleware**: request logging and endpoint metrics
//! - **handlers**: runtime config + live-call inspection endpoints
//! - **error**: HTTP error responses and the relay error taxonomy
//! - **bridge**: the duplex audio relay core (one per call leg)
//! - **engine**: the conversational-engine seam and the echo default
//! - **websocket**: the media-stream actor binding transport to bridge

mod bridge;     // Duplex audio relay core (bridge/ directory)
mod config;     // Configuration management (config.rs)
mod engine;     // Conversational engine seam (engine.rs)
mod error;      // Error handling types (error.rs)
mod handlers;   // HTTP request handlers (handlers/ directory)
mod health;     // Health check endpoints (health.rs)
mod middleware; // Custom middleware (middleware/ directory)
mod state;      // Application state management (state.rs)
mod websocket;  // Media-stream WebSocket actor (websocket.rs)

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use engine::{ConversationEngine, EchoEngine};
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal, flipped by the signal handlers and polled by the
/// main task. This is the server's own stop flag; each call leg additionally
/// carries its own per-bridge stop signal.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting call-bridge-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    // The engine attached to every new call leg. EchoEngine loops caller
    // audio straight back; a real deployment substitutes its conversational
    // engine here.
    let conversation_engine: Arc<dyn ConversationEngine> = Arc::new(EchoEngine);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::from(conversation_engine.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/calls", web::get().to(handlers::list_calls))
                    .route("/calls/{connection_id}", web::get().to(handlers::get_call)),
            )
            // The telephony provider dials in here when a call's media
            // stream starts.
            .route("/ws/media", web::get().to(websocket::media_stream))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// `RUST_LOG` controls the filter; without it the service logs itself at
/// debug and actix at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_bridge_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Install SIGTERM/SIGINT handlers that flip the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait until the shutdown flag is set, checking every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
