mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod routes;
mod websocket;
mod ws;


use config::Config;
use db::{MemorySessionStore, SessionStore};
use routes::create_app;
use std::panic;
use std::sync::Arc;
use tracing::{info, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use ws::{Hub, HubHandle};

/// Shared state handed to every handler.
pub struct AppState {
    pub hub: HubHandle,
    pub store: Arc<dyn SessionStore>,
}

impl AppState {
    /// Start a hub over `store` and bundle both.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let hub = Hub::spawn(store.clone());
        Self { hub, store }
    }
}

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}; using defaults");
        Config::default()
    });
    let config = config::init_config(config);

    // Initialize tracing
    let default_filter = format!(
        "codestream_hub=debug,tower_http=debug,axum::rejection=trace,{}",
        config.log_level
    );
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();

    info!("Starting {} ({})", config.service_name, config.environment);
    if config.is_production() && config.cors_origins.is_none() {
        warn!("No CORS origins configured - allowing local frontend origins only");
    }
    if config.is_development() {
        info!("Development mode: debug logging enabled for codestream_hub");
    }

    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::from_config(config));
    let app_state = Arc::new(AppState::new(store));
    let app_routes = create_app(app_state, config);

    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    if let Err(e) = axum::serve(listener, app_routes).await {
        error!("Server error: {}", e);
    }
}
