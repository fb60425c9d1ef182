pub mod api;

use crate::{config::Config, docs::ApiDoc, handlers::{health_check, ready_check}, websocket::websocket_handler, AppState};
use axum::{http::{HeaderValue, Method, header}, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use api::create_api_routes;

/// Build the full application router: API, websocket endpoint, health checks and docs.
pub fn create_app(app_state: Arc<AppState>, config: &Config) -> Router {
    let root_routes = Router::<Arc<AppState>>::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .with_state(app_state.clone());

    Router::new()
        .merge(root_routes)
        .nest("/api", create_api_routes(app_state))
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::LINK])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(300))
}
