pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::telegram_auth_middleware;
use crate::config::GatewayConfig;
use state::AppState;

/// Build the full router.
///
/// Mini-app routes sit behind Telegram init data auth; the provider webhook
/// and bot updates authenticate themselves (signature / nothing to protect).
pub fn create_router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // Mini-app Routes (init data auth)
    // ==========================================================================
    let app_routes = Router::new()
        .route(
            "/transaction/{id}/{sender_id}",
            get(handlers::claim_transaction),
        )
        .route(
            "/invoice/create-invoice/{gift_id}",
            post(handlers::create_invoice),
        )
        .route("/invoice/status/{invoice_id}", get(handlers::invoice_status))
        .layer(from_fn_with_state(
            state.auth.clone(),
            telegram_auth_middleware,
        ));

    // ==========================================================================
    // Inbound callbacks
    // ==========================================================================
    let callback_routes = Router::new()
        .route("/webhook", post(handlers::payment_webhook))
        .route("/bot/update", post(handlers::bot_update));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(app_routes)
        .merge(callback_routes)
        .with_state(state)
        // Stateless, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Start HTTP Gateway server
pub async fn run_server(config: &GatewayConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {} (port in use?)", addr))?;

    info!("Gateway listening on http://{}", addr);
    info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
