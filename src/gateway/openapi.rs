//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:3000/docs`
//! - OpenAPI JSON: `http://localhost:3000/api-docs/openapi.json`

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::WebhookAck;
use crate::models::UserSummary;
use crate::payment::{InvoiceLinks, InvoiceStatus};

/// Telegram Web App init data security scheme
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "telegram_init_data",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    r#"Telegram Web App auth: TelegramWebApp {initData}

initData is the raw URL-encoded string from `Telegram.WebApp.initData`.
Its `hash` must equal hex(HMAC-SHA256(HMAC-SHA256("WebAppData", bot_token), data_check_string))."#,
                ))),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "GiftPay API",
        version = "1.0.0",
        description = "Gift purchasing and peer transfer for a Telegram mini-app, settled over Crypto Pay.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        crate::gateway::handlers::webhook::payment_webhook,
        crate::gateway::handlers::bot::bot_update,
        crate::gateway::handlers::transaction::claim_transaction,
        crate::gateway::handlers::invoice::create_invoice,
        crate::gateway::handlers::invoice::invoice_status,
    ),
    components(
        schemas(
            HealthResponse,
            WebhookAck,
            InvoiceLinks,
            InvoiceStatus,
            UserSummary,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "System", description = "Health"),
        (name = "Payment", description = "Invoices and the provider webhook"),
        (name = "Transfer", description = "Claiming shared gifts"),
        (name = "Bot", description = "Telegram bot updates"),
    )
)]
pub struct ApiDoc;
