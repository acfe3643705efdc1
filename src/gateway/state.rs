use std::sync::Arc;

use chrono::Duration;

use crate::auth::{AuthState, InitDataVerifier};
use crate::claim::TransferProtocol;
use crate::config::AppConfig;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::payment::{InvoiceProvider, InvoiceService, InvoiceSettings, WebhookVerifier};
use crate::settlement::SettlementEngine;
use crate::share::ShareService;
use crate::store::{PgStore, Stores};

/// Gateway application state, built once at startup and shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL handle for health checks; `None` on the in-memory store
    pub pg: Option<Arc<PgStore>>,
    pub settlement: Arc<SettlementEngine>,
    pub transfers: Arc<TransferProtocol>,
    pub invoices: Arc<InvoiceService>,
    pub share: Arc<ShareService>,
    pub dispatcher: NotificationDispatcher,
    pub webhook: WebhookVerifier,
    pub auth: AuthState,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        stores: &Stores,
        pg: Option<Arc<PgStore>>,
        notifier: Arc<dyn Notifier>,
        provider: Arc<dyn InvoiceProvider>,
    ) -> Self {
        let webapp_url = config.telegram.webapp_url.clone();
        let dispatcher = NotificationDispatcher::new(notifier);

        let settings = InvoiceSettings {
            accepted_assets: config.crypto_pay.accepted_assets.clone(),
            expires_in_secs: config.crypto_pay.invoice_expires_in_secs,
        };

        Self {
            pg,
            settlement: Arc::new(SettlementEngine::new(
                stores,
                dispatcher.clone(),
                webapp_url.clone(),
            )),
            transfers: Arc::new(TransferProtocol::new(
                stores,
                dispatcher.clone(),
                webapp_url.clone(),
            )),
            invoices: Arc::new(InvoiceService::new(stores, provider, settings)),
            share: Arc::new(ShareService::new(stores, webapp_url)),
            dispatcher,
            webhook: WebhookVerifier::new(
                config.crypto_pay.api_token.clone(),
                Duration::seconds(config.crypto_pay.freshness_window_secs),
            ),
            auth: AuthState {
                verifier: InitDataVerifier::new(
                    config.telegram.bot_token.clone(),
                    config.telegram.init_data_max_age_secs.map(Duration::seconds),
                ),
                users: stores.users.clone(),
            },
        }
    }

    pub fn storage_backend(&self) -> &'static str {
        if self.pg.is_some() { "postgres" } else { "memory" }
    }
}
