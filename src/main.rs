//! GiftPay gateway
//!
//! ```text
//! ┌───────────┐  webhook   ┌────────────┐  guarded writes  ┌──────────┐
//! │ Crypto Pay│──────────▶│ Settlement │────────────────▶│  Store   │
//! └───────────┘            └────────────┘                  │ (PG/mem) │
//! ┌───────────┐  claim     ┌────────────┐                  │          │
//! │  Mini-app │──────────▶│  Transfer  │────────────────▶│          │
//! └───────────┘            └────────────┘                  └──────────┘
//!                                 │ notifications (Bot API, fire-and-forget)
//!                                 ▼
//!                            ┌──────────┐
//!                            │ Telegram │
//!                            └──────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use giftpay::config::AppConfig;
use giftpay::gateway::{self, state::AppState};
use giftpay::notify::TelegramNotifier;
use giftpay::payment::CryptoPayClient;
use giftpay::store::{PgStore, Stores};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() {
    let env = get_env();
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("FATAL: failed to load config '{}': {:#}", env, e);
            std::process::exit(1);
        }
    };
    let _log_guard = giftpay::logging::init_logging(&config);

    info!(env = %env, version = env!("GIT_HASH"), "Starting GiftPay gateway");

    if let Err(e) = run(config).await {
        error!("FATAL: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    // ==========================================================================
    // Storage
    // ==========================================================================
    let (stores, pg) = match config.postgres_url.as_deref() {
        Some(url) => {
            let pg = Arc::new(PgStore::connect(url, config.postgres_max_connections).await?);
            pg.migrate().await?;
            info!("PostgreSQL connected, schema ready");
            (Stores::postgres(pg.clone()), Some(pg))
        }
        None => {
            warn!("postgres_url not set, using in-memory store (data is lost on exit)");
            (Stores::memory().0, None)
        }
    };

    // ==========================================================================
    // External collaborators
    // ==========================================================================
    let notifier = Arc::new(TelegramNotifier::new(
        &config.telegram.api_base,
        &config.telegram.bot_token,
        Duration::from_secs(config.telegram.timeout_secs),
    )?);
    let provider = Arc::new(CryptoPayClient::new(
        &config.crypto_pay.api_endpoint,
        &config.crypto_pay.api_token,
        Duration::from_secs(config.crypto_pay.timeout_secs),
    )?);

    if config.telegram.webapp_url.is_none() {
        warn!("telegram.webapp_url not set: notifications carry no button, inline share disabled");
    }

    let state = Arc::new(AppState::new(&config, &stores, pg, notifier, provider));
    gateway::run_server(&config.gateway, state).await
}
