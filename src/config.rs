use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL; absent → in-memory store (dev only)
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub postgres_max_connections: u32,
    pub crypto_pay: CryptoPayConfig,
    pub telegram: TelegramConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// Crypto Pay (payment provider)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CryptoPayConfig {
    pub api_endpoint: String,
    /// Overridden by `CRYPTOPAY_API_KEY`
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_freshness_window")]
    pub freshness_window_secs: i64,
    #[serde(default = "default_invoice_expiry")]
    pub invoice_expires_in_secs: u64,
    #[serde(default = "default_accepted_assets")]
    pub accepted_assets: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

/// Telegram bot and mini-app
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default = "default_bot_api_base")]
    pub api_base: String,
    /// Overridden by `BOT_TOKEN`
    #[serde(default)]
    pub bot_token: String,
    /// Overridden by `WEBAPP_URL`
    #[serde(default)]
    pub webapp_url: Option<String>,
    /// Max age of Web App init data; `None` disables the check
    #[serde(default)]
    pub init_data_max_age_secs: Option<i64>,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_freshness_window() -> i64 {
    300
}

fn default_invoice_expiry() -> u64 {
    3600
}

fn default_accepted_assets() -> String {
    "USDT,TON,BTC,ETH".to_string()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_bot_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl AppConfig {
    /// Load `config/{env}.yaml`, then apply environment overrides
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Secrets and deployment URLs come from the environment when set
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = set("CRYPTOPAY_API_KEY") {
            self.crypto_pay.api_token = v;
        }
        if let Some(v) = set("CRYPTOPAY_API_ENDPOINT") {
            self.crypto_pay.api_endpoint = v;
        }
        if let Some(v) = set("BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = set("WEBAPP_URL") {
            self.telegram.webapp_url = Some(v);
        }
        if let Some(v) = set("DATABASE_URL") {
            self.postgres_url = Some(v);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.crypto_pay.api_token.is_empty() {
            bail!("crypto_pay.api_token is empty (set CRYPTOPAY_API_KEY)");
        }
        if self.crypto_pay.api_endpoint.is_empty() {
            bail!("crypto_pay.api_endpoint is empty");
        }
        if self.telegram.bot_token.is_empty() {
            bail!("telegram.bot_token is empty (set BOT_TOKEN)");
        }
        if self.crypto_pay.freshness_window_secs <= 0 {
            bail!("crypto_pay.freshness_window_secs must be positive");
        }
        Ok(())
    }
}
