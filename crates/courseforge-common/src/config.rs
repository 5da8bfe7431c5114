//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config.toml > defaults

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init`].
pub fn get() -> &'static AppConfig {
    CONFIG.get().expect("Config not initialized. Call courseforge_common::config::init() first.")
}

/// Initialize the global configuration from environment.
///
/// Should be called once at application startup, before any other code accesses config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("database.max_connections", 20)?
        .set_default("database.min_connections", 2)?
        .set_default("auth.access_token_ttl_secs", 900)? // 15 min
        .set_default("auth.refresh_token_ttl_secs", 2_592_000)? // 30 days
        .set_default("payments.webhook_secret", "")?
        .set_default("payments.checkout_base_url", "https://checkout.example.com/pay")?
        .set_default("payments.signature_tolerance_secs", 300)?
        .set_default("email.dispatch_interval_secs", 30)?
        .set_default("email.default_timezone", "UTC")?
        .set_default("video.render_url", "http://localhost:9100/render")?
        .set_default("video.render_timeout_secs", 600)?
        .set_default("audience.batch_size", 10_000)?
        .set_default("limits.max_page_size", 100)?
        .set_default("limits.max_batch_items", 200)?
        .set_default("limits.max_post_length", 10_000)?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (COURSEFORGE__SERVER__HOST, COURSEFORGE__DATABASE__URL, etc.)
        .add_source(
            config::Environment::with_prefix("COURSEFORGE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    pub email: EmailConfig,
    pub video: VideoConfig,
    pub audience: AudienceConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret (HS256) — should be 256+ bits of entropy
    pub jwt_secret: String,
    /// Access token TTL in seconds
    pub access_token_ttl_secs: u64,
    /// Refresh token TTL in seconds
    pub refresh_token_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    /// Shared secret used to sign payment-provider webhooks.
    /// Empty means webhooks are rejected outright.
    pub webhook_secret: String,
    /// Hosted checkout page; the order ID is appended as `?order=<id>`.
    pub checkout_base_url: String,
    /// Maximum accepted age of a webhook signature timestamp.
    pub signature_tolerance_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    /// How often the dispatcher looks for due email programs.
    pub dispatch_interval_secs: u64,
    /// IANA zone used when a program is created without one.
    pub default_timezone: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VideoConfig {
    /// Endpoint that turns a brief into a hosted video.
    pub render_url: String,
    pub render_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AudienceConfig {
    /// Identifiers per upload batch.
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub max_page_size: i64,
    pub max_batch_items: usize,
    pub max_post_length: usize,
}
