use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub upi: UpiConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub admin_token: String,
    pub renewal_token_secret: String,
    pub renewal_token_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpiConfig {
    pub payee_vpa: Option<String>,
    pub payee_name: String,
    pub currency: String,
    pub order_expiry_minutes: i64,
}

impl Default for UpiConfig {
    fn default() -> Self {
        Self {
            payee_vpa: None,
            payee_name: "Fitdesk Gym".to_string(),
            currency: "INR".to_string(),
            order_expiry_minutes: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    pub shared_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    pub cache_ttl_secs: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 300 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    pub smtp: Option<SmtpConfig>,
    pub whatsapp: Option<WhatsAppConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("database.max_connections", 10)?
            .set_default("auth.renewal_token_days", 7)?
            .set_default("upi.payee_name", "Fitdesk Gym")?
            .set_default("upi.currency", "INR")?
            .set_default("upi.order_expiry_minutes", 15)?
            .set_default("pricing.cache_ttl_secs", 300)?
            .set_default("rate_limit.max_requests", 60)?
            .set_default("rate_limit.window_secs", 60)?
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (with FITDESK__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("FITDESK").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Startup validation. The public base URL feeds every renewal link
    /// sent out by the expiry sweep, so a placeholder or unparseable value
    /// is rejected here rather than discovered per-request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.server.base_url)
            .map_err(|e| ConfigError::Message(format!("server.base_url is not a valid URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Message(
                "server.base_url must be an http(s) URL".to_string(),
            ));
        }
        if self.server.base_url.contains("example.com") || self.server.base_url.contains("change-me") {
            return Err(ConfigError::Message(
                "server.base_url still holds a placeholder value".to_string(),
            ));
        }
        if self.auth.renewal_token_secret.is_empty() {
            return Err(ConfigError::Message(
                "auth.renewal_token_secret must be set".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://fitdesk.db".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig {
                admin_token: "change-me-in-production".to_string(),
                renewal_token_secret: "change-me-in-production".to_string(),
                renewal_token_days: 7,
            },
            upi: UpiConfig::default(),
            webhook: WebhookConfig::default(),
            pricing: PricingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}
