//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;
use std::time::Duration;

use crate::payments::types::PaymentMethod;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub rails: RailConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Run against the in-memory store instead of Postgres
    pub skip_externals: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
    pub run_migrations: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Downstream rail endpoints and frontend pages the orchestrator redirects to
#[derive(Debug, Clone)]
pub struct RailConfig {
    pub card_page_url: String,
    pub qr_page_url: String,
    pub crypto_page_url: String,
    pub subscription_page_url: String,
    pub bank_gateway_url: String,
    pub paypal_service_url: String,
    pub crypto_service_url: String,
    pub webshop_notify_url: String,
    pub nbs_upload_url: String,
    pub outbound_timeout: Duration,
    pub enabled_methods: Vec<PaymentMethod>,
    pub outbound_queue_capacity: usize,
    /// Outbound deliveries running at once
    pub outbound_max_in_flight: usize,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let server = ServerConfig::from_env()?;
        let database = DatabaseConfig::from_env(server.skip_externals)?;

        Ok(AppConfig {
            server,
            database,
            logging: LoggingConfig::from_env()?,
            rails: RailConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if !self.server.skip_externals {
            self.database.validate()?;
        }
        self.logging.validate()?;
        self.rails.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3001,http://localhost:3002".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            skip_externals: env::var("SKIP_EXTERNALS")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                == "true",
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env(skip_externals: bool) -> Result<Self, ConfigError> {
        let url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) if skip_externals => String::new(),
            Err(_) => return Err(ConfigError::MissingVariable("DATABASE_URL".to_string())),
        };

        Ok(DatabaseConfig {
            url,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
            run_migrations: env::var("RUN_MIGRATIONS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RUN_MIGRATIONS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl Default for RailConfig {
    fn default() -> Self {
        Self {
            card_page_url: "http://localhost:3001/card".to_string(),
            qr_page_url: "http://localhost:3001/qr".to_string(),
            crypto_page_url: "http://localhost:3002/payment".to_string(),
            subscription_page_url: "http://localhost:3001/subscription".to_string(),
            bank_gateway_url: "http://bank_gateway_service:8080/payment".to_string(),
            paypal_service_url: "http://paypal_service:8080/payment".to_string(),
            crypto_service_url: "http://crypto_service:8080".to_string(),
            webshop_notify_url: "http://webshop_service:8080/purchase-status".to_string(),
            nbs_upload_url: "https://nbs.rs/QRcode/api/qr/v1/upload".to_string(),
            outbound_timeout: Duration::from_secs(10),
            enabled_methods: PaymentMethod::ALL.to_vec(),
            outbound_queue_capacity: 1024,
            outbound_max_in_flight: 64,
        }
    }
}

impl RailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let url = |key: &str, default: String| env::var(key).unwrap_or(default);

        let enabled_raw = env::var("ENABLED_PAYMENT_METHODS")
            .unwrap_or_else(|_| "card,qr,paypal,crypto".to_string());
        let mut enabled_methods = Vec::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            let method: PaymentMethod = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("ENABLED_PAYMENT_METHODS: {}", value)))?;
            if !enabled_methods.contains(&method) {
                enabled_methods.push(method);
            }
        }

        Ok(RailConfig {
            card_page_url: url("CARD_PAYMENT_PAGE_URL", defaults.card_page_url),
            qr_page_url: url("QR_PAYMENT_PAGE_URL", defaults.qr_page_url),
            crypto_page_url: url("CRYPTO_PAYMENT_PAGE_URL", defaults.crypto_page_url),
            subscription_page_url: url("SUBSCRIPTION_PAGE_URL", defaults.subscription_page_url),
            bank_gateway_url: url("BANK_GATEWAY_URL", defaults.bank_gateway_url),
            paypal_service_url: url("PAYPAL_SERVICE_URL", defaults.paypal_service_url),
            crypto_service_url: url("CRYPTO_SERVICE_URL", defaults.crypto_service_url),
            webshop_notify_url: url("WEBSHOP_NOTIFY_URL", defaults.webshop_notify_url),
            nbs_upload_url: url("NBS_QR_UPLOAD_URL", defaults.nbs_upload_url),
            outbound_timeout: Duration::from_secs(
                env::var("OUTBOUND_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("OUTBOUND_TIMEOUT_SECS".to_string()))?,
            ),
            enabled_methods,
            outbound_queue_capacity: env::var("OUTBOUND_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("OUTBOUND_QUEUE_CAPACITY".to_string()))?,
            outbound_max_in_flight: env::var("OUTBOUND_MAX_IN_FLIGHT")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("OUTBOUND_MAX_IN_FLIGHT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("CARD_PAYMENT_PAGE_URL", &self.card_page_url),
            ("QR_PAYMENT_PAGE_URL", &self.qr_page_url),
            ("CRYPTO_PAYMENT_PAGE_URL", &self.crypto_page_url),
            ("SUBSCRIPTION_PAGE_URL", &self.subscription_page_url),
            ("BANK_GATEWAY_URL", &self.bank_gateway_url),
            ("PAYPAL_SERVICE_URL", &self.paypal_service_url),
            ("CRYPTO_SERVICE_URL", &self.crypto_service_url),
            ("WEBSHOP_NOTIFY_URL", &self.webshop_notify_url),
            ("NBS_QR_UPLOAD_URL", &self.nbs_upload_url),
        ];
        for (key, value) in urls {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be a valid URL",
                    key
                )));
            }
        }

        if self.outbound_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "OUTBOUND_TIMEOUT_SECS".to_string(),
            ));
        }

        if self.enabled_methods.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one payment method must be enabled".to_string(),
            ));
        }

        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "OUTBOUND_QUEUE_CAPACITY".to_string(),
            ));
        }

        if self.outbound_max_in_flight == 0 {
            return Err(ConfigError::InvalidValue(
                "OUTBOUND_MAX_IN_FLIGHT".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
