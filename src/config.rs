//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub reconciliation: ReconciliationConfig,
    pub admin: AdminConfig,
    pub receipts: ReceiptsConfig,
    /// Run against the in-memory store instead of Postgres.
    pub skip_externals: bool,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
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

/// Which gateway backend serves payments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    MercadoPago,
    PagBank,
}

impl GatewayKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "mercadopago" | "mercado_pago" | "mp" => Some(GatewayKind::MercadoPago),
            "pagbank" | "pagseguro" => Some(GatewayKind::PagBank),
            _ => None,
        }
    }
}

/// Upper bound for `GATEWAY_MAX_RETRIES`.
pub const MAX_GATEWAY_RETRIES: u32 = 10;

/// Payment gateway credentials and transport settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub kind: GatewayKind,
    pub mp_access_token: Option<String>,
    pub mp_public_key: Option<String>,
    pub mp_webhook_secret: Option<String>,
    pub mp_base_url: String,
    pub pagbank_token: Option<String>,
    pub pagbank_production: bool,
    pub pagbank_base_url: Option<String>,
    pub notification_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// PIX status reconciliation settings
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub poll_interval: Duration,
    /// `None` keeps polling until a terminal status or an explicit stop.
    pub max_watch: Option<Duration>,
    pub auto_start: bool,
}

/// Admin dashboard settings
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub api_token: Option<String>,
    pub utc_offset_hours: i32,
    pub page_size: usize,
}

/// Receipt short-link settings
#[derive(Debug, Clone)]
pub struct ReceiptsConfig {
    pub public_base_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let skip_externals = env::var("SKIP_EXTERNALS")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env(skip_externals)?,
            logging: LoggingConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
            reconciliation: ReconciliationConfig::from_env()?,
            admin: AdminConfig::from_env()?,
            receipts: ReceiptsConfig::from_env(),
            skip_externals,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if !self.skip_externals {
            self.database.validate()?;
        }
        self.logging.validate()?;
        self.gateway.validate()?;
        self.reconciliation.validate()?;
        self.admin.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
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
    pub fn from_env(optional: bool) -> Result<Self, ConfigError> {
        let url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) if optional => String::new(),
            Err(_) => return Err(ConfigError::MissingVariable("DATABASE_URL".to_string())),
        };

        Ok(DatabaseConfig {
            url,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
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

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_kind = env::var("PAYMENT_GATEWAY").unwrap_or_else(|_| "mercadopago".to_string());
        let kind = GatewayKind::parse(&raw_kind)
            .ok_or_else(|| ConfigError::InvalidValue("PAYMENT_GATEWAY".to_string()))?;

        Ok(GatewayConfig {
            kind,
            mp_access_token: non_empty_var("MP_ACCESS_TOKEN"),
            mp_public_key: non_empty_var("MP_PUBLIC_KEY")
                .or_else(|| non_empty_var("NEXT_PUBLIC_MP_PUBLIC_KEY")),
            mp_webhook_secret: non_empty_var("MP_WEBHOOK_SECRET"),
            mp_base_url: env::var("MP_BASE_URL")
                .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            pagbank_token: non_empty_var("PAGBANK_TOKEN"),
            pagbank_production: env::var("PAGBANK_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
            pagbank_base_url: non_empty_var("PAGBANK_BASE_URL"),
            notification_url: non_empty_var("PAYMENT_NOTIFICATION_URL"),
            timeout_secs: env::var("GATEWAY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("GATEWAY_TIMEOUT_SECS".to_string()))?,
            max_retries: env::var("GATEWAY_MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("GATEWAY_MAX_RETRIES".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            GatewayKind::MercadoPago if self.mp_access_token.is_none() => {
                return Err(ConfigError::MissingVariable("MP_ACCESS_TOKEN".to_string()));
            }
            GatewayKind::PagBank if self.pagbank_token.is_none() => {
                return Err(ConfigError::MissingVariable("PAGBANK_TOKEN".to_string()));
            }
            _ => {}
        }

        if !self.mp_base_url.starts_with("http://") && !self.mp_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "MP_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_TIMEOUT_SECS".to_string(),
            ));
        }

        if self.max_retries > MAX_GATEWAY_RETRIES {
            return Err(ConfigError::InvalidValue(format!(
                "GATEWAY_MAX_RETRIES must be at most {}",
                MAX_GATEWAY_RETRIES
            )));
        }

        Ok(())
    }

    /// Base URL of the PagBank API for the configured environment.
    pub fn pagbank_url(&self) -> String {
        if let Some(url) = &self.pagbank_base_url {
            return url.clone();
        }
        if self.pagbank_production {
            "https://api.pagseguro.com".to_string()
        } else {
            "https://sandbox.api.pagseguro.com".to_string()
        }
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let interval_secs: u64 = env::var("RECONCILIATION_POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue("RECONCILIATION_POLL_INTERVAL_SECS".to_string())
            })?;
        let max_watch_secs: u64 = env::var("RECONCILIATION_MAX_WATCH_SECS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("RECONCILIATION_MAX_WATCH_SECS".to_string()))?;

        Ok(ReconciliationConfig {
            poll_interval: Duration::from_secs(interval_secs),
            max_watch: (max_watch_secs > 0).then(|| Duration::from_secs(max_watch_secs)),
            auto_start: env::var("RECONCILIATION_AUTO_START")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                != "false",
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "RECONCILIATION_POLL_INTERVAL_SECS cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_watch: None,
            auto_start: true,
        }
    }
}

impl AdminConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(AdminConfig {
            api_token: non_empty_var("ADMIN_API_TOKEN"),
            utc_offset_hours: env::var("DASHBOARD_UTC_OFFSET_HOURS")
                .unwrap_or_else(|_| "-3".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DASHBOARD_UTC_OFFSET_HOURS".to_string()))?,
            page_size: env::var("DASHBOARD_PAGE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DASHBOARD_PAGE_SIZE".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(ConfigError::InvalidValue(
                "DASHBOARD_UTC_OFFSET_HOURS must be between -12 and 14".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "DASHBOARD_PAGE_SIZE cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            utc_offset_hours: -3,
            page_size: 10,
        }
    }
}

impl ReceiptsConfig {
    pub fn from_env() -> Self {
        ReceiptsConfig {
            public_base_url: non_empty_var("RECEIPTS_PUBLIC_BASE_URL"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
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

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(kind: GatewayKind) -> GatewayConfig {
        GatewayConfig {
            kind,
            mp_access_token: Some("TEST-123".to_string()),
            mp_public_key: None,
            mp_webhook_secret: None,
            mp_base_url: "https://api.mercadopago.com".to_string(),
            pagbank_token: None,
            pagbank_production: false,
            pagbank_base_url: None,
            notification_url: None,
            timeout_secs: 5,
            max_retries: 1,
        }
    }

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: vec!["http://localhost".to_string()],
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_allowed_origins: vec![],
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn gateway_kind_parsing_accepts_aliases() {
        assert_eq!(GatewayKind::parse("MercadoPago"), Some(GatewayKind::MercadoPago));
        assert_eq!(GatewayKind::parse(" pagseguro "), Some(GatewayKind::PagBank));
        assert_eq!(GatewayKind::parse("stripe"), None);
    }

    #[test]
    fn gateway_requires_token_for_selected_backend() {
        assert!(gateway(GatewayKind::MercadoPago).validate().is_ok());
        assert!(matches!(
            gateway(GatewayKind::PagBank).validate(),
            Err(ConfigError::MissingVariable(_))
        ));
    }

    #[test]
    fn gateway_retries_are_capped() {
        let mut config = gateway(GatewayKind::MercadoPago);
        config.max_retries = MAX_GATEWAY_RETRIES;
        assert!(config.validate().is_ok());
        config.max_retries = 40;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn pagbank_url_follows_environment() {
        let mut config = gateway(GatewayKind::PagBank);
        assert_eq!(config.pagbank_url(), "https://sandbox.api.pagseguro.com");
        config.pagbank_production = true;
        assert_eq!(config.pagbank_url(), "https://api.pagseguro.com");
    }

    #[test]
    fn reconciliation_interval_cannot_be_zero() {
        let config = ReconciliationConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(ReconciliationConfig::default().validate().is_ok());
    }

    #[test]
    fn admin_offset_range_is_checked() {
        let config = AdminConfig {
            utc_offset_hours: 20,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
