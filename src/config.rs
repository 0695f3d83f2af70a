/// Configuration management for the Skytrade core
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub email: Option<EmailConfig>,
    pub geolocation: GeolocationConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public base URL used in emailed links
    pub public_url: String,
    /// Address shown to users in lockout/support copy
    pub support_email: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub core_db: PathBuf,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    /// Session lifetime in hours
    pub session_hours: i64,
}

/// Email (notification sink) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Geolocation lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    /// Endpoint queried as `{endpoint}/{ip}`, ip-api.com JSON shape
    pub endpoint: String,
    pub timeout_secs: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Login attempts allowed per source address per minute
    pub login_per_minute: u32,
    /// Coarse ceiling for unauthenticated requests per second
    pub unauthenticated_rps: u32,
    /// Coarse ceiling for authenticated requests per second
    pub authenticated_rps: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> CoreResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("SKYTRADE_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("SKYTRADE_PORT")
            .unwrap_or_else(|_| "8300".to_string())
            .parse()
            .map_err(|_| CoreError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("SKYTRADE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));
        let support_email = env::var("SKYTRADE_SUPPORT_EMAIL")
            .unwrap_or_else(|_| "support@skytrade.example".to_string());
        let version = env::var("SKYTRADE_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("SKYTRADE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let core_db = env::var("SKYTRADE_CORE_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("core.sqlite"));

        let jwt_secret = env::var("SKYTRADE_JWT_SECRET")
            .map_err(|_| CoreError::Validation("JWT secret required".to_string()))?;
        let session_hours = env::var("SKYTRADE_SESSION_HOURS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .unwrap_or(1);

        let email = match env::var("SKYTRADE_SMTP_URL") {
            Ok(smtp_url) => Some(EmailConfig {
                smtp_url,
                from_address: env::var("SKYTRADE_EMAIL_FROM")
                    .unwrap_or_else(|_| "no-reply@skytrade.example".to_string()),
            }),
            Err(_) => None,
        };

        let geolocation = GeolocationConfig {
            endpoint: env::var("SKYTRADE_GEO_ENDPOINT")
                .unwrap_or_else(|_| "http://ip-api.com/json".to_string()),
            timeout_secs: env::var("SKYTRADE_GEO_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
        };

        let rate_limit = RateLimitConfig {
            enabled: env::var("SKYTRADE_RATE_LIMIT_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(true),
            login_per_minute: env::var("SKYTRADE_LOGIN_RATE_PER_MINUTE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            unauthenticated_rps: env::var("SKYTRADE_UNAUTHENTICATED_RPS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            authenticated_rps: env::var("SKYTRADE_AUTHENTICATED_RPS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
        };

        let logging = LoggingConfig {
            level: env::var("SKYTRADE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        Ok(Self {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                support_email,
                version,
            },
            storage: StorageConfig {
                data_directory,
                core_db,
            },
            security: SecurityConfig {
                jwt_secret,
                session_hours,
            },
            email,
            geolocation,
            rate_limit,
            logging,
        })
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> CoreResult<()> {
        if self.security.jwt_secret.len() < 16 {
            return Err(CoreError::Validation(
                "JWT secret must be at least 16 characters".to_string(),
            ));
        }

        if self.service.port == 0 {
            return Err(CoreError::Validation("Port must be non-zero".to_string()));
        }

        if let Some(ref email) = self.email {
            if !email.smtp_url.starts_with("smtp://") {
                return Err(CoreError::Validation(
                    "SMTP URL must start with smtp://".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Shared fixture for unit tests across the crate
#[cfg(test)]
pub mod test_support {
    use super::*;

    pub fn test_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8300,
                public_url: "http://localhost:8300".to_string(),
                support_email: "support@skytrade.example".to_string(),
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                data_directory: "./data".into(),
                core_db: "./data/core.sqlite".into(),
            },
            security: SecurityConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
                session_hours: 1,
            },
            email: None,
            geolocation: GeolocationConfig {
                endpoint: "http://ip-api.com/json".to_string(),
                timeout_secs: 5,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                login_per_minute: 5,
                unauthenticated_rps: 10,
                authenticated_rps: 100,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_config;
    use super::*;

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut config = test_config();
        config.security.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_smtp_url_rejected() {
        let mut config = test_config();
        config.email = Some(EmailConfig {
            smtp_url: "http://mail.example".to_string(),
            from_address: "no-reply@skytrade.example".to_string(),
        });
        assert!(config.validate().is_err());
    }
}
