use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    pub level: String,
    /// Log every receiver invocation at debug level
    pub log_dispatch: bool,
    /// Log detected field changes at info level
    pub log_changes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        // Load .env if present so DATABASE_URL and friends are visible
        let _ = dotenvy::dotenv();

        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Logging overrides
        if let Ok(v) = env::var("OBSERVER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = env::var("OBSERVER_LOG_DISPATCH") {
            self.logging.log_dispatch = v.parse().unwrap_or(self.logging.log_dispatch);
        }
        if let Ok(v) = env::var("OBSERVER_LOG_CHANGES") {
            self.logging.log_changes = v.parse().unwrap_or(self.logging.log_changes);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT_SECS") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            logging: LoggingConfig {
                level: "debug".to_string(),
                log_dispatch: true,
                log_changes: true,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            logging: LoggingConfig {
                level: "info".to_string(),
                log_dispatch: false,
                log_changes: true,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            logging: LoggingConfig {
                level: "warn".to_string(),
                log_dispatch: false,
                log_changes: false,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
        }
    }
}

// Global singleton config - initialized on first access
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.log_dispatch);
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.logging.log_changes);
        assert_eq!(config.database.connection_timeout, 5);
        assert!(config.database.url.is_none());
    }
}
