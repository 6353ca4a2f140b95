use crate::core::{AppError, AppResult};
use serde::Deserialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime_secs: u64,
    pub conn_max_idle_time_secs: u64,
}

impl DatabaseConfig {
    pub fn from_env() -> AppResult<Self> {
        Ok(DatabaseConfig {
            host: env::var("DATABASE_HOST")
                .map_err(|_| AppError::Configuration("DATABASE_HOST not set".to_string()))?,
            port: env::var("DATABASE_PORT")
                .unwrap_or_else(|_| "3306".to_string())
                .parse()
                .map_err(|_| AppError::Configuration("Invalid DATABASE_PORT".to_string()))?,
            user: env::var("DATABASE_USER")
                .map_err(|_| AppError::Configuration("DATABASE_USER not set".to_string()))?,
            password: env::var("DATABASE_PASSWORD")
                .map_err(|_| AppError::Configuration("DATABASE_PASSWORD not set".to_string()))?,
            name: env::var("DATABASE_NAME")
                .map_err(|_| AppError::Configuration("DATABASE_NAME not set".to_string()))?,
            ssl_mode: env::var("DATABASE_SSL_MODE").unwrap_or_else(|_| "preferred".to_string()),
            max_open_conns: env::var("DATABASE_MAX_OPEN_CONNS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| AppError::Configuration("Invalid DATABASE_MAX_OPEN_CONNS".to_string()))?,
            max_idle_conns: env::var("DATABASE_MAX_IDLE_CONNS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| AppError::Configuration("Invalid DATABASE_MAX_IDLE_CONNS".to_string()))?,
            conn_max_lifetime_secs: env::var("DATABASE_CONN_MAX_LIFETIME_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .map_err(|_| AppError::Configuration("Invalid DATABASE_CONN_MAX_LIFETIME_SECS".to_string()))?,
            conn_max_idle_time_secs: env::var("DATABASE_CONN_MAX_IDLE_TIME_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .map_err(|_| AppError::Configuration("Invalid DATABASE_CONN_MAX_IDLE_TIME_SECS".to_string()))?,
        })
    }

    fn ssl_mode(&self) -> AppResult<MySqlSslMode> {
        match self.ssl_mode.to_ascii_lowercase().as_str() {
            "disabled" => Ok(MySqlSslMode::Disabled),
            "preferred" => Ok(MySqlSslMode::Preferred),
            "required" => Ok(MySqlSslMode::Required),
            "verify_ca" => Ok(MySqlSslMode::VerifyCa),
            "verify_identity" => Ok(MySqlSslMode::VerifyIdentity),
            other => Err(AppError::Configuration(format!("unrecognized DATABASE_SSL_MODE '{other}'"))),
        }
    }

    /// Create a MySQL connection pool from the itemized connection fields
    /// rather than a single DSN, so each knob can be tuned independently.
    pub async fn create_pool(&self) -> AppResult<MySqlPool> {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(self.ssl_mode()?);

        MySqlPoolOptions::new()
            .max_connections(self.max_open_conns)
            .min_connections(self.max_idle_conns)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(self.conn_max_idle_time_secs))
            .max_lifetime(Duration::from_secs(self.conn_max_lifetime_secs))
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(AppError::Database)
    }
}
