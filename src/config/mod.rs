pub mod database;
pub mod server;

use std::env;

use anyhow::Result;
use dotenvy::dotenv;

pub use database::DatabaseConfig;
pub use server::ServerConfig;

/// Acquirer HTTP client tuning (C5), including the transport-level retry
/// policy the middleware builds its backoff curve from.
#[derive(Debug, Clone)]
pub struct BankClientConfig {
    pub base_url: String,
    pub conn_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

/// Reconciler tuning (C7).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub interval_secs: u64,
    pub batch_size: i64,
    pub max_retries: i32,
    pub max_backoff_minutes: i64,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: String,
    pub log_level: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub bank_client: BankClientConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from environment variables, validating that
    /// everything without a sane default is present.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let database = DatabaseConfig::from_env()
            .map_err(|e| anyhow::anyhow!("invalid database configuration: {e}"))?;

        let bank_client = BankClientConfig {
            base_url: env::var("BANK_BASE_URL")
                .map_err(|_| anyhow::anyhow!("BANK_BASE_URL environment variable is required"))?,
            conn_timeout_secs: env::var("BANK_CONN_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BANK_CONN_TIMEOUT_SECS must be a valid number"))?,
            request_timeout_secs: env::var("BANK_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BANK_REQUEST_TIMEOUT_SECS must be a valid number"))?,
            max_retries: env::var("BANK_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BANK_MAX_RETRIES must be a valid number"))?,
            retry_base_delay_ms: env::var("RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_BASE_DELAY_MS must be a valid number"))?,
        };

        let worker = WorkerConfig {
            interval_secs: env::var("WORKER_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_INTERVAL_SECS must be a valid number"))?,
            batch_size: env::var("WORKER_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_BATCH_SIZE must be a valid number"))?,
            max_retries: env::var("WORKER_MAX_RETRIES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_MAX_RETRIES must be a valid number"))?,
            max_backoff_minutes: env::var("WORKER_MAX_BACKOFF_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_MAX_BACKOFF_MINUTES must be a valid number"))?,
        };

        let app_host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let app_port: u16 = env::var("APP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("APP_PORT must be a valid port number"))?;
        let read_timeout_secs: u64 = env::var("SERVER_READ_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("SERVER_READ_TIMEOUT_SECS must be a valid number"))?;
        let write_timeout_secs: u64 = env::var("SERVER_WRITE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("SERVER_WRITE_TIMEOUT_SECS must be a valid number"))?;
        let idle_timeout_secs: u64 = env::var("SERVER_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "75".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("SERVER_IDLE_TIMEOUT_SECS must be a valid number"))?;

        Ok(Self {
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            server: ServerConfig::new(app_host, app_port, read_timeout_secs, write_timeout_secs, idle_timeout_secs),
            database,
            bank_client,
            worker,
        })
    }
}
