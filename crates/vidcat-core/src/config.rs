//! Configuration module
//!
//! Settings are read from the environment (and a `.env` file when present).
//! Every value has a default except the database location, the storage bucket
//! for the S3 backend and the queue URLs for the SQS channel.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::storage_types::StorageBackend;

// Database
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_NAME: &str = "video_catalog";
const DEFAULT_DB_USER: &str = "postgres";
const DEFAULT_DB_SSLMODE: &str = "disable";

// Storage gateway
const STORAGE_TIMEOUT_MS: u64 = 3_000;
const STORAGE_RETRIES: u32 = 2;
const STORAGE_BACKOFF_BASE_MS: u64 = 200;
const STORAGE_BACKOFF_MAX_MS: u64 = 1_500;
const BREAKER_CONSECUTIVE_FAILS: u32 = 5;
const BREAKER_RESET_MS: u64 = 10_000;
const LIST_PAGE_SIZE: usize = 1_000;
const LOCAL_STORAGE_PATH: &str = "./data/storage";

// Deletion
const DELETE_DEADLINE_SECS: u64 = 30;

// Message channel
const SQS_WAIT_TIME_SECONDS: i32 = 20;

/// Resilience settings applied to every remote storage call.
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    /// Timeout of a single attempt.
    pub attempt_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Consecutive failures that open the circuit breaker.
    pub breaker_failure_threshold: u32,
    /// How long the breaker stays open before letting a probe through.
    pub breaker_cooldown: Duration,
    pub list_page_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(STORAGE_TIMEOUT_MS),
            max_retries: STORAGE_RETRIES,
            backoff_base: Duration::from_millis(STORAGE_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(STORAGE_BACKOFF_MAX_MS),
            breaker_failure_threshold: BREAKER_CONSECUTIVE_FAILS,
            breaker_cooldown: Duration::from_millis(BREAKER_RESET_MS),
            list_page_size: LIST_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, DigitalOcean Spaces, etc.)
    pub s3_endpoint: Option<String>,
    pub local_path: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeletionConfig {
    /// Delete catalog rows even when the storage client could not be built.
    /// Objects of deleted rows are orphaned while this is in effect.
    pub allow_without_storage: bool,
    pub default_deadline: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBackend {
    Sqs,
    Memory,
}

impl FromStr for ChannelBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqs" => Ok(ChannelBackend::Sqs),
            "memory" => Ok(ChannelBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid message channel: {}", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelConfig {
    pub backend: ChannelBackend,
    pub registered_queue_url: Option<String>,
    pub finalized_queue_url: Option<String>,
    pub aws_region: Option<String>,
    pub wait_time_seconds: i32,
    /// Requeue messages whose merge failed on a store error instead of dropping them.
    pub requeue_on_store_failure: bool,
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.backend == ChannelBackend::Sqs
            && (self.registered_queue_url.is_none() || self.finalized_queue_url.is_none())
        {
            return Err(anyhow::anyhow!(
                "MESSAGE_CHANNEL=sqs requires SQS_REGISTERED_QUEUE_URL and SQS_FINALIZED_QUEUE_URL"
            ));
        }
        if !(0..=20).contains(&self.wait_time_seconds) {
            return Err(anyhow::anyhow!(
                "SQS_WAIT_TIME_SECONDS must be between 0 and 20"
            ));
        }
        Ok(())
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub storage: StorageConfig,
    pub gateway: GatewayConfig,
    pub deletion: DeletionConfig,
    pub channel: ChannelConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| {
            get(key)
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };

        let database_url = match get("DATABASE_URL") {
            Some(url) => url,
            None => compose_database_url(&get)?,
        };

        let backend = match get("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StorageBackend::S3,
        };

        let storage = StorageConfig {
            backend,
            s3_bucket: get("S3_BUCKET"),
            s3_region: get("S3_REGION").or_else(|| get("AWS_REGION")),
            s3_endpoint: get("S3_ENDPOINT"),
            local_path: get("LOCAL_STORAGE_PATH").unwrap_or_else(|| LOCAL_STORAGE_PATH.to_string()),
        };

        let gateway = GatewayConfig {
            attempt_timeout: Duration::from_millis(parse_or(
                &get,
                "CATALOG_STORAGE_TIMEOUT_MS",
                STORAGE_TIMEOUT_MS,
            )?),
            max_retries: parse_or(&get, "CATALOG_STORAGE_RETRIES", STORAGE_RETRIES)?,
            backoff_base: Duration::from_millis(parse_or(
                &get,
                "CATALOG_STORAGE_BACKOFF_BASE_MS",
                STORAGE_BACKOFF_BASE_MS,
            )?),
            backoff_max: Duration::from_millis(parse_or(
                &get,
                "CATALOG_STORAGE_BACKOFF_MAX_MS",
                STORAGE_BACKOFF_MAX_MS,
            )?),
            breaker_failure_threshold: parse_or(
                &get,
                "CATALOG_CB_CONSECUTIVE_FAILS",
                BREAKER_CONSECUTIVE_FAILS,
            )?,
            breaker_cooldown: Duration::from_millis(parse_or(
                &get,
                "CATALOG_CB_RESET_MS",
                BREAKER_RESET_MS,
            )?),
            list_page_size: parse_or(&get, "CATALOG_STORAGE_LIST_PAGE_SIZE", LIST_PAGE_SIZE)?,
        };

        let deletion = DeletionConfig {
            allow_without_storage: flag("CATALOG_DELETE_WITHOUT_STORAGE"),
            default_deadline: Duration::from_secs(parse_or(
                &get,
                "CATALOG_DELETE_DEADLINE_SECS",
                DELETE_DEADLINE_SECS,
            )?),
        };

        let channel = ChannelConfig {
            backend: match get("MESSAGE_CHANNEL") {
                Some(raw) => raw.parse()?,
                None => ChannelBackend::Sqs,
            },
            registered_queue_url: get("SQS_REGISTERED_QUEUE_URL"),
            finalized_queue_url: get("SQS_FINALIZED_QUEUE_URL"),
            aws_region: get("AWS_REGION"),
            wait_time_seconds: parse_or(&get, "SQS_WAIT_TIME_SECONDS", SQS_WAIT_TIME_SECONDS)?,
            requeue_on_store_failure: flag("SQS_REQUEUE_ON_STORE_FAILURE"),
        };

        Ok(Self {
            environment: get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            database_url,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS)?,
            db_timeout_seconds: parse_or(&get, "DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS)?,
            storage,
            gateway,
            deletion,
            channel,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.storage.backend == StorageBackend::S3 && self.storage.s3_bucket.is_none() {
            return Err(anyhow::anyhow!("STORAGE_BACKEND=s3 requires S3_BUCKET"));
        }

        if self.gateway.breaker_failure_threshold == 0 {
            return Err(anyhow::anyhow!(
                "CATALOG_CB_CONSECUTIVE_FAILS must be greater than zero"
            ));
        }

        if self.gateway.list_page_size == 0 {
            return Err(anyhow::anyhow!(
                "CATALOG_STORAGE_LIST_PAGE_SIZE must be greater than zero"
            ));
        }

        if self.gateway.attempt_timeout.is_zero() {
            return Err(anyhow::anyhow!(
                "CATALOG_STORAGE_TIMEOUT_MS must be greater than zero"
            ));
        }

        Ok(())
    }
}

/// Parses `key` into its target type, or returns `default` when unset.
/// Values that do not fit the type are an error, never truncated.
fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T, anyhow::Error>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got {:?}", key, raw)),
        None => Ok(default),
    }
}

fn compose_database_url<G>(get: &G) -> Result<String, anyhow::Error>
where
    G: Fn(&str) -> Option<String>,
{
    let host = get("DB_HOST")
        .ok_or_else(|| anyhow::anyhow!("Either DATABASE_URL or DB_HOST must be set"))?;
    let port = get("DB_PORT")
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_DB_PORT);
    let user = get("DB_USER").unwrap_or_else(|| DEFAULT_DB_USER.to_string());
    let name = get("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
    let sslmode = get("DB_SSLMODE").unwrap_or_else(|| DEFAULT_DB_SSLMODE.to_string());

    let credentials = match get("DB_PASSWORD") {
        Some(password) => format!("{}:{}", user, password),
        None => user,
    };

    Ok(format!(
        "postgres://{}@{}:{}/{}?sslmode={}",
        credentials, host, port, name, sslmode
    ))
}
