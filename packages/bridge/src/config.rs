//! Bridge configuration from environment variables.

use std::env;
use std::time::Duration;

use meridian_exclusion::{ExclusionEngine, ExclusionRule};
use meridian_parsers::TransformationType;

use crate::error::{BridgeError, BridgeResult};
use crate::retry::RetryPolicy;

/// Broker connection settings. The in-memory broker ignores these; a
/// deployment-profile gateway consumes them.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub vpn: String,
    pub username: String,
    pub password: String,
}

/// Object-store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub connection_string: Option<String>,
    pub container: String,
}

/// Encryption-at-rest settings.
#[derive(Debug, Clone)]
pub struct EncryptionSettings {
    pub enabled: bool,
    /// Development mode: master key from configuration instead of the vault.
    pub local_mode: bool,
    /// Base64 256-bit master key, required in local mode.
    pub local_master_key: Option<String>,
    /// Key-service endpoint, required in remote mode.
    pub key_service_uri: Option<String>,
    pub key_name: String,
}

/// Transformer wiring and retry/DLQ settings.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    pub enabled: bool,
    pub input_queue: String,
    pub output_queue: String,
    pub transformation_type: TransformationType,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub retry_factor: f64,
    pub retry_cap: Duration,
    pub dead_letter_destination: String,
    pub dlq_warn_threshold: u64,
    pub dlq_critical_threshold: u64,
}

impl TransformerConfig {
    /// The retry policy this configuration describes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: self.retry_base,
            factor: self.retry_factor,
            cap: self.retry_cap,
            max_attempts: self.max_attempts,
        }
    }
}

/// Storage worker-pool sizing.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_concurrency: usize,
    pub queue_capacity: usize,
}

/// Full bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub http_port: u16,
    pub broker: BrokerSettings,
    pub store: StoreSettings,
    pub encryption: EncryptionSettings,
    pub transformer: TransformerConfig,
    pub workers: WorkerSettings,
    /// Optional JSON array of exclusion rules loaded at startup.
    pub exclusion_rules_json: Option<String>,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> BridgeResult<T> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| BridgeError::Config(format!("{name} has an invalid value: {raw}"))),
    }
}

fn flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl BridgeConfig {
    /// Load configuration from the environment, with development defaults.
    pub fn from_env() -> BridgeResult<Self> {
        let transformation_type = match env::var("TRANSFORMER_TYPE") {
            Err(_) => TransformationType::Mt103ToMt202,
            Ok(raw) => serde_json::from_value(serde_json::Value::String(raw.clone()))
                .map_err(|_| {
                    BridgeError::Config(format!("TRANSFORMER_TYPE has an invalid value: {raw}"))
                })?,
        };

        let config = Self {
            http_port: parse_var("PORT", 8080u16)?,
            broker: BrokerSettings {
                host: var_or("BROKER_HOST", "tcp://localhost:55555"),
                vpn: var_or("BROKER_VPN", "default"),
                username: var_or("BROKER_USERNAME", "default"),
                password: var_or("BROKER_PASSWORD", "default"),
            },
            store: StoreSettings {
                connection_string: env::var("STORE_CONNECTION_STRING").ok(),
                container: var_or("STORE_CONTAINER", "solace-messages"),
            },
            encryption: EncryptionSettings {
                enabled: flag("ENCRYPTION_ENABLED", false),
                local_mode: flag("ENCRYPTION_LOCAL_MODE", true),
                local_master_key: env::var("ENCRYPTION_LOCAL_MASTER_KEY").ok(),
                key_service_uri: env::var("KEY_SERVICE_URI").ok(),
                key_name: var_or("KEY_SERVICE_KEY_NAME", "bridge-key"),
            },
            transformer: TransformerConfig {
                enabled: flag("TRANSFORMER_ENABLED", false),
                input_queue: var_or("TRANSFORMER_INPUT_QUEUE", "bridge/transform/input"),
                output_queue: var_or("TRANSFORMER_OUTPUT_QUEUE", "bridge/transform/output"),
                transformation_type,
                max_attempts: parse_var("TRANSFORMER_MAX_ATTEMPTS", 3u32)?,
                retry_base: Duration::from_millis(parse_var("RETRY_BASE_MS", 1_000u64)?),
                retry_factor: parse_var("RETRY_FACTOR", 2.0f64)?,
                retry_cap: Duration::from_millis(parse_var("RETRY_CAP_MS", 60_000u64)?),
                dead_letter_destination: var_or("DLQ_DESTINATION", "bridge/transform/dlq"),
                dlq_warn_threshold: parse_var("DLQ_WARN_THRESHOLD", 10u64)?,
                dlq_critical_threshold: parse_var("DLQ_CRITICAL_THRESHOLD", 100u64)?,
            },
            workers: WorkerSettings {
                max_concurrency: parse_var("WORKER_MAX_CONCURRENCY", 200usize)?,
                queue_capacity: parse_var("WORKER_QUEUE_CAPACITY", 1_000usize)?,
            },
            exclusion_rules_json: env::var("EXCLUSION_RULES_JSON").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.encryption.enabled {
            if self.encryption.local_mode && self.encryption.local_master_key.is_none() {
                return Err(BridgeError::Config(
                    "ENCRYPTION_LOCAL_MASTER_KEY is required in local mode".into(),
                ));
            }
            if !self.encryption.local_mode && self.encryption.key_service_uri.is_none() {
                return Err(BridgeError::Config(
                    "KEY_SERVICE_URI is required in remote mode".into(),
                ));
            }
        }
        if self.transformer.max_attempts == 0 {
            return Err(BridgeError::Config(
                "TRANSFORMER_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Startup seeding of the exclusion rule table from a JSON array.
pub struct ExclusionSeed;

impl ExclusionSeed {
    /// Parse `json` as a rule array and load every rule into `engine`.
    pub fn load(engine: &ExclusionEngine, json: &str) -> BridgeResult<usize> {
        let rules: Vec<ExclusionRule> = serde_json::from_str(json)?;
        let count = rules.len();
        for rule in rules {
            engine.add_rule(rule);
        }
        Ok(count)
    }
}
