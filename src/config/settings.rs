use crate::dispatcher::StoreFailurePolicy;
use crate::error::ConfigError;
use crate::storage::StorageType;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://gptcloud.arc53.com";
pub const DEFAULT_MONGODB_DB_NAME: &str = "telegram_bot_memory";
pub const DEFAULT_MONGODB_COLLECTION_NAME: &str = "chat_histories";

/// Tunables. Every field has a built-in default, so neither the config
/// file nor any `APP__` variable is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub history: HistoryConfig,
    pub answer: AnswerConfig,
    pub store: StoreConfig,
    pub dispatcher: DispatcherConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Exchanges kept per conversation; 0 keeps everything.
    pub max_exchanges: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub timeout_secs: u64,
    pub failure_policy: StoreFailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub dedup_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub poll_timeout_secs: u64,
    pub lane_idle_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history: HistoryConfig { max_exchanges: 10 },
            answer: AnswerConfig { timeout_secs: 60 },
            store: StoreConfig {
                timeout_secs: 10,
                failure_policy: StoreFailurePolicy::Fail,
            },
            dispatcher: DispatcherConfig {
                dedup_capacity: 1024,
            },
            gateway: GatewayConfig {
                poll_timeout_secs: 30,
                lane_idle_secs: 300,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Layers `config/{CONFIG_ENV}` (optional) and `APP__*` variables over
    /// the defaults.
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());
        let defaults = Settings::default();

        let config = Config::builder()
            .set_default("history.max_exchanges", defaults.history.max_exchanges as i64)?
            .set_default("answer.timeout_secs", defaults.answer.timeout_secs as i64)?
            .set_default("store.timeout_secs", defaults.store.timeout_secs as i64)?
            .set_default("store.failure_policy", "fail")?
            .set_default(
                "dispatcher.dedup_capacity",
                defaults.dispatcher.dedup_capacity as i64,
            )?
            .set_default("gateway.poll_timeout_secs", defaults.gateway.poll_timeout_secs as i64)?
            .set_default("gateway.lane_idle_secs", defaults.gateway.lane_idle_secs as i64)?
            .set_default("logging.level", defaults.logging.level)?
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_secs(self.answer.timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.poll_timeout_secs)
    }

    pub fn lane_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.lane_idle_secs)
    }
}

/// Where the bot runs: credentials, the answer endpoint and the storage
/// backend. Read from the plain environment.
#[derive(Clone)]
pub struct Deployment {
    pub telegram_token: String,
    pub api_key: String,
    pub api_base: String,
    pub storage_type: StorageType,
    pub mongodb: Option<MongoConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoConfig {
    pub uri: String,
    pub db_name: String,
    pub collection_name: String,
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployment")
            .field("telegram_token", &"<redacted>")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("storage_type", &self.storage_type)
            .field("mongodb", &self.mongodb.as_ref().map(|m| &m.db_name))
            .finish()
    }
}

impl Deployment {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let telegram_token = require("TELEGRAM_BOT_TOKEN")?;
        let api_key = require("API_KEY")?;
        let api_base = get("API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let storage_type = match get("STORAGE_TYPE") {
            Some(raw) => raw.parse::<StorageType>().map_err(|_| ConfigError::Invalid {
                key: "STORAGE_TYPE",
                value: raw,
            })?,
            None => StorageType::Memory,
        };

        let mongodb = match storage_type {
            StorageType::Memory => None,
            StorageType::MongoDb => Some(MongoConfig {
                uri: require("MONGODB_URI")?,
                db_name: get("MONGODB_DB_NAME")
                    .unwrap_or_else(|| DEFAULT_MONGODB_DB_NAME.to_string()),
                collection_name: get("MONGODB_COLLECTION_NAME")
                    .unwrap_or_else(|| DEFAULT_MONGODB_COLLECTION_NAME.to_string()),
            }),
        };

        Ok(Self {
            telegram_token,
            api_key,
            api_base,
            storage_type,
            mongodb,
        })
    }
}
