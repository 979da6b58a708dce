use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_PREFIX: &str = "emberq";
pub const DEFAULT_QUEUE: &str = "default";

/// Top-level config (emberq.toml + EMBERQ_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub queue: QueueSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Queue name; entities live under `<prefix>:<name>:…`.
    #[serde(default = "default_queue")]
    pub name: String,
    /// Shared key namespace prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: default_queue(),
            prefix: default_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}
fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}
fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

impl QueueConfig {
    /// Load config from a TOML file with EMBERQ_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ./emberq.toml
    ///
    /// Either may be absent; defaults fill the gaps. Env vars use `__` as the
    /// section separator, e.g. `EMBERQ_REDIS__URL=redis://cache:6379`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("emberq.toml");
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("EMBERQ_").split("__"))
            .extract()
            .map_err(|e| crate::error::QueueError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = QueueConfig::default();
        assert_eq!(config.redis.url, DEFAULT_REDIS_URL);
        assert_eq!(config.queue.prefix, "emberq");
        assert_eq!(config.queue.name, "default");
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let config = QueueConfig::load(Some("/nonexistent/emberq.toml")).unwrap();
        assert_eq!(config.queue.prefix, DEFAULT_PREFIX);
    }
}
