//! Engine configuration snapshot.
//!
//! The host hands the engine a flat key/value environment. Keys starting with
//! [`KEY_PREFIX`] belong to the engine; every such key must be recognized and
//! carry a decimal value of the declared width.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Namespace tag for engine tunables in the host environment.
pub const KEY_PREFIX: &str = "V8_";

const THREAD_POOL_SIZE: &str = "V8_thread_pool_size";
const MAX_SEMI_SPACE_SIZE_IN_KB: &str = "V8_max_semi_space_size_in_kb";
const MAX_OLD_SPACE_SIZE: &str = "V8_max_old_space_size";
const CODE_RANGE_SIZE: &str = "V8_code_range_size";
const ZONE_POOL_SIZE: &str = "V8_zone_pool_size";

/// Immutable engine tunables. Zero means "engine default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub thread_pool_size: u16,
    pub max_semi_space_size_in_kb: u32,
    pub max_old_space_size: u16,
    pub code_range_size: u16,
    pub max_zone_pool_size: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_pool_size: 2,
            max_semi_space_size_in_kb: 0,
            max_old_space_size: 0,
            code_range_size: 0,
            max_zone_pool_size: 0,
        }
    }
}

impl EngineConfig {
    /// Parse from a flat key/value mapping. Keys outside the engine
    /// namespace are ignored.
    pub fn from_env_map<I, K, V>(env: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in env {
            let (key, value) = (key.as_ref(), value.as_ref());
            if !key.starts_with(KEY_PREFIX) {
                continue;
            }
            match key {
                THREAD_POOL_SIZE => config.thread_pool_size = parse_u16(key, value)?,
                MAX_SEMI_SPACE_SIZE_IN_KB => {
                    config.max_semi_space_size_in_kb = parse_u32(key, value)?
                }
                MAX_OLD_SPACE_SIZE => config.max_old_space_size = parse_u16(key, value)?,
                CODE_RANGE_SIZE => config.code_range_size = parse_u16(key, value)?,
                ZONE_POOL_SIZE => config.max_zone_pool_size = parse_u16(key, value)?,
                _ => {
                    return Err(ConfigError::UnknownKey {
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(config)
    }

    /// Parse from the current process environment.
    pub fn from_process_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars())
    }

    /// Parse from a flat TOML table whose values are strings.
    ///
    /// ```toml
    /// V8_thread_pool_size = "4"
    /// V8_max_old_space_size = "512"
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let table: toml::Table =
            toml::from_str(text).map_err(|e| ConfigError::Document(e.to_string()))?;
        let mut pairs = Vec::with_capacity(table.len());
        for (key, value) in table {
            match value {
                toml::Value::String(s) => pairs.push((key, s)),
                other => {
                    return Err(ConfigError::Document(format!(
                        "field [{}] must be a string, found {}",
                        key,
                        other.type_str()
                    )));
                }
            }
        }
        Self::from_env_map(pairs)
    }

    /// Serialize to the structured form used in diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "thread_pool_size": self.thread_pool_size,
            "max_semi_space_size_in_kb": self.max_semi_space_size_in_kb,
            "max_old_space_size": self.max_old_space_size,
            "code_range_size": self.code_range_size,
            "max_zone_pool_size": self.max_zone_pool_size,
        })
    }

    /// V8 command-line flags for the non-default heap tunables.
    ///
    /// V8 takes the semi-space size in megabytes, so the KB value is rounded up.
    pub fn v8_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.max_semi_space_size_in_kb > 0 {
            let mb = self.max_semi_space_size_in_kb.div_ceil(1024);
            flags.push(format!("--max-semi-space-size={}", mb));
        }
        if self.max_old_space_size > 0 {
            flags.push(format!("--max-old-space-size={}", self.max_old_space_size));
        }
        flags
    }
}

fn non_empty<'a>(key: &str, value: &'a str) -> Result<&'a str, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::EmptyValue {
            key: key.to_string(),
        });
    }
    Ok(value)
}

// `str::parse` accepts a leading '+'; only plain decimal digits are valid here.
fn digits<'a>(key: &str, value: &'a str) -> Result<&'a str, ConfigError> {
    let value = non_empty(key, value)?;
    if value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(value)
    } else {
        Err(invalid(key, value, "not a decimal number"))
    }
}

fn invalid(key: &str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    let text = digits(key, value)?;
    text.parse::<u16>().map_err(|e| invalid(key, value, e))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    let text = digits(key, value)?;
    text.parse::<u32>().map_err(|e| invalid(key, value, e))
}
