//! Configuration Module
//!
//! Handles loading and validating engine configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{EngineError, Result};

// == Cache Config ==
/// Cache store parameters.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on the summed size of live entries
    pub max_size_bytes: u64,
    /// TTL in milliseconds for entries stored without an explicit TTL
    pub default_ttl_ms: u64,
    /// Mirror entries to one file per key under `cache_dir`
    pub persist_to_disk: bool,
    /// Directory used by the disk mirror
    pub cache_dir: PathBuf,
    /// Interval in seconds between background expiry sweeps
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 50 * 1024 * 1024,
            default_ttl_ms: 60 * 60 * 1000,
            persist_to_disk: false,
            cache_dir: PathBuf::from(".context-cache"),
            sweep_interval_secs: 60,
        }
    }
}

// == Thresholds ==
/// Limits checked by the performance monitor after every sample.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub max_operation_time_ms: u64,
    pub max_memory_mb: u64,
    pub max_tokens_per_operation: usize,
    pub min_cache_hit_rate_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_operation_time_ms: 5000,
            max_memory_mb: 100,
            max_tokens_per_operation: 100_000,
            min_cache_hit_rate_pct: 70.0,
        }
    }
}

impl Thresholds {
    /// Memory threshold expressed in bytes.
    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb * 1024 * 1024
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_operation_time_ms == 0 {
            return Err(EngineError::Configuration(
                "max_operation_time_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_memory_mb == 0 {
            return Err(EngineError::Configuration(
                "max_memory_mb must be greater than zero".to_string(),
            ));
        }
        if self.max_tokens_per_operation == 0 {
            return Err(EngineError::Configuration(
                "max_tokens_per_operation must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.min_cache_hit_rate_pct) {
            return Err(EngineError::Configuration(format!(
                "min_cache_hit_rate_pct must be within 0..=100, got {}",
                self.min_cache_hit_rate_pct
            )));
        }
        Ok(())
    }
}

// == Key Fallback ==
/// How `ContextEngine::cached_context` resolves a miss on the exact key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFallback {
    /// Only the exact key is tried
    #[default]
    Exact,
    /// Exact key, then the key without version, then the command-only key
    Graceful,
}

impl FromStr for KeyFallback {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(KeyFallback::Exact),
            "graceful" => Ok(KeyFallback::Graceful),
            other => Err(EngineError::Configuration(format!(
                "unknown key fallback policy '{}'",
                other
            ))),
        }
    }
}

// == Engine Config ==
/// Engine configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub thresholds: Thresholds,
    pub key_fallback: KeyFallback,
}

impl EngineConfig {
    /// Creates a new EngineConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CONTEXT_CACHE_MAX_BYTES` - Store capacity in bytes (default: 50 MiB)
    /// - `CONTEXT_CACHE_TTL_MS` - Default entry TTL (default: 1 hour)
    /// - `CONTEXT_CACHE_PERSIST` - Enable the disk mirror (default: false)
    /// - `CONTEXT_CACHE_DIR` - Disk mirror directory (default: `.context-cache`)
    /// - `CONTEXT_CACHE_SWEEP_SECS` - Expiry sweep interval (default: 60)
    /// - `CONTEXT_MAX_OPERATION_MS` - Slow operation threshold (default: 5000)
    /// - `CONTEXT_MAX_MEMORY_MB` - Memory delta threshold (default: 100)
    /// - `CONTEXT_MAX_TOKENS_PER_OPERATION` - Token threshold (default: 100000)
    /// - `CONTEXT_MIN_CACHE_HIT_PCT` - Minimum cache hit rate (default: 70)
    /// - `CONTEXT_KEY_FALLBACK` - `exact` or `graceful` (default: exact)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache: CacheConfig {
                max_size_bytes: env_or("CONTEXT_CACHE_MAX_BYTES", defaults.cache.max_size_bytes),
                default_ttl_ms: env_or("CONTEXT_CACHE_TTL_MS", defaults.cache.default_ttl_ms),
                persist_to_disk: env_or("CONTEXT_CACHE_PERSIST", defaults.cache.persist_to_disk),
                cache_dir: env::var("CONTEXT_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.cache.cache_dir),
                sweep_interval_secs: env_or(
                    "CONTEXT_CACHE_SWEEP_SECS",
                    defaults.cache.sweep_interval_secs,
                ),
            },
            thresholds: Thresholds {
                max_operation_time_ms: env_or(
                    "CONTEXT_MAX_OPERATION_MS",
                    defaults.thresholds.max_operation_time_ms,
                ),
                max_memory_mb: env_or("CONTEXT_MAX_MEMORY_MB", defaults.thresholds.max_memory_mb),
                max_tokens_per_operation: env_or(
                    "CONTEXT_MAX_TOKENS_PER_OPERATION",
                    defaults.thresholds.max_tokens_per_operation,
                ),
                min_cache_hit_rate_pct: env_or(
                    "CONTEXT_MIN_CACHE_HIT_PCT",
                    defaults.thresholds.min_cache_hit_rate_pct,
                ),
            },
            key_fallback: env_or("CONTEXT_KEY_FALLBACK", defaults.key_fallback),
        }
    }

    /// Rejects configurations the store and monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_size_bytes == 0 {
            return Err(EngineError::Configuration(
                "max_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(EngineError::Configuration(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        self.thresholds.validate()
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.cache.max_size_bytes, 50 * 1024 * 1024);
        assert_eq!(config.cache.default_ttl_ms, 3_600_000);
        assert!(!config.cache.persist_to_disk);
        assert_eq!(config.cache.sweep_interval_secs, 60);
        assert_eq!(config.thresholds.max_operation_time_ms, 5000);
        assert_eq!(config.key_fallback, KeyFallback::Exact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CONTEXT_CACHE_MAX_BYTES");
        env::remove_var("CONTEXT_CACHE_TTL_MS");
        env::remove_var("CONTEXT_MIN_CACHE_HIT_PCT");
        env::remove_var("CONTEXT_KEY_FALLBACK");

        let config = EngineConfig::from_env();
        assert_eq!(config.cache.max_size_bytes, 50 * 1024 * 1024);
        assert_eq!(config.cache.default_ttl_ms, 3_600_000);
        assert_eq!(config.thresholds.min_cache_hit_rate_pct, 70.0);
        assert_eq!(config.key_fallback, KeyFallback::Exact);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = EngineConfig::default();
        config.cache.max_size_bytes = 0;
        assert!(matches!(config.validate(), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_hit_rate_out_of_range() {
        let mut config = EngineConfig::default();
        config.thresholds.min_cache_hit_rate_pct = 120.0;
        assert!(matches!(config.validate(), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_key_fallback_parse() {
        assert_eq!("graceful".parse::<KeyFallback>().unwrap(), KeyFallback::Graceful);
        assert_eq!("EXACT".parse::<KeyFallback>().unwrap(), KeyFallback::Exact);
        assert!("sometimes".parse::<KeyFallback>().is_err());
    }
}
