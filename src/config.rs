//! Engine configuration
//!
//! Loaded from the daemon's TOML configuration. Every field has a default so
//! an empty document is a valid configuration.
//!
//! ```toml
//! map_timeout = 30.0
//! temp_dir = "/var/lib/filter/tmp"
//! trusted_keys = ["k9fy8hg1dgqhm3q9f4ik4xbsf4xgngjk5n63y6r6ktxzqe6cwody"]
//! ```

use crate::error::{MapError, Result};
use crate::signature::PublicKey;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest accepted interval, in seconds
pub const MAX_INTERVAL_SECS: f64 = u32::MAX as f64;

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.clamp(0.0, MAX_INTERVAL_SECS)).unwrap_or(Duration::ZERO)
}

fn default_map_timeout() -> f64 {
    60.0
}

fn default_initial_delay() -> f64 {
    1.0
}

fn default_dns_timeout() -> f64 {
    1.0
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_user_agent() -> String {
    format!("mapkeeper/{}", crate::VERSION)
}

/// Map engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Nominal refresh interval in seconds, also the HTTP operation timeout
    #[serde(default = "default_map_timeout")]
    pub map_timeout: f64,

    /// Base delay in seconds before the first refresh of a newly watched map
    #[serde(default = "default_initial_delay")]
    pub initial_delay: f64,

    /// DNS lookup timeout in seconds
    #[serde(default = "default_dns_timeout")]
    pub dns_timeout: f64,

    /// Directory for buffering HTTP response bodies
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Base-32 public keys accepted when a signer key is discovered
    #[serde(default)]
    pub trusted_keys: Vec<String>,

    /// User-Agent header sent with map requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            map_timeout: default_map_timeout(),
            initial_delay: default_initial_delay(),
            dns_timeout: default_dns_timeout(),
            temp_dir: default_temp_dir(),
            trusted_keys: Vec::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| MapError::Unreadable {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check intervals and trusted keys
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("map_timeout", self.map_timeout),
            ("initial_delay", self.initial_delay),
            ("dns_timeout", self.dns_timeout),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(MapError::Config(format!(
                    "{} must be a positive number of seconds, got {}",
                    name, value
                )));
            }
            if value > MAX_INTERVAL_SECS {
                return Err(MapError::Config(format!(
                    "{} must be at most {} seconds, got {}",
                    name, MAX_INTERVAL_SECS, value
                )));
            }
        }

        for key in &self.trusted_keys {
            PublicKey::from_base32(key.trim().as_bytes()).map_err(|_| {
                MapError::Config(format!("trusted key '{}' cannot be decoded", key))
            })?;
        }

        Ok(())
    }

    /// Refresh interval
    pub fn map_timeout(&self) -> Duration {
        seconds(self.map_timeout)
    }

    /// First-arming base delay
    pub fn initial_delay(&self) -> Duration {
        seconds(self.initial_delay)
    }

    /// DNS lookup timeout
    pub fn dns_timeout(&self) -> Duration {
        seconds(self.dns_timeout)
    }
}
