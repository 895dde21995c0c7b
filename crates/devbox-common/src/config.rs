//! Configuration model for devbox.
//!
//! The configuration is assembled once at process start (normally from
//! `DEVBOX_*` environment variables) and then passed by value into the
//! orchestrator and quota policy. Nothing below the CLI reads the process
//! environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CREATE_READINESS_ATTEMPTS, DEFAULT_CONTAINER_IMAGE, DEFAULT_DATA_SUBDIR,
    DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_MAX_GLOBAL, DEFAULT_MAX_PER_USER, DEFAULT_VAULT,
    READINESS_INTERVAL_MS, REGISTRY_FILE_NAME, START_READINESS_ATTEMPTS, SYSTEM_DATA_DIR,
};
use crate::error::{DevboxError, Result};
use crate::types::{CpuLimit, MemoryLimit};

/// How long to wait for the overlay network agent to report an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    /// Number of polls before giving up.
    pub attempts: u32,
    /// Delay between polls, in milliseconds.
    pub interval_ms: u64,
}

impl ReadinessPolicy {
    /// Builds a policy from an attempt count and interval.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts,
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Delay between polls.
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Root configuration for devbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevboxConfig {
    /// Base directory for devbox state.
    pub data_dir: PathBuf,
    /// Path of the registry document.
    pub registry_file: PathBuf,
    /// 1Password vault holding per-user network auth keys.
    pub vault: String,
    /// Maximum containers per owner.
    pub max_per_user: usize,
    /// Maximum containers on the host.
    pub max_global: usize,
    /// CPU limit used when `create` is not given one.
    pub default_cpu: CpuLimit,
    /// Memory limit used when `create` is not given one.
    pub default_memory: MemoryLimit,
    /// Dev container image launched by the runtime.
    pub container_image: String,
    /// Upper bound on registry lock acquisition, in milliseconds.
    pub lock_timeout_ms: u64,
    /// Readiness polling after `create`.
    pub create_readiness: ReadinessPolicy,
    /// Readiness polling after `start`.
    pub start_readiness: ReadinessPolicy,
    /// Whether a vault service-account token was present at startup.
    pub secret_token_configured: bool,
}

impl Default for DevboxConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from(SYSTEM_DATA_DIR);
        Self {
            registry_file: data_dir.join(REGISTRY_FILE_NAME),
            data_dir,
            vault: DEFAULT_VAULT.to_string(),
            max_per_user: DEFAULT_MAX_PER_USER,
            max_global: DEFAULT_MAX_GLOBAL,
            default_cpu: CpuLimit::default(),
            default_memory: MemoryLimit::default(),
            container_image: DEFAULT_CONTAINER_IMAGE.to_string(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            create_readiness: ReadinessPolicy {
                attempts: CREATE_READINESS_ATTEMPTS,
                interval_ms: READINESS_INTERVAL_MS,
            },
            start_readiness: ReadinessPolicy {
                attempts: START_READINESS_ATTEMPTS,
                interval_ms: READINESS_INTERVAL_MS,
            },
            secret_token_configured: false,
        }
    }
}

impl DevboxConfig {
    /// Builds the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::Config`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Recognized keys: `DEVBOX_DATA_DIR`, `DEVBOX_REGISTRY_FILE`,
    /// `DEVBOX_OP_VAULT`, `DEVBOX_MAX_PER_USER`, `DEVBOX_MAX_GLOBAL`,
    /// `DEVBOX_DEFAULT_CPU`, `DEVBOX_DEFAULT_MEMORY`,
    /// `DEVBOX_CONTAINER_IMAGE`, `DEVBOX_LOCK_TIMEOUT_MS`, plus `HOME` for
    /// the default data directory and `OP_SERVICE_ACCOUNT_TOKEN` (presence
    /// only).
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::Config`] if a variable is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let data_dir = get("DEVBOX_DATA_DIR").map_or_else(
            || {
                get("HOME").map_or_else(
                    || PathBuf::from(SYSTEM_DATA_DIR),
                    |home| Path::new(&home).join(DEFAULT_DATA_SUBDIR),
                )
            },
            PathBuf::from,
        );
        let registry_file = get("DEVBOX_REGISTRY_FILE")
            .map_or_else(|| data_dir.join(REGISTRY_FILE_NAME), PathBuf::from);

        let default_cpu = match parse_var::<u32>(&get, "DEVBOX_DEFAULT_CPU")? {
            Some(cores) => {
                CpuLimit::new(cores).map_err(|e| config_error("DEVBOX_DEFAULT_CPU", &e))?
            }
            None => defaults.default_cpu,
        };
        let default_memory = match get("DEVBOX_DEFAULT_MEMORY") {
            Some(memory) => MemoryLimit::parse(memory)
                .map_err(|e| config_error("DEVBOX_DEFAULT_MEMORY", &e))?,
            None => defaults.default_memory,
        };

        let config = Self {
            data_dir,
            registry_file,
            vault: get("DEVBOX_OP_VAULT").unwrap_or(defaults.vault),
            max_per_user: parse_var(&get, "DEVBOX_MAX_PER_USER")?
                .unwrap_or(defaults.max_per_user),
            max_global: parse_var(&get, "DEVBOX_MAX_GLOBAL")?.unwrap_or(defaults.max_global),
            default_cpu,
            default_memory,
            container_image: get("DEVBOX_CONTAINER_IMAGE").unwrap_or(defaults.container_image),
            lock_timeout_ms: parse_var(&get, "DEVBOX_LOCK_TIMEOUT_MS")?
                .unwrap_or(defaults.lock_timeout_ms),
            create_readiness: defaults.create_readiness,
            start_readiness: defaults.start_readiness,
            secret_token_configured: get("OP_SERVICE_ACCOUNT_TOKEN").is_some(),
        };
        validate(&config)?;
        Ok(config)
    }

    /// Points the configuration at another data directory, moving the
    /// registry file along with it.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self.registry_file = self.data_dir.join(REGISTRY_FILE_NAME);
        self
    }

    /// Upper bound on registry lock acquisition.
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn parse_var<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    get(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| DevboxError::Config {
                message: format!("{key} must be a non-negative integer, got '{raw}'"),
            })
        })
        .transpose()
}

fn config_error(key: &str, err: &DevboxError) -> DevboxError {
    DevboxError::Config {
        message: format!("{key}: {err}"),
    }
}

fn validate(config: &DevboxConfig) -> Result<()> {
    if config.max_per_user == 0 || config.max_global == 0 {
        return Err(DevboxError::Config {
            message: "container limits must be at least 1".to_string(),
        });
    }
    if config.lock_timeout_ms == 0 {
        return Err(DevboxError::Config {
            message: "DEVBOX_LOCK_TIMEOUT_MS must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::ErrorKind;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = DevboxConfig::from_lookup(lookup(&[("HOME", "/home/alice")])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/home/alice/.local/share/devbox"));
        assert_eq!(
            config.registry_file,
            PathBuf::from("/home/alice/.local/share/devbox/containers.json")
        );
        assert_eq!(config.vault, "DevBox");
        assert_eq!(config.max_per_user, 5);
        assert_eq!(config.max_global, 7);
        assert_eq!(config.default_cpu.get(), 2);
        assert_eq!(config.default_memory.as_str(), "4G");
        assert_eq!(config.create_readiness.attempts, 60);
        assert_eq!(config.start_readiness.attempts, 30);
        assert!(!config.secret_token_configured);
    }

    #[test]
    fn environment_overrides_are_honored() {
        let config = DevboxConfig::from_lookup(lookup(&[
            ("DEVBOX_DATA_DIR", "/srv/devbox"),
            ("DEVBOX_OP_VAULT", "Engineering"),
            ("DEVBOX_MAX_PER_USER", "2"),
            ("DEVBOX_MAX_GLOBAL", "10"),
            ("DEVBOX_DEFAULT_CPU", "4"),
            ("DEVBOX_DEFAULT_MEMORY", "512M"),
            ("DEVBOX_LOCK_TIMEOUT_MS", "250"),
            ("OP_SERVICE_ACCOUNT_TOKEN", "ops_abc"),
        ]))
        .unwrap();
        assert_eq!(config.registry_file, PathBuf::from("/srv/devbox/containers.json"));
        assert_eq!(config.vault, "Engineering");
        assert_eq!(config.max_per_user, 2);
        assert_eq!(config.max_global, 10);
        assert_eq!(config.default_cpu.get(), 4);
        assert_eq!(config.default_memory.as_str(), "512M");
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
        assert!(config.secret_token_configured);
    }

    #[test]
    fn explicit_registry_file_wins() {
        let config = DevboxConfig::from_lookup(lookup(&[
            ("DEVBOX_DATA_DIR", "/srv/devbox"),
            ("DEVBOX_REGISTRY_FILE", "/tmp/registry.json"),
        ]))
        .unwrap();
        assert_eq!(config.registry_file, PathBuf::from("/tmp/registry.json"));
    }

    #[test]
    fn malformed_integer_is_a_config_error() {
        let err = DevboxConfig::from_lookup(lookup(&[("DEVBOX_MAX_PER_USER", "many")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("DEVBOX_MAX_PER_USER"));
    }

    #[test]
    fn out_of_range_default_cpu_is_rejected() {
        let err =
            DevboxConfig::from_lookup(lookup(&[("DEVBOX_DEFAULT_CPU", "128")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn zero_quota_is_rejected() {
        let err = DevboxConfig::from_lookup(lookup(&[("DEVBOX_MAX_GLOBAL", "0")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn with_data_dir_moves_registry() {
        let config = DevboxConfig::default().with_data_dir("/opt/devbox");
        assert_eq!(config.registry_file, PathBuf::from("/opt/devbox/containers.json"));
    }
}
