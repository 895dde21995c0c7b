//! System-wide constants and defaults.

/// Application name used in CLI output.
pub const APP_NAME: &str = "devbox";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "devbox-ctl";

/// Data directory relative to `$HOME` when `DEVBOX_DATA_DIR` is unset.
pub const DEFAULT_DATA_SUBDIR: &str = ".local/share/devbox";

/// Fallback data directory when no home directory can be resolved.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/devbox";

/// File name of the registry document inside the data directory.
pub const REGISTRY_FILE_NAME: &str = "containers.json";

/// Suffix appended to the registry path to form its lock file.
pub const LOCK_FILE_SUFFIX: &str = ".lock";

/// Registry schema version understood by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Suffix of the persistent volume derived from a container name.
pub const VOLUME_SUFFIX: &str = "-data";

/// Minimum container name length.
pub const NAME_MIN_LEN: usize = 3;

/// Maximum container name length.
pub const NAME_MAX_LEN: usize = 63;

/// Smallest accepted CPU limit.
pub const CPU_MIN: u8 = 1;

/// Largest accepted CPU limit.
pub const CPU_MAX: u8 = 64;

/// Default 1Password vault holding the network auth keys.
pub const DEFAULT_VAULT: &str = "DevBox";

/// Default per-owner container cap.
pub const DEFAULT_MAX_PER_USER: usize = 5;

/// Default host-wide container cap.
pub const DEFAULT_MAX_GLOBAL: usize = 7;

/// Default CPU limit for new containers.
pub const DEFAULT_CPU: u8 = 2;

/// Default memory limit for new containers.
pub const DEFAULT_MEMORY: &str = "4G";

/// Default dev container image.
pub const DEFAULT_CONTAINER_IMAGE: &str = "localhost/devcontainer:latest";

/// Default bound on registry lock acquisition, in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 10_000;

/// Readiness poll attempts after `create`.
pub const CREATE_READINESS_ATTEMPTS: u32 = 60;

/// Readiness poll attempts after `start`.
pub const START_READINESS_ATTEMPTS: u32 = 30;

/// Delay between readiness poll attempts, in milliseconds.
pub const READINESS_INTERVAL_MS: u64 = 1_000;

/// Prefix every valid network auth key carries.
pub const AUTH_KEY_PREFIX: &str = "tskey-";

/// Mount point of the persistent volume inside the container.
pub const VOLUME_MOUNT_POINT: &str = "/home/dev";

/// Host groups whose members are treated as administrators.
pub const ADMIN_GROUPS: &[&str] = &["wheel", "sudo"];

/// Default number of log lines shown by `logs`.
pub const DEFAULT_LOG_TAIL: u32 = 100;
