//! Container runtime abstraction.
//!
//! The orchestrator only talks to the runtime through [`RuntimeDriver`].
//! [`podman::PodmanDriver`] is the shipped implementation; tests supply
//! their own.

pub mod podman;

use std::fmt;

use devbox_common::error::Result;
use devbox_common::types::{ContainerRecord, CpuLimit, MemoryLimit};
use serde::Serialize;

use crate::secret::AuthKey;

/// What the runtime reports about a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    /// The container process is running.
    Running,
    /// The container exists but is not running.
    Exited,
    /// The runtime has no such container.
    Absent,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Absent => write!(f, "not found"),
        }
    }
}

/// Everything the runtime needs to launch a dev container.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Container name.
    pub name: String,
    /// Hostname inside the container and on the overlay network.
    pub hostname: String,
    /// Persistent volume mounted as the home directory.
    pub volume: String,
    /// CPU limit.
    pub cpu: CpuLimit,
    /// Memory limit.
    pub memory: MemoryLimit,
    /// Image to run.
    pub image: String,
    /// Key the network agent joins with.
    pub auth_key: AuthKey,
    /// Tags the network agent advertises.
    pub tags: String,
    /// Whether the file-sync sidecar is enabled.
    pub sync_feature: bool,
}

impl LaunchSpec {
    /// Builds the launch parameters for a registered container.
    pub fn for_record(
        record: &ContainerRecord,
        image: impl Into<String>,
        auth_key: AuthKey,
        tags: impl Into<String>,
    ) -> Self {
        Self {
            name: record.name().to_string(),
            hostname: record.network_hostname().to_string(),
            volume: record.volume_name().to_string(),
            cpu: record.cpu_limit(),
            memory: record.memory_limit().clone(),
            image: image.into(),
            auth_key,
            tags: tags.into(),
            sync_feature: record.with_sync_feature(),
        }
    }
}

/// Operations the orchestrator needs from a container runtime.
///
/// Every method is a blocking call; none of them touch the registry.
pub trait RuntimeDriver: Send + Sync {
    /// Whether the runtime is installed and answering.
    fn available(&self) -> bool;

    /// Whether the named volume exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn volume_exists(&self, volume: &str) -> Result<bool>;

    /// Creates the named volume.
    ///
    /// # Errors
    ///
    /// Returns [`devbox_common::error::DevboxError::Runtime`] on failure.
    fn create_volume(&self, volume: &str) -> Result<()>;

    /// Removes the named volume.
    ///
    /// # Errors
    ///
    /// Returns [`devbox_common::error::DevboxError::Runtime`] on failure.
    fn remove_volume(&self, volume: &str) -> Result<()>;

    /// Whether a container with this name exists in any state.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn container_exists(&self, name: &str) -> Result<bool>;

    /// Live state of the named container.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn container_state(&self, name: &str) -> Result<RuntimeState>;

    /// Creates and starts a container in the background.
    ///
    /// # Errors
    ///
    /// Returns [`devbox_common::error::DevboxError::Runtime`] carrying the
    /// runtime's diagnostic output.
    fn run(&self, spec: &LaunchSpec) -> Result<()>;

    /// Starts an existing container.
    ///
    /// # Errors
    ///
    /// Returns [`devbox_common::error::DevboxError::Runtime`] on failure.
    fn start(&self, name: &str) -> Result<()>;

    /// Stops a running container.
    ///
    /// # Errors
    ///
    /// Returns [`devbox_common::error::DevboxError::Runtime`] on failure.
    fn stop(&self, name: &str) -> Result<()>;

    /// Removes a container; `force` also removes a running one.
    ///
    /// # Errors
    ///
    /// Returns [`devbox_common::error::DevboxError::Runtime`] on failure.
    fn remove(&self, name: &str, force: bool) -> Result<()>;

    /// Overlay network address of the container, once the agent has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried at all; "not
    /// connected yet" is `Ok(None)`.
    fn network_address(&self, name: &str) -> Result<Option<String>>;

    /// Re-joins the overlay network in place with a fresh key.
    ///
    /// # Errors
    ///
    /// Returns [`devbox_common::error::DevboxError::Runtime`] if the agent
    /// rejects the key.
    fn exec_auth_refresh(&self, name: &str, key: &AuthKey, tags: &str) -> Result<()>;

    /// Writes the container's log to the terminal.
    ///
    /// # Errors
    ///
    /// Returns [`devbox_common::error::DevboxError::Runtime`] if the
    /// runtime cannot produce the log.
    fn stream_logs(&self, name: &str, follow: bool, tail: u32) -> Result<()>;
}
