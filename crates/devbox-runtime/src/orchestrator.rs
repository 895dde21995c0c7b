//! Lifecycle orchestration for dev containers.
//!
//! The [`Orchestrator`] is the only component that touches both the
//! registry and the container runtime. Every operation re-reads the
//! registry; nothing is cached between calls.
//!
//! # Create
//!
//! A create inserts its record in the `creating` state before any runtime
//! side effect, under the same exclusive lock that re-checks the duplicate
//! name and both quotas. If anything after the insert fails, the record is
//! removed again, together with the container and volume this call
//! created. A volume that existed beforehand is left alone.

use std::thread;

use devbox_common::config::{DevboxConfig, ReadinessPolicy};
use devbox_common::error::{DevboxError, Result};
use devbox_common::types::{
    ContainerName, ContainerRecord, ContainerSpec, ContainerState, CpuLimit, MemoryLimit,
    RecordUpdate, now,
};
use devbox_registry::quota::QuotaPolicy;
use devbox_registry::store::RegistryStore;

use crate::driver::podman::PodmanDriver;
use crate::driver::{LaunchSpec, RuntimeDriver, RuntimeState};
use crate::identity::{GroupIdentityService, IdentityService};
use crate::secret::{self, OnePasswordProvider, SecretProvider};

/// Inputs to [`Orchestrator::create`], as received from the operator.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Requested container name.
    pub name: String,
    /// Identity creating the container.
    pub owner: String,
    /// CPU cores.
    pub cpu: u32,
    /// Memory limit, e.g. `4G`.
    pub memory: String,
    /// Launch the container, or only register it and its volume.
    pub start_immediately: bool,
    /// Enable the file-sync sidecar.
    pub sync_feature: bool,
}

/// Result of a successful create.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    /// The record as persisted.
    pub record: ContainerRecord,
    /// Set when the container started but never reported an address.
    pub warning: Option<String>,
}

/// Result of `start` or `stop`.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// The record after the operation.
    pub record: ContainerRecord,
    /// False when the container was already in the requested state.
    pub changed: bool,
}

/// Result of a destroy.
#[derive(Debug, Clone)]
pub struct DestroyOutcome {
    /// The record that was removed.
    pub record: ContainerRecord,
    /// Whether the data volume was left in place.
    pub volume_kept: bool,
}

/// A record together with what the runtime says about it.
#[derive(Debug, Clone)]
pub struct ContainerStatus {
    /// The registry record.
    pub record: ContainerRecord,
    /// Live runtime state, or `None` if the runtime is unreachable.
    pub runtime: Option<RuntimeState>,
}

/// Which records `list` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// Only the caller's containers.
    Own,
    /// Every container; administrators only.
    All,
}

/// Side effects a create has performed so far.
#[derive(Debug, Default)]
struct Provisioned {
    volume_created: bool,
    container_launched: bool,
}

/// Coordinates the registry, quota policy, runtime, vault, and identity
/// lookup.
pub struct Orchestrator {
    store: RegistryStore,
    quota: QuotaPolicy,
    driver: Box<dyn RuntimeDriver>,
    secrets: Box<dyn SecretProvider>,
    identity: Box<dyn IdentityService>,
    image: String,
    create_readiness: ReadinessPolicy,
    start_readiness: ReadinessPolicy,
}

impl Orchestrator {
    /// Creates an orchestrator backed by Podman, 1Password, and host
    /// groups.
    pub fn new(config: &DevboxConfig) -> Self {
        Self::with_collaborators(
            config,
            Box::new(PodmanDriver::new()),
            Box::new(OnePasswordProvider::from_config(config)),
            Box::new(GroupIdentityService::new()),
        )
    }

    /// Creates an orchestrator with explicit collaborators.
    pub fn with_collaborators(
        config: &DevboxConfig,
        driver: Box<dyn RuntimeDriver>,
        secrets: Box<dyn SecretProvider>,
        identity: Box<dyn IdentityService>,
    ) -> Self {
        Self {
            store: RegistryStore::from_config(config),
            quota: QuotaPolicy::from_config(config),
            driver,
            secrets,
            identity,
            image: config.container_image.clone(),
            create_readiness: config.create_readiness,
            start_readiness: config.start_readiness,
        }
    }

    /// The registry this orchestrator writes to.
    pub const fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Creates, registers, and optionally launches a container.
    ///
    /// # Errors
    ///
    /// Returns, in check order: [`DevboxError::Validation`],
    /// [`DevboxError::AlreadyExists`], [`DevboxError::QuotaExceeded`],
    /// [`DevboxError::RuntimeUnavailable`], a secret error, or any runtime
    /// or registry error raised after the record was inserted (in which
    /// case the create has been rolled back).
    pub fn create(&self, request: &CreateRequest) -> Result<CreateOutcome> {
        let name = ContainerName::parse(request.name.as_str())?;
        let cpu = CpuLimit::new(request.cpu)?;
        let memory = MemoryLimit::parse(request.memory.as_str())?;
        let owner = request.owner.as_str();

        let snapshot = self.store.read()?;
        if snapshot.contains(name.as_str()) {
            return Err(DevboxError::AlreadyExists {
                name: name.to_string(),
            });
        }
        self.quota.check(&snapshot, owner)?;
        self.ensure_runtime()?;

        let auth_key = self.secrets.get_auth_key(owner)?;
        let tags = secret::network_tags(owner);

        let spec = ContainerSpec {
            name,
            owner: owner.to_string(),
            cpu,
            memory,
            with_sync_feature: request.sync_feature,
        };
        let record = ContainerRecord::creating(&spec, now());
        let quota = self.quota;
        self.store.mutate(|registry| {
            if registry.contains(record.name().as_str()) {
                return Err(DevboxError::AlreadyExists {
                    name: record.name().to_string(),
                });
            }
            quota.check(registry, owner)?;
            registry.push(record.clone());
            Ok(())
        })?;
        tracing::info!(name = %record.name(), owner, "container registered");

        let mut provisioned = Provisioned::default();
        match self.provision(&record, auth_key, &tags, request.start_immediately, &mut provisioned) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.rollback(&record, &provisioned, &err);
                Err(err)
            }
        }
    }

    /// Steps of a create that run after the record exists.
    fn provision(
        &self,
        record: &ContainerRecord,
        auth_key: secret::AuthKey,
        tags: &str,
        start_immediately: bool,
        provisioned: &mut Provisioned,
    ) -> Result<CreateOutcome> {
        let name = record.name().as_str();
        let volume = record.volume_name();

        if !self.driver.volume_exists(volume)? {
            self.driver.create_volume(volume)?;
            provisioned.volume_created = true;
        }

        if !start_immediately {
            let record = self
                .store
                .update(name, &[RecordUpdate::Transition(ContainerState::Stopped)])?;
            tracing::info!(name, "container created without starting");
            return Ok(CreateOutcome {
                record,
                warning: None,
            });
        }

        let launch = LaunchSpec::for_record(record, self.image.as_str(), auth_key, tags);
        let preexisting = self.driver.container_exists(name)?;
        let launched = self.driver.run(&launch);
        provisioned.container_launched =
            !preexisting && self.driver.container_exists(name).unwrap_or(launched.is_ok());
        launched?;

        let address = self.wait_for_address(name, self.create_readiness);
        let warning = address.is_none().then(|| {
            format!("container '{name}' started but the network agent did not report an address in time")
        });
        let record = self.store.update(
            name,
            &[
                RecordUpdate::Transition(ContainerState::Running),
                RecordUpdate::AssignAddress(address),
            ],
        )?;
        if let Some(warning) = &warning {
            tracing::warn!(name, "{warning}");
        } else {
            tracing::info!(name, address = ?record.network_address(), "container running");
        }
        Ok(CreateOutcome { record, warning })
    }

    /// Undoes a failed create. Cleanup failures are logged, never raised.
    fn rollback(&self, record: &ContainerRecord, provisioned: &Provisioned, cause: &DevboxError) {
        let name = record.name().as_str();
        tracing::warn!(name, error = %cause, "create failed; rolling back");

        if provisioned.container_launched {
            if let Err(err) = self.driver.remove(name, true) {
                tracing::warn!(name, error = %err, "rollback could not remove container");
            }
        }
        if provisioned.volume_created {
            if let Err(err) = self.driver.remove_volume(record.volume_name()) {
                tracing::warn!(name, error = %err, "rollback could not remove volume");
            }
        }
        if let Err(err) = self.store.remove(name) {
            tracing::warn!(name, error = %err, "rollback could not remove registry record");
        }
    }

    /// Starts a stopped container and waits for its network address.
    ///
    /// A container registered without starting has no runtime instance
    /// yet; it is launched here with its owner's auth key.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::NotFound`], [`DevboxError::PermissionDenied`],
    /// [`DevboxError::InvalidState`] for a record stuck in `creating`,
    /// [`DevboxError::RuntimeUnavailable`], a secret error on first
    /// launch, or a runtime error.
    pub fn start(&self, caller: &str, name: &str) -> Result<TransitionOutcome> {
        let record = self.record(caller, name)?;
        match record.state() {
            ContainerState::Running => {
                return Ok(TransitionOutcome {
                    record,
                    changed: false,
                });
            }
            ContainerState::Creating => return Err(interrupted_create(&record, "start")),
            ContainerState::Stopped => {}
        }
        self.ensure_runtime()?;

        if self.driver.container_exists(name)? {
            self.driver.start(name)?;
        } else {
            // Registered with --no-start: only the volume exists so far.
            let owner = record.owner();
            let key = self.secrets.get_auth_key(owner)?;
            let tags = secret::network_tags(owner);
            let launch = LaunchSpec::for_record(&record, self.image.as_str(), key, &tags);
            self.driver.run(&launch)?;
            tracing::info!(name, "first launch of container");
        }
        let address = self.wait_for_address(name, self.start_readiness);
        let record = self.store.update(
            name,
            &[
                RecordUpdate::Transition(ContainerState::Running),
                RecordUpdate::AssignAddress(address),
                RecordUpdate::Touch(now()),
            ],
        )?;
        tracing::info!(name, caller, address = ?record.network_address(), "container started");
        Ok(TransitionOutcome {
            record,
            changed: true,
        })
    }

    /// Stops a running container.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start`].
    pub fn stop(&self, caller: &str, name: &str) -> Result<TransitionOutcome> {
        let record = self.record(caller, name)?;
        match record.state() {
            ContainerState::Stopped => {
                return Ok(TransitionOutcome {
                    record,
                    changed: false,
                });
            }
            ContainerState::Creating => return Err(interrupted_create(&record, "stop")),
            ContainerState::Running => {}
        }
        self.ensure_runtime()?;

        self.driver.stop(name)?;
        let record = self.store.update(
            name,
            &[
                RecordUpdate::Transition(ContainerState::Stopped),
                RecordUpdate::Touch(now()),
            ],
        )?;
        tracing::info!(name, caller, "container stopped");
        Ok(TransitionOutcome {
            record,
            changed: true,
        })
    }

    /// Removes a container, its volume (unless `keep_volume`), and its
    /// record. The record goes last, so a failed destroy can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::NotFound`], [`DevboxError::PermissionDenied`],
    /// [`DevboxError::RuntimeUnavailable`], or a runtime error.
    pub fn destroy(&self, caller: &str, name: &str, keep_volume: bool) -> Result<DestroyOutcome> {
        let record = self.record(caller, name)?;
        self.ensure_runtime()?;

        if self.driver.container_state(name)? == RuntimeState::Running {
            if let Err(err) = self.driver.stop(name) {
                tracing::warn!(name, error = %err, "graceful stop failed; forcing removal");
            }
        }
        if self.driver.container_exists(name)? {
            self.driver.remove(name, true)?;
        }
        let volume = record.volume_name();
        if !keep_volume && self.driver.volume_exists(volume)? {
            self.driver.remove_volume(volume)?;
        }

        let removed = self.store.remove(name)?.ok_or_else(|| DevboxError::NotFound {
            name: name.to_string(),
        })?;
        tracing::info!(name, caller, keep_volume, "container destroyed");
        Ok(DestroyOutcome {
            record: removed,
            volume_kept: keep_volume,
        })
    }

    /// Re-joins a running container to the overlay network with a fresh
    /// key for its owner.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::NotFound`], [`DevboxError::PermissionDenied`],
    /// [`DevboxError::InvalidState`] unless running,
    /// [`DevboxError::RuntimeUnavailable`], a secret error, or
    /// [`DevboxError::Runtime`] if the agent rejects the key. The record is
    /// only touched on success.
    pub fn rotate_secret(&self, caller: &str, name: &str) -> Result<ContainerRecord> {
        let record = self.record(caller, name)?;
        if record.state() != ContainerState::Running {
            return Err(DevboxError::InvalidState {
                name: name.to_string(),
                state: record.state(),
                message: "must be running to rotate the auth key".into(),
            });
        }
        self.ensure_runtime()?;

        let owner = record.owner();
        let key = self.secrets.get_auth_key(owner)?;
        self.driver
            .exec_auth_refresh(name, &key, &secret::network_tags(owner))?;

        let record = self.store.update(name, &[RecordUpdate::Touch(now())])?;
        tracing::info!(name, caller, "auth key rotated");
        Ok(record)
    }

    /// The record and the runtime's view of it.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::NotFound`] or [`DevboxError::PermissionDenied`].
    pub fn status(&self, caller: &str, name: &str) -> Result<ContainerStatus> {
        let record = self.record(caller, name)?;
        let runtime = if self.driver.available() {
            Some(self.driver.container_state(name)?)
        } else {
            tracing::debug!(name, "runtime unreachable; live state unknown");
            None
        };
        Ok(ContainerStatus { record, runtime })
    }

    /// Records visible to `caller`, optionally filtered by state.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::PermissionDenied`] for [`ListScope::All`]
    /// unless `caller` is an administrator, or a registry error.
    pub fn list(
        &self,
        caller: &str,
        scope: ListScope,
        state: Option<ContainerState>,
    ) -> Result<Vec<ContainerRecord>> {
        let records = match scope {
            ListScope::Own => self.store.list_by_owner(caller)?,
            ListScope::All => {
                if !self.identity.is_administrator(caller) {
                    return Err(DevboxError::PermissionDenied {
                        message: "--all requires admin privileges".into(),
                    });
                }
                self.store.list_all()?
            }
        };
        Ok(records
            .into_iter()
            .filter(|r| state.is_none_or(|s| r.state() == s))
            .collect())
    }

    /// Streams the container's log to the terminal.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::NotFound`], [`DevboxError::PermissionDenied`],
    /// [`DevboxError::RuntimeUnavailable`], or a runtime error.
    pub fn logs(&self, caller: &str, name: &str, follow: bool, tail: u32) -> Result<()> {
        let _record = self.record(caller, name)?;
        self.ensure_runtime()?;
        self.driver.stream_logs(name, follow, tail)
    }

    /// The named record, if `caller` owns it or is an administrator.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::NotFound`] or [`DevboxError::PermissionDenied`].
    pub fn record(&self, caller: &str, name: &str) -> Result<ContainerRecord> {
        let record = self
            .store
            .find_by_name(name)?
            .ok_or_else(|| DevboxError::NotFound {
                name: name.to_string(),
            })?;
        if record.is_owned_by(caller) || self.identity.is_administrator(caller) {
            return Ok(record);
        }
        tracing::debug!(name, caller, owner = record.owner(), "access denied");
        Err(DevboxError::PermissionDenied {
            message: format!("container '{name}' belongs to user '{}'", record.owner()),
        })
    }

    fn ensure_runtime(&self) -> Result<()> {
        if self.driver.available() {
            return Ok(());
        }
        Err(DevboxError::RuntimeUnavailable {
            message: "the container runtime is not installed or not responding".into(),
        })
    }

    /// Polls for the overlay address. Query errors count as "not yet".
    fn wait_for_address(&self, name: &str, policy: ReadinessPolicy) -> Option<String> {
        for attempt in 1..=policy.attempts {
            match self.driver.network_address(name) {
                Ok(Some(address)) => {
                    tracing::debug!(name, attempt, %address, "network agent ready");
                    return Some(address);
                }
                Ok(None) => {}
                Err(err) => tracing::debug!(name, attempt, error = %err, "address query failed"),
            }
            if attempt < policy.attempts {
                thread::sleep(policy.interval());
            }
        }
        None
    }
}

fn interrupted_create(record: &ContainerRecord, operation: &str) -> DevboxError {
    DevboxError::InvalidState {
        name: record.name().to_string(),
        state: record.state(),
        message: format!("cannot {operation} a container whose create did not finish"),
    }
}
