//! Domain primitive types used across the devbox workspace.
//!
//! Identifiers and resource limits are validated on construction, so any
//! value of these types that exists in memory (including one deserialized
//! from the registry) already satisfies the naming and resource rules.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, SubsecRound, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CPU_MAX, CPU_MIN, DEFAULT_CPU, DEFAULT_MEMORY, NAME_MAX_LEN, NAME_MIN_LEN, SCHEMA_VERSION,
    VOLUME_SUFFIX,
};
use crate::error::{DevboxError, Result};

#[allow(clippy::expect_used)]
static NAME_CHARSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("name pattern compiles"));

#[allow(clippy::expect_used)]
static MEMORY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+[MG]$").expect("memory pattern compiles"));

/// Current UTC time truncated to whole seconds.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Validated container name, also used as the network hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Validates and wraps a container name.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::Validation`] naming the first rule violated.
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let reject = |message: &str| DevboxError::Validation {
            field: "container name",
            value: name.clone(),
            message: message.to_string(),
        };

        let len = name.chars().count();
        if len < NAME_MIN_LEN {
            return Err(reject(&format!(
                "must be at least {NAME_MIN_LEN} characters"
            )));
        }
        if len > NAME_MAX_LEN {
            return Err(reject(&format!("must be at most {NAME_MAX_LEN} characters")));
        }
        if !NAME_CHARSET.is_match(&name) {
            return Err(reject(
                "may only contain lowercase letters, digits, and hyphens",
            ));
        }
        if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(reject("must start with a letter"));
        }
        if name.ends_with('-') {
            return Err(reject("must end with a letter or digit"));
        }
        if name.contains("--") {
            return Err(reject("must not contain consecutive hyphens"));
        }
        Ok(Self(name))
    }

    /// Returns the inner string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the persistent volume backing this container.
    pub fn volume_name(&self) -> String {
        format!("{}{VOLUME_SUFFIX}", self.0)
    }
}

impl TryFrom<String> for ContainerName {
    type Error = DevboxError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ContainerName> for String {
    fn from(name: ContainerName) -> Self {
        name.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CPU core limit in `1..=64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct CpuLimit(u8);

impl CpuLimit {
    /// Validates a CPU core count.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::Validation`] if the value is out of range.
    pub fn new(cores: u32) -> Result<Self> {
        u8::try_from(cores)
            .ok()
            .filter(|c| (CPU_MIN..=CPU_MAX).contains(c))
            .map(Self)
            .ok_or_else(|| DevboxError::Validation {
                field: "CPU limit",
                value: cores.to_string(),
                message: format!("must be between {CPU_MIN} and {CPU_MAX}"),
            })
    }

    /// Returns the number of cores.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for CpuLimit {
    fn default() -> Self {
        Self(DEFAULT_CPU)
    }
}

impl TryFrom<u32> for CpuLimit {
    type Error = DevboxError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CpuLimit> for u32 {
    fn from(cpu: CpuLimit) -> Self {
        Self::from(cpu.0)
    }
}

impl fmt::Display for CpuLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Memory limit such as `4G` or `512M`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryLimit(String);

impl MemoryLimit {
    /// Validates a memory limit string.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::Validation`] unless the value is digits
    /// followed by `M` or `G`.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if MEMORY_PATTERN.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(DevboxError::Validation {
                field: "memory limit",
                value,
                message: "must be a number followed by M or G".to_string(),
            })
        }
    }

    /// Returns the limit as passed to the runtime.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MemoryLimit {
    fn default() -> Self {
        Self(DEFAULT_MEMORY.to_string())
    }
}

impl TryFrom<String> for MemoryLimit {
    type Error = DevboxError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<MemoryLimit> for String {
    fn from(memory: MemoryLimit) -> Self {
        memory.0
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a container as last recorded by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Creation is in progress. Never the outcome of a completed operation.
    Creating,
    /// Container was launched.
    Running,
    /// Container exists but is not running.
    Stopped,
}

impl ContainerState {
    /// Whether the state machine permits moving from `self` to `to`.
    ///
    /// Staying in the same state is always permitted.
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Creating, Self::Creating | Self::Running | Self::Stopped)
                | (Self::Running | Self::Stopped, Self::Running | Self::Stopped)
        )
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Validated parameters of a container that is about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: ContainerName,
    /// Creating identity.
    pub owner: String,
    /// CPU cores.
    pub cpu: CpuLimit,
    /// Memory limit.
    pub memory: MemoryLimit,
    /// Whether the file-sync sidecar is enabled.
    pub with_sync_feature: bool,
}

/// A permitted change to a [`ContainerRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// Move to another lifecycle state.
    Transition(ContainerState),
    /// Set or clear the overlay network address.
    AssignAddress(Option<String>),
    /// Bump the last-activity timestamp.
    Touch(DateTime<Utc>),
}

/// Persistent record of one managed container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RecordRepr")]
pub struct ContainerRecord {
    name: ContainerName,
    owner: String,
    state: ContainerState,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    cpu_limit: CpuLimit,
    memory_limit: MemoryLimit,
    volume_name: String,
    network_hostname: String,
    network_address: Option<String>,
    with_sync_feature: bool,
}

impl ContainerRecord {
    /// Builds a fresh record in the `creating` state.
    pub fn creating(spec: &ContainerSpec, at: DateTime<Utc>) -> Self {
        let at = at.trunc_subsecs(0);
        Self {
            name: spec.name.clone(),
            owner: spec.owner.clone(),
            state: ContainerState::Creating,
            created_at: at,
            last_activity_at: at,
            cpu_limit: spec.cpu,
            memory_limit: spec.memory.clone(),
            volume_name: spec.name.volume_name(),
            network_hostname: spec.name.as_str().to_string(),
            network_address: None,
            with_sync_feature: spec.with_sync_feature,
        }
    }

    /// Container name.
    pub const fn name(&self) -> &ContainerName {
        &self.name
    }

    /// Identity that created the container.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Last recorded lifecycle state.
    pub const fn state(&self) -> ContainerState {
        self.state
    }

    /// Creation time.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last lifecycle-affecting operation.
    pub const fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    /// CPU cores passed to the runtime.
    pub const fn cpu_limit(&self) -> CpuLimit {
        self.cpu_limit
    }

    /// Memory limit passed to the runtime.
    pub const fn memory_limit(&self) -> &MemoryLimit {
        &self.memory_limit
    }

    /// Persistent volume name (`{name}-data`).
    pub fn volume_name(&self) -> &str {
        &self.volume_name
    }

    /// Overlay network hostname (equal to the name).
    pub fn network_hostname(&self) -> &str {
        &self.network_hostname
    }

    /// Overlay network address, once the agent reported one.
    pub fn network_address(&self) -> Option<&str> {
        self.network_address.as_deref()
    }

    /// Whether the file-sync sidecar is enabled.
    pub const fn with_sync_feature(&self) -> bool {
        self.with_sync_feature
    }

    /// Whether `identity` owns this container.
    pub fn is_owned_by(&self, identity: &str) -> bool {
        self.owner == identity
    }

    /// Applies every update or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::InvalidState`] if a transition is not
    /// permitted by the lifecycle state machine; `self` is left unchanged.
    pub fn apply(&mut self, updates: &[RecordUpdate]) -> Result<()> {
        let mut next = self.clone();
        for update in updates {
            match update {
                RecordUpdate::Transition(to) => {
                    if !next.state.can_transition_to(*to) {
                        return Err(DevboxError::InvalidState {
                            name: next.name.to_string(),
                            state: next.state,
                            message: format!("cannot transition to {to}"),
                        });
                    }
                    next.state = *to;
                }
                RecordUpdate::AssignAddress(address) => {
                    next.network_address.clone_from(address);
                }
                RecordUpdate::Touch(at) => next.last_activity_at = at.trunc_subsecs(0),
            }
        }
        *self = next;
        Ok(())
    }
}

/// Wire shape of [`ContainerRecord`], checked before it is accepted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RecordRepr {
    name: ContainerName,
    owner: String,
    state: ContainerState,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    cpu_limit: CpuLimit,
    memory_limit: MemoryLimit,
    volume_name: String,
    network_hostname: String,
    network_address: Option<String>,
    with_sync_feature: bool,
}

impl TryFrom<RecordRepr> for ContainerRecord {
    type Error = String;

    fn try_from(repr: RecordRepr) -> std::result::Result<Self, Self::Error> {
        if repr.volume_name != repr.name.volume_name() {
            return Err(format!(
                "record '{}' has volume '{}', expected '{}'",
                repr.name,
                repr.volume_name,
                repr.name.volume_name()
            ));
        }
        if repr.network_hostname != repr.name.as_str() {
            return Err(format!(
                "record '{}' has hostname '{}', expected the container name",
                repr.name, repr.network_hostname
            ));
        }
        Ok(Self {
            name: repr.name,
            owner: repr.owner,
            state: repr.state,
            created_at: repr.created_at,
            last_activity_at: repr.last_activity_at,
            cpu_limit: repr.cpu_limit,
            memory_limit: repr.memory_limit,
            volume_name: repr.volume_name,
            network_hostname: repr.network_hostname,
            network_address: repr.network_address,
            with_sync_feature: repr.with_sync_feature,
        })
    }
}

/// The durable collection of container records, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    schema_version: u32,
    containers: Vec<ContainerRecord>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::empty()
    }
}

impl Registry {
    /// An empty registry at the current schema version.
    pub const fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            containers: Vec::new(),
        }
    }

    /// Schema version the document was written with.
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[ContainerRecord] {
        &self.containers
    }

    /// Consumes the registry, returning its records.
    pub fn into_records(self) -> Vec<ContainerRecord> {
        self.containers
    }

    /// Looks up a record by name.
    pub fn find(&self, name: &str) -> Option<&ContainerRecord> {
        self.containers.iter().find(|c| c.name.as_str() == name)
    }

    /// Looks up a record by name for in-place updates.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut ContainerRecord> {
        self.containers.iter_mut().find(|c| c.name.as_str() == name)
    }

    /// Whether a record with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Appends a record. Uniqueness is the caller's responsibility.
    pub fn push(&mut self, record: ContainerRecord) {
        self.containers.push(record);
    }

    /// Removes and returns the record with this name, if any.
    pub fn remove(&mut self, name: &str) -> Option<ContainerRecord> {
        let index = self
            .containers
            .iter()
            .position(|c| c.name.as_str() == name)?;
        Some(self.containers.remove(index))
    }

    /// Records owned by `owner`.
    pub fn by_owner<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a ContainerRecord> {
        self.containers.iter().filter(move |c| c.owner == owner)
    }

    /// Number of records owned by `owner`.
    pub fn count_by_owner(&self, owner: &str) -> usize {
        self.by_owner(owner).count()
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Whether the registry holds no records.
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn spec(name: &str, owner: &str) -> ContainerSpec {
        ContainerSpec {
            name: ContainerName::parse(name).unwrap(),
            owner: owner.into(),
            cpu: CpuLimit::new(2).unwrap(),
            memory: MemoryLimit::parse("4G").unwrap(),
            with_sync_feature: false,
        }
    }

    fn name_error(name: &str) -> String {
        match ContainerName::parse(name) {
            Err(DevboxError::Validation { message, .. }) => message,
            other => panic!("expected validation error for {name:?}, got {other:?}"),
        }
    }

    #[test]
    fn name_too_short_is_rejected() {
        assert!(name_error("ab").contains("at least 3"));
    }

    #[test]
    fn name_with_uppercase_is_rejected() {
        assert!(name_error("My-App").contains("lowercase"));
    }

    #[test]
    fn name_with_consecutive_hyphens_is_rejected() {
        assert!(name_error("a--b").contains("consecutive hyphens"));
    }

    #[test]
    fn name_must_start_with_letter() {
        assert!(name_error("1abc").contains("start with a letter"));
        assert!(name_error("-abc").contains("start with a letter"));
    }

    #[test]
    fn name_must_not_end_with_hyphen() {
        assert!(name_error("abc-").contains("end with a letter or digit"));
    }

    #[test]
    fn name_rejects_other_characters() {
        assert!(name_error("my_app").contains("lowercase letters, digits, and hyphens"));
        assert!(name_error("my.app").contains("lowercase letters, digits, and hyphens"));
    }

    #[test]
    fn name_length_boundary() {
        let at_limit = format!("a{}", "b".repeat(62));
        assert_eq!(at_limit.len(), 63);
        assert!(ContainerName::parse(at_limit).is_ok());

        let over_limit = format!("a{}", "b".repeat(63));
        assert!(name_error(&over_limit).contains("at most 63"));
    }

    #[test]
    fn valid_names_are_accepted() {
        for name in ["abc", "my-project", "dev-env-1", "a1b"] {
            assert!(ContainerName::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn name_derives_volume() {
        let name = ContainerName::parse("demo-env").unwrap();
        assert_eq!(name.volume_name(), "demo-env-data");
    }

    #[test]
    fn cpu_range_is_enforced() {
        assert!(CpuLimit::new(0).is_err());
        assert!(CpuLimit::new(65).is_err());
        assert!(CpuLimit::new(300).is_err());
        assert_eq!(CpuLimit::new(1).unwrap().get(), 1);
        assert_eq!(CpuLimit::new(64).unwrap().get(), 64);
    }

    #[test]
    fn memory_format_is_enforced() {
        assert!(MemoryLimit::parse("4G").is_ok());
        assert!(MemoryLimit::parse("512M").is_ok());
        for bad in ["4", "4g", "G", "4GB", "1.5G", " 4G", "٤G"] {
            let err = MemoryLimit::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{bad} should be rejected");
        }
    }

    #[test]
    fn new_record_starts_creating_with_derived_fields() {
        let record = ContainerRecord::creating(&spec("demo-env", "alice"), now());
        assert_eq!(record.state(), ContainerState::Creating);
        assert_eq!(record.volume_name(), "demo-env-data");
        assert_eq!(record.network_hostname(), "demo-env");
        assert!(record.network_address().is_none());
        assert_eq!(record.created_at(), record.last_activity_at());
    }

    #[test]
    fn apply_updates_state_address_and_activity() {
        let created = now();
        let mut record = ContainerRecord::creating(&spec("demo-env", "alice"), created);
        let later = created + chrono::Duration::seconds(30);
        record
            .apply(&[
                RecordUpdate::Transition(ContainerState::Running),
                RecordUpdate::AssignAddress(Some("100.64.0.5".into())),
                RecordUpdate::Touch(later),
            ])
            .unwrap();
        assert_eq!(record.state(), ContainerState::Running);
        assert_eq!(record.network_address(), Some("100.64.0.5"));
        assert_eq!(record.last_activity_at(), later);
        assert_eq!(record.created_at(), created);
    }

    #[test]
    fn illegal_transition_leaves_record_untouched() {
        let mut record = ContainerRecord::creating(&spec("demo-env", "alice"), now());
        record
            .apply(&[RecordUpdate::Transition(ContainerState::Stopped)])
            .unwrap();
        let before = record.clone();

        let err = record
            .apply(&[
                RecordUpdate::AssignAddress(Some("100.64.0.9".into())),
                RecordUpdate::Transition(ContainerState::Creating),
            ])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(record, before);
    }

    #[test]
    fn state_machine_transitions() {
        use ContainerState::{Creating, Running, Stopped};
        assert!(Creating.can_transition_to(Running));
        assert!(Creating.can_transition_to(Stopped));
        assert!(Running.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Running));
        assert!(Running.can_transition_to(Running));
        assert!(!Running.can_transition_to(Creating));
        assert!(!Stopped.can_transition_to(Creating));
    }

    #[test]
    fn record_serializes_with_camel_case_fields() {
        let record = ContainerRecord::creating(&spec("demo-env", "alice"), now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["volumeName"], "demo-env-data");
        assert_eq!(value["networkHostname"], "demo-env");
        assert_eq!(value["cpuLimit"], 2);
        assert_eq!(value["memoryLimit"], "4G");
        assert_eq!(value["state"], "creating");
        assert!(value["networkAddress"].is_null());
        assert_eq!(value["withSyncFeature"], false);
    }

    #[test]
    fn record_with_mismatched_volume_is_rejected() {
        let record = ContainerRecord::creating(&spec("demo-env", "alice"), now());
        let mut value = serde_json::to_value(&record).unwrap();
        value["volumeName"] = "other-data".into();
        let result = serde_json::from_value::<ContainerRecord>(value);
        assert!(result.is_err());
    }

    #[test]
    fn record_with_invalid_name_is_rejected() {
        let record = ContainerRecord::creating(&spec("demo-env", "alice"), now());
        let mut value = serde_json::to_value(&record).unwrap();
        value["name"] = "Bad_Name".into();
        assert!(serde_json::from_value::<ContainerRecord>(value).is_err());
    }

    #[test]
    fn registry_helpers_track_owners() {
        let mut registry = Registry::empty();
        registry.push(ContainerRecord::creating(&spec("alpha", "alice"), now()));
        registry.push(ContainerRecord::creating(&spec("bravo", "bob"), now()));
        registry.push(ContainerRecord::creating(&spec("charlie", "alice"), now()));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.count_by_owner("alice"), 2);
        assert_eq!(registry.count_by_owner("carol"), 0);
        assert!(registry.contains("bravo"));

        let removed = registry.remove("bravo").unwrap();
        assert_eq!(removed.owner(), "bob");
        assert!(registry.remove("bravo").is_none());
        let names: Vec<_> = registry.records().iter().map(|r| r.name().as_str()).collect();
        assert_eq!(names, vec!["alpha", "charlie"]);
    }
}
