//! Container quotas.
//!
//! Two caps apply to every create: one per owner and one host-wide. Both
//! are checked once up front, before any side effect, and again inside the
//! registry mutation that inserts the record. The second check runs under
//! the exclusive lock and is what makes the caps hard.

use devbox_common::config::DevboxConfig;
use devbox_common::error::{DevboxError, QuotaScope, Result};
use devbox_common::types::Registry;

use crate::store::RegistryStore;

/// Per-owner and global container limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    max_per_user: usize,
    max_global: usize,
}

impl QuotaPolicy {
    /// Creates a policy with the given caps.
    pub const fn new(max_per_user: usize, max_global: usize) -> Self {
        Self {
            max_per_user,
            max_global,
        }
    }

    /// Reads the caps from configuration.
    pub const fn from_config(config: &DevboxConfig) -> Self {
        Self::new(config.max_per_user, config.max_global)
    }

    /// The per-owner cap.
    pub const fn max_per_user(&self) -> usize {
        self.max_per_user
    }

    /// The host-wide cap.
    pub const fn max_global(&self) -> usize {
        self.max_global
    }

    /// Fails if `owner` already holds `max_per_user` containers.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::QuotaExceeded`] with [`QuotaScope::Owner`].
    pub fn check_per_owner(&self, registry: &Registry, owner: &str) -> Result<()> {
        let current = registry.count_by_owner(owner);
        if current >= self.max_per_user {
            tracing::debug!(owner, current, limit = self.max_per_user, "per-user quota reached");
            return Err(DevboxError::QuotaExceeded {
                scope: QuotaScope::Owner,
                current,
                limit: self.max_per_user,
            });
        }
        Ok(())
    }

    /// Fails if the registry already holds `max_global` containers.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::QuotaExceeded`] with [`QuotaScope::Global`].
    pub fn check_global(&self, registry: &Registry) -> Result<()> {
        let current = registry.len();
        if current >= self.max_global {
            tracing::debug!(current, limit = self.max_global, "global quota reached");
            return Err(DevboxError::QuotaExceeded {
                scope: QuotaScope::Global,
                current,
                limit: self.max_global,
            });
        }
        Ok(())
    }

    /// Checks the per-owner cap, then the global cap.
    ///
    /// # Errors
    ///
    /// Returns the first [`DevboxError::QuotaExceeded`] encountered.
    pub fn check(&self, registry: &Registry, owner: &str) -> Result<()> {
        self.check_per_owner(registry, owner)?;
        self.check_global(registry)
    }

    /// Advisory check against the current registry contents.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::QuotaExceeded`] or any error from reading the
    /// registry.
    pub fn admit(&self, store: &RegistryStore, owner: &str) -> Result<()> {
        self.check(&store.read()?, owner)
    }
}
