//! Caller identity and administrator lookup.

use std::path::PathBuf;

use devbox_common::constants::ADMIN_GROUPS;
use devbox_common::error::{DevboxError, Result};

use crate::exec;

/// Decides whether an identity may act on containers it does not own.
pub trait IdentityService: Send + Sync {
    /// Whether `identity` is a host administrator.
    fn is_administrator(&self, identity: &str) -> bool;
}

/// Treats members of the `wheel` or `sudo` groups as administrators.
#[derive(Debug, Clone)]
pub struct GroupIdentityService {
    program: PathBuf,
}

impl GroupIdentityService {
    /// Looks groups up with the system `id` command.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("id"),
        }
    }

    /// Uses a different `id`-compatible executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for GroupIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityService for GroupIdentityService {
    fn is_administrator(&self, identity: &str) -> bool {
        let args = vec!["-Gn".to_string(), identity.to_string()];
        match exec::capture(&self.program, &args) {
            Ok(out) if out.succeeded() => is_admin_group_list(&out.stdout),
            Ok(out) => {
                tracing::debug!(identity, diagnostic = %out.diagnostic(), "group lookup failed");
                false
            }
            Err(err) => {
                tracing::debug!(identity, error = %err, "group lookup failed");
                false
            }
        }
    }
}

/// Whether a whitespace-separated group list names an admin group.
fn is_admin_group_list(groups: &str) -> bool {
    groups
        .split_whitespace()
        .any(|group| ADMIN_GROUPS.contains(&group))
}

/// Identity of the invoking user.
///
/// Prefers `$USER` and falls back to the password database entry for the
/// real uid, so it also works under cron and systemd.
///
/// # Errors
///
/// Returns [`DevboxError::Config`] if neither source yields a name.
pub fn current_identity() -> Result<String> {
    if let Some(user) = std::env::var("USER").ok().filter(|u| !u.is_empty()) {
        return Ok(user);
    }
    let uid = nix::unistd::getuid();
    match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.name),
        Ok(None) => Err(DevboxError::Config {
            message: format!("no passwd entry for uid {uid}"),
        }),
        Err(errno) => Err(DevboxError::Config {
            message: format!("cannot resolve current user: {errno}"),
        }),
    }
}
