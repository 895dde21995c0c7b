//! Overlay network auth keys and the vault that holds them.
//!
//! Each user owns one reusable auth key stored in the vault under
//! `{user}-tailscale-authkey`. A key is fetched on demand for `create` and
//! `rotate-secret`, validated, handed to the runtime, and never persisted
//! or logged.

use std::fmt;
use std::path::PathBuf;

use devbox_common::config::DevboxConfig;
use devbox_common::constants::AUTH_KEY_PREFIX;
use devbox_common::error::{DevboxError, Result};

use crate::exec;

/// A validated network auth key.
///
/// `Debug` and `Display` never reveal the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey(String);

impl AuthKey {
    /// The raw key, for handing to the runtime.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthKey(<redacted>)")
    }
}

impl fmt::Display for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Checks that `raw` looks like a network auth key.
///
/// # Errors
///
/// Returns [`DevboxError::SecretEmpty`] for an empty value and
/// [`DevboxError::SecretMalformed`] if the key lacks the expected prefix.
pub fn validate_auth_key(identity: &str, raw: String) -> Result<AuthKey> {
    if raw.trim().is_empty() {
        return Err(DevboxError::SecretEmpty {
            identity: identity.to_string(),
        });
    }
    if !raw.starts_with(AUTH_KEY_PREFIX) {
        return Err(DevboxError::SecretMalformed {
            expected_prefix: AUTH_KEY_PREFIX,
        });
    }
    Ok(AuthKey(raw))
}

/// Network tags advertised by containers owned by `owner`.
pub fn network_tags(owner: &str) -> String {
    format!("tag:devcontainer,tag:{owner}-container")
}

/// Source of per-user network auth keys.
pub trait SecretProvider: Send + Sync {
    /// Whether the vault client is installed.
    fn available(&self) -> bool;

    /// Whether the vault accepts the configured credentials.
    fn authenticated(&self) -> bool;

    /// Fetches and validates the auth key belonging to `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::SecretUnavailable`] if the vault cannot be
    /// reached or has no such item, or the errors of [`validate_auth_key`].
    fn get_auth_key(&self, identity: &str) -> Result<AuthKey>;
}

/// Reads auth keys with the 1Password CLI (`op`).
#[derive(Debug, Clone)]
pub struct OnePasswordProvider {
    program: PathBuf,
    vault: String,
    token_configured: bool,
}

impl OnePasswordProvider {
    /// Creates a provider reading from `vault`.
    ///
    /// `token_configured` records whether a service-account token was
    /// present when the process started.
    pub fn new(vault: impl Into<String>, token_configured: bool) -> Self {
        Self {
            program: PathBuf::from("op"),
            vault: vault.into(),
            token_configured,
        }
    }

    /// Creates a provider from the process configuration.
    pub fn from_config(config: &DevboxConfig) -> Self {
        Self::new(config.vault.clone(), config.secret_token_configured)
    }

    /// Uses a different `op` executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn item_name(identity: &str) -> String {
        format!("{identity}-tailscale-authkey")
    }

    fn reference(&self, identity: &str) -> String {
        format!("op://{}/{}/password", self.vault, Self::item_name(identity))
    }
}

impl SecretProvider for OnePasswordProvider {
    fn available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn authenticated(&self) -> bool {
        if !self.token_configured {
            return false;
        }
        let args = ["vault", "list", "--format=json"].map(String::from);
        exec::capture(&self.program, &args).is_ok_and(|out| out.succeeded())
    }

    fn get_auth_key(&self, identity: &str) -> Result<AuthKey> {
        if !self.available() {
            return Err(DevboxError::SecretUnavailable {
                message: "1Password CLI not found".into(),
                detail: "The 'op' command is required for secret retrieval.".into(),
                hint: Some("Ensure the orchestrator module is enabled.".into()),
            });
        }
        if !self.token_configured {
            return Err(DevboxError::SecretUnavailable {
                message: "1Password Service Account not configured".into(),
                detail: "OP_SERVICE_ACCOUNT_TOKEN environment variable is not set.".into(),
                hint: Some("Configure it via a systemd credential or agenix.".into()),
            });
        }
        if !self.authenticated() {
            return Err(DevboxError::SecretUnavailable {
                message: "1Password authentication failed".into(),
                detail: "Unable to authenticate with the Service Account token.".into(),
                hint: Some("Verify OP_SERVICE_ACCOUNT_TOKEN is valid.".into()),
            });
        }

        let item = Self::item_name(identity);
        tracing::debug!(identity, vault = %self.vault, "reading network auth key");
        let args = vec!["read".to_string(), self.reference(identity), "--no-newline".into()];
        let out = exec::capture(&self.program, &args)?;
        if !out.succeeded() {
            tracing::debug!(identity, diagnostic = %out.diagnostic(), "op read failed");
            return Err(DevboxError::SecretUnavailable {
                message: "Failed to retrieve network auth key".into(),
                detail: format!("Could not read item '{item}' from vault '{}'.", self.vault),
                hint: Some(format!(
                    "Create an item named '{item}' with the auth key in the 'password' field."
                )),
            });
        }
        validate_auth_key(identity, out.stdout)
    }
}
