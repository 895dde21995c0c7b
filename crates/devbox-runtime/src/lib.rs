//! # devbox-runtime
//!
//! Container lifecycle for devbox: the [`orchestrator::Orchestrator`] and
//! the collaborators it drives.
//!
//! - [`driver`]: the container runtime ([`driver::podman::PodmanDriver`]).
//! - [`secret`]: per-user network auth keys from the vault.
//! - [`identity`]: caller identity and administrator lookup.
//! - [`exec`]: child process helpers shared by the CLI-backed
//!   collaborators.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod driver;
pub mod exec;
pub mod identity;
pub mod orchestrator;
pub mod secret;
