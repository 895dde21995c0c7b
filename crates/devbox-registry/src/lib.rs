//! # devbox-registry
//!
//! The durable record of every managed container.
//!
//! The registry is a single JSON document shared by every `devbox-ctl`
//! process on the host. There is no server: mutual exclusion comes from
//! advisory `flock` locks on a sibling lock file, and durability from
//! writing each new version to a temporary file and renaming it over the
//! old one.
//!
//! - [`store::RegistryStore`]: atomic initialization, shared-lock reads,
//!   exclusive-lock read-modify-write.
//! - [`quota::QuotaPolicy`]: per-owner and global admission caps evaluated
//!   against a registry snapshot.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod lock;
pub mod quota;
pub mod store;
