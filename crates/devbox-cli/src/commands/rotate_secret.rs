//! `devbox-ctl rotate-secret` — Re-join the overlay network with a fresh key.

use clap::Args;

use super::Context;
use crate::output;

/// Arguments for the `rotate-secret` command.
#[derive(Args, Debug)]
pub struct RotateSecretArgs {
    /// Container name.
    pub name: String,
}

/// Executes the `rotate-secret` command.
///
/// # Errors
///
/// Returns an error if the container is not running, the vault has no
/// valid key for its owner, or the network agent rejects the key.
pub fn execute(ctx: &Context, args: &RotateSecretArgs) -> anyhow::Result<()> {
    output::progress("Retrieving a fresh network auth key and re-authenticating...");
    let _record = ctx.orchestrator.rotate_secret(&ctx.caller, &args.name)?;
    output::success(&format!("Auth key rotated for '{}'", args.name));
    Ok(())
}
