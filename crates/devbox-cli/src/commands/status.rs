//! `devbox-ctl status` — Show detailed container status.

use clap::Args;

use super::Context;
use crate::output;

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Container name.
    pub name: String,
}

/// Executes the `status` command.
///
/// # Errors
///
/// Returns an error if the container is not found or belongs to someone
/// else.
pub fn execute(ctx: &Context, args: &StatusArgs) -> anyhow::Result<()> {
    let status = ctx.orchestrator.status(&ctx.caller, &args.name)?;
    print!("{}", output::format_status(&status));
    Ok(())
}
