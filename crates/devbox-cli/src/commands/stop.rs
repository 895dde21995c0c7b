//! `devbox-ctl stop` — Stop a running container.

use clap::Args;

use super::Context;
use crate::output::{self, BOLD, RESET};

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container name.
    pub name: String,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the container is not found, belongs to someone
/// else, or the runtime fails to stop it.
pub fn execute(ctx: &Context, args: &StopArgs) -> anyhow::Result<()> {
    output::progress(&format!("Stopping container '{}'...", args.name));
    let outcome = ctx.orchestrator.stop(&ctx.caller, &args.name)?;
    if !outcome.changed {
        println!("Container '{}' is already stopped.", args.name);
        return Ok(());
    }

    output::success(&format!("Container '{}' stopped", args.name));
    println!("  Data preserved in volume '{}'", outcome.record.volume_name());
    println!("  Run {BOLD}devbox-ctl start {}{RESET} to resume", args.name);
    Ok(())
}
