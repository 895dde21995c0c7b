//! `devbox-ctl start` — Start a stopped container.

use clap::Args;

use super::Context;
use crate::output;

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Container name.
    pub name: String,
}

/// Executes the `start` command.
///
/// Waits for the network agent to report an address before returning;
/// a container that never reports one is still started.
///
/// # Errors
///
/// Returns an error if the container is not found, belongs to someone
/// else, is half-created, or the runtime fails to start it.
pub fn execute(ctx: &Context, args: &StartArgs) -> anyhow::Result<()> {
    output::progress(&format!("Starting container '{}'...", args.name));
    let outcome = ctx.orchestrator.start(&ctx.caller, &args.name)?;
    if !outcome.changed {
        println!("Container '{}' is already running.", args.name);
        return Ok(());
    }

    output::success(&format!("Container '{}' started", args.name));
    match outcome.record.network_address() {
        Some(address) => println!("  Network IP: {address}"),
        None => output::warning("Network agent has not reported an address yet"),
    }
    Ok(())
}
