//! `devbox-ctl logs` — View container logs.

use clap::Args;
use devbox_common::constants::DEFAULT_LOG_TAIL;

use super::Context;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container name.
    pub name: String,

    /// Follow log output.
    #[arg(short, long)]
    pub follow: bool,

    /// Number of lines to show.
    #[arg(long, default_value_t = DEFAULT_LOG_TAIL)]
    pub tail: u32,
}

/// Executes the `logs` command.
///
/// The runtime writes straight to the terminal; nothing is buffered here.
///
/// # Errors
///
/// Returns an error if the container is not found, belongs to someone
/// else, or the runtime cannot produce its log.
pub fn execute(ctx: &Context, args: &LogsArgs) -> anyhow::Result<()> {
    ctx.orchestrator
        .logs(&ctx.caller, &args.name, args.follow, args.tail)?;
    Ok(())
}
