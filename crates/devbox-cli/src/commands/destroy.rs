//! `devbox-ctl destroy` — Permanently remove a container.

use clap::Args;

use super::Context;
use crate::output;

/// Arguments for the `destroy` command.
#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Container name.
    pub name: String,

    /// Skip the confirmation prompt.
    #[arg(long)]
    pub force: bool,

    /// Preserve the data volume.
    #[arg(long)]
    pub keep_volume: bool,
}

fn confirmation_prompt(name: &str, keep_volume: bool) -> String {
    let data = if keep_volume { "" } else { " and all its data" };
    format!("This will permanently delete container '{name}'{data}. Continue?")
}

/// Executes the `destroy` command.
///
/// # Errors
///
/// Returns an error if the container is not found, belongs to someone
/// else, or the runtime fails to remove it.
pub fn execute(ctx: &Context, args: &DestroyArgs) -> anyhow::Result<()> {
    let _record = ctx.orchestrator.record(&ctx.caller, &args.name)?;
    if !args.force && !output::confirm(&confirmation_prompt(&args.name, args.keep_volume))? {
        println!("Aborted.");
        return Ok(());
    }

    output::progress(&format!("Destroying container '{}'...", args.name));
    let outcome = ctx
        .orchestrator
        .destroy(&ctx.caller, &args.name, args.keep_volume)?;

    output::success(&format!("Container '{}' destroyed", args.name));
    if outcome.volume_kept {
        println!("  Volume '{}' preserved", outcome.record.volume_name());
    }
    Ok(())
}
