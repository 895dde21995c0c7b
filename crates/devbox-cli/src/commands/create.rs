//! `devbox-ctl create` — Create a new dev container.

use clap::Args;
use devbox_runtime::orchestrator::CreateRequest;

use super::Context;
use crate::output::{self, BOLD, RESET};

/// Arguments for the `create` command.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Container name (3-63 lowercase letters, digits, and hyphens).
    pub name: String,

    /// CPU cores (defaults to `DEVBOX_DEFAULT_CPU`, else 2).
    #[arg(long)]
    pub cpu: Option<u32>,

    /// Memory limit such as 4G or 512M (defaults to `DEVBOX_DEFAULT_MEMORY`).
    #[arg(long)]
    pub memory: Option<String>,

    /// Register the container and its volume without starting it.
    #[arg(long)]
    pub no_start: bool,

    /// Enable the Syncthing file-sync sidecar.
    #[arg(long, visible_alias = "with-syncthing")]
    pub with_sync: bool,
}

impl CreateArgs {
    fn into_request(self, ctx: &Context) -> CreateRequest {
        CreateRequest {
            name: self.name,
            owner: ctx.caller.clone(),
            cpu: self
                .cpu
                .unwrap_or_else(|| u32::from(ctx.config.default_cpu.get())),
            memory: self
                .memory
                .unwrap_or_else(|| ctx.config.default_memory.to_string()),
            start_immediately: !self.no_start,
            sync_feature: self.with_sync,
        }
    }
}

/// Executes the `create` command.
///
/// # Errors
///
/// Returns an error if validation, quota, vault, or runtime checks fail.
/// A failure after the container was registered has already been rolled
/// back when this returns.
pub fn execute(ctx: &Context, args: CreateArgs) -> anyhow::Result<()> {
    output::progress(&format!("Creating container '{}'...", args.name));
    let request = args.into_request(ctx);
    let outcome = ctx.orchestrator.create(&request)?;
    let record = &outcome.record;
    let name = record.name().as_str();

    if !request.start_immediately {
        output::success(&format!("Container '{name}' created (not started)"));
        println!("  Run {BOLD}devbox-ctl start {name}{RESET} when you need it");
        return Ok(());
    }

    if let Some(warning) = &outcome.warning {
        output::warning(warning);
        println!("Check manually with: devbox-ctl status {name}");
        return Ok(());
    }

    println!();
    output::success(&format!("Container '{name}' created successfully!"));
    if let Some(address) = record.network_address() {
        println!("  Network IP: {address}");
    }
    println!();
    print!("{}", output::format_access(name, record.with_sync_feature()));
    Ok(())
}
