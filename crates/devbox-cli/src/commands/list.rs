//! `devbox-ctl list` — List containers from the registry.

use clap::{Args, ValueEnum};
use devbox_common::types::ContainerState;
use devbox_runtime::orchestrator::ListScope;

use super::Context;
use crate::output;

/// State filter accepted by `--state`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateFilter {
    /// Only running containers.
    Running,
    /// Only stopped containers.
    Stopped,
    /// No filtering.
    All,
}

impl StateFilter {
    const fn as_state(self) -> Option<ContainerState> {
        match self {
            Self::Running => Some(ContainerState::Running),
            Self::Stopped => Some(ContainerState::Stopped),
            Self::All => None,
        }
    }
}

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// List every user's containers (administrators only).
    #[arg(long)]
    pub all: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,

    /// Filter by state.
    #[arg(long, value_enum, default_value_t = StateFilter::All)]
    pub state: StateFilter,
}

/// Executes the `list` command.
///
/// # Errors
///
/// Returns an error if `--all` is used by a non-administrator or the
/// registry cannot be read.
pub fn execute(ctx: &Context, args: &ListArgs) -> anyhow::Result<()> {
    let scope = if args.all {
        ListScope::All
    } else {
        ListScope::Own
    };
    let records = ctx
        .orchestrator
        .list(&ctx.caller, scope, args.state.as_state())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No containers found.");
        return Ok(());
    }
    print!("{}", output::format_table(&records, args.all));
    Ok(())
}
