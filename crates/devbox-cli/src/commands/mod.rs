//! CLI command definitions and dispatch.

pub mod create;
pub mod destroy;
pub mod list;
pub mod logs;
pub mod rotate_secret;
pub mod start;
pub mod status;
pub mod stop;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use devbox_common::config::DevboxConfig;
use devbox_runtime::identity;
use devbox_runtime::orchestrator::Orchestrator;

/// devbox — ephemeral development containers on a shared host.
#[derive(Parser, Debug)]
#[command(name = "devbox-ctl", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging on stderr.
    #[arg(long, global = true, env = "DEVBOX_DEBUG")]
    pub debug: bool,

    /// Directory holding the container registry (overrides `DEVBOX_DATA_DIR`).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new dev container.
    Create(create::CreateArgs),
    /// List your containers.
    List(list::ListArgs),
    /// Start a stopped container.
    Start(start::StartArgs),
    /// Stop a running container.
    Stop(stop::StopArgs),
    /// Permanently remove a container.
    Destroy(destroy::DestroyArgs),
    /// Show detailed container status.
    Status(status::StatusArgs),
    /// View container logs.
    Logs(logs::LogsArgs),
    /// Rotate the network auth key without recreating the container.
    #[command(name = "rotate-secret", visible_alias = "rotate-key")]
    RotateSecret(rotate_secret::RotateSecretArgs),
}

/// Per-invocation state shared by every command.
pub struct Context {
    /// Effective configuration.
    pub config: DevboxConfig,
    /// Identity of the invoking user.
    pub caller: String,
    /// Lifecycle orchestrator wired to the host collaborators.
    pub orchestrator: Orchestrator,
}

impl Context {
    /// Resolves configuration and the caller, then wires the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment holds invalid configuration or
    /// the invoking user cannot be determined.
    pub fn load(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = DevboxConfig::from_env()?;
        if let Some(dir) = data_dir {
            config = config.with_data_dir(dir);
        }
        let caller = identity::current_identity()?;
        tracing::debug!(
            caller = %caller,
            registry = %config.registry_file.display(),
            "context resolved"
        );
        let orchestrator = Orchestrator::new(&config);
        Ok(Self {
            config,
            caller,
            orchestrator,
        })
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::load(cli.data_dir)?;
    match cli.command {
        Command::Create(args) => create::execute(&ctx, args),
        Command::List(args) => list::execute(&ctx, &args),
        Command::Start(args) => start::execute(&ctx, &args),
        Command::Stop(args) => stop::execute(&ctx, &args),
        Command::Destroy(args) => destroy::execute(&ctx, &args),
        Command::Status(args) => status::execute(&ctx, &args),
        Command::Logs(args) => logs::execute(&ctx, &args),
        Command::RotateSecret(args) => rotate_secret::execute(&ctx, &args),
    }
}
