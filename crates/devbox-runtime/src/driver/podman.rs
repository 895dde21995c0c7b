//! Podman CLI runtime driver.

use std::path::PathBuf;

use devbox_common::constants::VOLUME_MOUNT_POINT;
use devbox_common::error::{DevboxError, Result};

use super::{LaunchSpec, RuntimeDriver, RuntimeState};
use crate::exec::{self, ExecOutput};
use crate::secret::AuthKey;

/// Drives containers through the `podman` command.
#[derive(Debug, Clone)]
pub struct PodmanDriver {
    program: PathBuf,
}

impl PodmanDriver {
    /// Uses `podman` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("podman"),
        }
    }

    /// Uses a different `podman`-compatible executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn podman(&self, args: &[String]) -> Result<ExecOutput> {
        exec::capture(&self.program, args)
    }

    /// Runs a command and converts a non-zero exit into a runtime error.
    fn checked(&self, operation: &'static str, name: &str, args: &[String]) -> Result<()> {
        let out = self.podman(args)?;
        if out.succeeded() {
            return Ok(());
        }
        tracing::debug!(operation, name, exit_code = out.exit_code, "podman command failed");
        Err(DevboxError::Runtime {
            operation,
            name: name.to_string(),
            diagnostic: out.diagnostic(),
        })
    }

    fn probe(&self, args: &[String]) -> Result<bool> {
        Ok(self.podman(args)?.succeeded())
    }
}

impl Default for PodmanDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

/// Arguments for `podman run` launching a dev container.
pub fn run_args(spec: &LaunchSpec) -> Vec<String> {
    let sync = if spec.sync_feature { "true" } else { "false" };
    vec![
        "run".into(),
        "-d".into(),
        "--name".into(),
        spec.name.clone(),
        "--hostname".into(),
        spec.hostname.clone(),
        "--cpus".into(),
        spec.cpu.to_string(),
        "--memory".into(),
        spec.memory.to_string(),
        "-v".into(),
        format!("{}:{VOLUME_MOUNT_POINT}:Z", spec.volume),
        "-e".into(),
        format!("TS_AUTHKEY={}", spec.auth_key.expose()),
        "-e".into(),
        format!("TS_TAGS={}", spec.tags),
        "-e".into(),
        format!("CONTAINER_NAME={}", spec.name),
        "-e".into(),
        format!("SYNCTHING_ENABLED={sync}"),
        "--cap-add=NET_ADMIN".into(),
        "--restart=unless-stopped".into(),
        spec.image.clone(),
    ]
}

/// Arguments for `podman logs`.
pub fn logs_args(name: &str, follow: bool, tail: u32) -> Vec<String> {
    let mut out = vec!["logs".to_string()];
    if follow {
        out.push("-f".into());
    }
    out.push("--tail".into());
    out.push(tail.to_string());
    out.push(name.into());
    out
}

/// Arguments re-joining the overlay network from inside the container.
pub fn auth_up_args(name: &str, key: &AuthKey, tags: &str) -> Vec<String> {
    vec![
        "exec".into(),
        name.into(),
        "tailscale".into(),
        "up".into(),
        format!("--authkey={}", key.expose()),
        "--ssh".into(),
        format!("--hostname={name}"),
        format!("--advertise-tags={tags}"),
    ]
}

/// First non-empty line of `tailscale ip -4` output.
fn parse_address(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToString::to_string)
}

impl RuntimeDriver for PodmanDriver {
    fn available(&self) -> bool {
        self.probe(&args(["--version"])).unwrap_or(false)
    }

    fn volume_exists(&self, volume: &str) -> Result<bool> {
        self.probe(&args(["volume", "exists", volume]))
    }

    fn create_volume(&self, volume: &str) -> Result<()> {
        tracing::info!(volume, "creating volume");
        self.checked("create volume", volume, &args(["volume", "create", volume]))
    }

    fn remove_volume(&self, volume: &str) -> Result<()> {
        tracing::info!(volume, "removing volume");
        self.checked("remove volume", volume, &args(["volume", "rm", volume]))
    }

    fn container_exists(&self, name: &str) -> Result<bool> {
        self.probe(&args(["container", "exists", name]))
    }

    fn container_state(&self, name: &str) -> Result<RuntimeState> {
        if !self.container_exists(name)? {
            return Ok(RuntimeState::Absent);
        }
        let out = self.podman(&args(["inspect", "--format", "{{.State.Status}}", name]))?;
        if !out.succeeded() {
            return Ok(RuntimeState::Absent);
        }
        Ok(match out.stdout.trim() {
            "running" => RuntimeState::Running,
            _ => RuntimeState::Exited,
        })
    }

    fn run(&self, spec: &LaunchSpec) -> Result<()> {
        tracing::info!(
            name = %spec.name,
            cpu = %spec.cpu,
            memory = %spec.memory,
            image = %spec.image,
            "launching container"
        );
        self.checked("create container", &spec.name, &run_args(spec))
    }

    fn start(&self, name: &str) -> Result<()> {
        tracing::info!(name, "starting container");
        self.checked("start container", name, &args(["start", name]))
    }

    fn stop(&self, name: &str) -> Result<()> {
        tracing::info!(name, "stopping container");
        self.checked("stop container", name, &args(["stop", name]))
    }

    fn remove(&self, name: &str, force: bool) -> Result<()> {
        tracing::info!(name, force, "removing container");
        let argv = if force {
            args(["rm", "-f", name])
        } else {
            args(["rm", name])
        };
        self.checked("remove container", name, &argv)
    }

    fn network_address(&self, name: &str) -> Result<Option<String>> {
        let out = self.podman(&args(["exec", name, "tailscale", "ip", "-4"]))?;
        if !out.succeeded() {
            return Ok(None);
        }
        Ok(parse_address(&out.stdout))
    }

    fn exec_auth_refresh(&self, name: &str, key: &AuthKey, tags: &str) -> Result<()> {
        let logout = self.podman(&args(["exec", name, "tailscale", "logout"]))?;
        if !logout.succeeded() {
            tracing::debug!(name, diagnostic = %logout.diagnostic(), "logout before re-auth failed");
        }
        tracing::info!(name, tags, "re-authenticating network agent");
        self.checked("rotate auth key", name, &auth_up_args(name, key, tags))
    }

    fn stream_logs(&self, name: &str, follow: bool, tail: u32) -> Result<()> {
        let code = exec::passthrough(&self.program, &logs_args(name, follow, tail))?;
        if code == 0 {
            return Ok(());
        }
        Err(DevboxError::Runtime {
            operation: "read logs of container",
            name: name.to_string(),
            diagnostic: format!("podman logs exited with status {code}"),
        })
    }
}
