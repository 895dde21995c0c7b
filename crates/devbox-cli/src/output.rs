//! Formatted output helpers for CLI commands.
//!
//! Provides the container table, the status block, colored result lines,
//! and the structured error rendering used by `main`.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use devbox_common::error::DevboxError;
use devbox_common::types::ContainerRecord;
use devbox_runtime::orchestrator::ContainerStatus;

pub const BOLD: &str = "\x1b[1m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const RESET: &str = "\x1b[0m";

/// Prints a green check-marked line.
pub fn success(message: &str) {
    println!("{GREEN}✓ {message}{RESET}");
}

/// Prints a yellow warning line.
pub fn warning(message: &str) {
    println!("{YELLOW}⚠ {message}{RESET}");
}

/// Progress line on stderr, so stdout stays clean for results.
pub fn progress(message: &str) {
    eprintln!("{message}");
}

/// Renders records as the `list` table.
pub fn format_table(records: &[ContainerRecord], show_owner: bool) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "{:<20} {:<10} {:<20} {:<16}",
        "NAME", "STATE", "CREATED", "NETWORK IP"
    );
    if show_owner {
        out.push_str(" OWNER");
    }
    out.push('\n');
    out.push_str(&"-".repeat(if show_owner { 76 } else { 66 }));
    out.push('\n');

    for record in records {
        let _ = write!(
            out,
            "{:<20} {:<10} {:<20} {:<16}",
            record.name().as_str(),
            record.state().to_string(),
            record.created_at().format("%Y-%m-%d").to_string(),
            record.network_address().unwrap_or("-"),
        );
        if show_owner {
            let _ = write!(out, " {}", record.owner());
        }
        out.push('\n');
    }
    out
}

/// Ways to reach a container over the overlay network.
pub fn format_access(name: &str, with_sync: bool) -> String {
    let mut out = format!(
        "Access:\n  SSH:         ssh dev@{name}\n  code-server: http://{name}:8080\n  Zed:         Connect to Server → dev@{name}\n"
    );
    if with_sync {
        let _ = write!(
            out,
            "\nSyncthing:\n  GUI:         http://{name}:8384\n  Sync folder: /home/dev/sync\n"
        );
    }
    out
}

/// Renders the `status` block.
pub fn format_status(status: &ContainerStatus) -> String {
    let record = &status.record;
    let runtime = status
        .runtime
        .map_or_else(|| "unknown".to_string(), |s| s.to_string());
    let timestamp = |t: chrono::DateTime<chrono::Utc>| t.format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let mut out = String::new();
    let _ = writeln!(out, "Container: {}", record.name());
    let _ = writeln!(out, "State:     {} (runtime: {runtime})", record.state());
    let _ = writeln!(out, "Owner:     {}", record.owner());
    let _ = writeln!(out, "Created:   {}", timestamp(record.created_at()));
    let _ = writeln!(out, "Activity:  {}", timestamp(record.last_activity_at()));
    out.push('\n');
    out.push_str("Resources:\n");
    let _ = writeln!(out, "  CPU:     {} cores", record.cpu_limit());
    let _ = writeln!(out, "  Memory:  {}", record.memory_limit());
    let _ = writeln!(out, "  Volume:  {}", record.volume_name());
    out.push('\n');
    out.push_str("Network:\n");
    let _ = writeln!(
        out,
        "  IP:       {}",
        record.network_address().unwrap_or("not connected")
    );
    let _ = writeln!(out, "  Hostname: {}", record.network_hostname());
    out.push('\n');
    out.push_str(&format_access(record.name().as_str(), record.with_sync_feature()));
    out
}

/// Plain-text lines for an error: message, then detail and suggestion.
pub fn format_error(err: &anyhow::Error) -> Vec<String> {
    let Some(devbox) = err.downcast_ref::<DevboxError>() else {
        return vec![format!("Unexpected error: {err:#}")];
    };
    let mut lines = vec![format!("Error: {devbox}")];
    if let Some(detail) = devbox.detail() {
        lines.push(format!("  {detail}"));
    }
    if let Some(suggestion) = devbox.suggestion() {
        lines.push(format!("  {suggestion}"));
    }
    lines
}

/// Writes an error to stderr, first line in red.
pub fn render_error(err: &anyhow::Error) {
    let mut lines = format_error(err).into_iter();
    if let Some(first) = lines.next() {
        eprintln!("{RED}{first}{RESET}");
    }
    for line in lines {
        eprintln!("{line}");
    }
}

/// Asks a yes/no question on the terminal; anything but yes is no.
pub fn confirm(prompt: &str) -> io::Result<bool> {
    let mut stderr = io::stderr();
    write!(stderr, "{YELLOW}⚠ {prompt}{RESET} [y/N]: ")?;
    stderr.flush()?;

    let mut answer = String::new();
    let _ = io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
