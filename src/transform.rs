//! External SQL transformation tool invocation.
//!
//! The tool (dbt by default) is an opaque subprocess: the orchestrator sets
//! a working directory and profile location, then inspects only the exit
//! code and captured output. Its internal behavior is never interpreted.
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;

pub const COMMAND_KEY: &str = "SALESFLOW_DBT_COMMAND";
const DEFAULT_COMMAND: &str = "dbt run";
const MAX_OUTPUT_SNIPPET: usize = 2048;

/// Run the configured transformation command against `project_dir`.
pub fn run_transformation(project_dir: &Path, profiles_dir: Option<&Path>) -> Result<()> {
    let raw = std::env::var(COMMAND_KEY).unwrap_or_else(|_| DEFAULT_COMMAND.to_string());
    run_with_command(&raw, project_dir, profiles_dir)
}

fn run_with_command(raw: &str, project_dir: &Path, profiles_dir: Option<&Path>) -> Result<()> {
    let argv =
        shell_words::split(raw).with_context(|| format!("parse transformation command: {raw}"))?;
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("transformation command is empty"))?;
    let program =
        which::which(program).with_context(|| format!("locate transformation tool {program}"))?;

    let mut command = Command::new(&program);
    command.args(args).current_dir(project_dir);
    if let Some(profiles_dir) = profiles_dir {
        command.arg("--profiles-dir").arg(profiles_dir);
    }

    tracing::info!("running transformation tool {}", program.display());
    let output = command
        .output()
        .with_context(|| format!("run transformation tool {}", program.display()))?;

    if output.status.success() {
        tracing::info!("transformation completed");
        return Ok(());
    }

    Err(anyhow!(
        "transformation tool exited with {}\nstdout: {}\nstderr: {}",
        output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |code| code.to_string()),
        snippet(&output.stdout),
        snippet(&output.stderr),
    ))
}

fn snippet(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.len() <= MAX_OUTPUT_SNIPPET {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > MAX_OUTPUT_SNIPPET {
            break;
        }
        truncated.push(ch);
    }
    truncated
}
