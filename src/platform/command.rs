// FormSnap - platform/command.rs
//
// External command execution through the platform shell.
//
// Two modes:
//   - blocking: run to completion, capture output, fail on non-zero exit
//   - detached: start and return the root process handle immediately;
//     the caller owns reaping it
//
// Commands are shell strings (`cmd /C` on Windows, `sh -c` elsewhere) so
// user-configured templates can use the shell's own syntax.

use crate::core::model::{BuildStep, ProcessHandle};
use crate::util::constants;
use crate::util::error::CommandError;
use std::path::Path;
use std::process::{Command, Stdio};

/// Executes build and launch commands in a working directory.
pub trait CommandRunner {
    /// Run `command` in `working_dir` and wait for it.
    ///
    /// Returns captured stdout on success. A non-zero exit becomes
    /// `CommandError::Failed` carrying the exit code and stderr text.
    fn run_blocking(&self, command: &str, working_dir: &Path) -> Result<String, CommandError>;

    /// Start `command` in `working_dir` without waiting or reading output.
    fn spawn_detached(&self, command: &str, working_dir: &Path)
        -> Result<ProcessHandle, CommandError>;
}

// =============================================================================
// Command templates
// =============================================================================

/// Shell command templates for the four build-unit steps.
///
/// Each contains `{manifest}`, replaced by the manifest file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplates {
    pub clean: String,
    pub restore: String,
    pub build: String,
    pub run: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            clean: constants::DEFAULT_CLEAN_COMMAND.to_string(),
            restore: constants::DEFAULT_RESTORE_COMMAND.to_string(),
            build: constants::DEFAULT_BUILD_COMMAND.to_string(),
            run: constants::DEFAULT_RUN_COMMAND.to_string(),
        }
    }
}

impl CommandTemplates {
    pub fn template(&self, step: BuildStep) -> &str {
        match step {
            BuildStep::Clean => &self.clean,
            BuildStep::Restore => &self.restore,
            BuildStep::Build => &self.build,
            BuildStep::Run => &self.run,
        }
    }

    /// The command line for `step` against `manifest`.
    pub fn render(&self, step: BuildStep, manifest: &Path) -> String {
        render_command(self.template(step), manifest)
    }
}

/// Substitute the manifest file name into `template`.
///
/// Commands run inside the project directory, so only the file name is
/// used. Names containing whitespace are double-quoted.
pub fn render_command(template: &str, manifest: &Path) -> String {
    let name = manifest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| manifest.display().to_string());
    let arg = if name.chars().any(char::is_whitespace) {
        format!("\"{name}\"")
    } else {
        name
    };
    template.replace(constants::MANIFEST_PLACEHOLDER, &arg)
}

// =============================================================================
// Shell runner
// =============================================================================

/// `CommandRunner` over the platform shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellCommandRunner;

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    use std::os::windows::process::CommandExt;
    let mut cmd = Command::new("cmd");
    // raw_arg keeps cmd's own quoting rules intact.
    cmd.arg("/C").raw_arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

impl CommandRunner for ShellCommandRunner {
    fn run_blocking(&self, command: &str, working_dir: &Path) -> Result<String, CommandError> {
        tracing::debug!(command, dir = %working_dir.display(), "Running command");

        let output = shell_command(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                working_dir: working_dir.to_path_buf(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !stdout.is_empty() {
            tracing::debug!(command, output = %preview(&stdout), "Command output");
        }

        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            tracing::debug!(command, stderr = %preview(stderr), "Command stderr");
        }

        Err(CommandError::Failed {
            command: command.to_string(),
            exit_code: output.status.code(),
            stderr: (!stderr.is_empty()).then(|| truncate(stderr, constants::MAX_STDERR_CHARS)),
        })
    }

    fn spawn_detached(
        &self,
        command: &str,
        working_dir: &Path,
    ) -> Result<ProcessHandle, CommandError> {
        let child = shell_command(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                working_dir: working_dir.to_path_buf(),
                source,
            })?;

        let handle = ProcessHandle::from_child(child);
        tracing::info!(command, pid = handle.pid(), "Launched");
        Ok(handle)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{} [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

fn preview(text: &str) -> String {
    truncate(text, constants::DEBUG_MAX_OUTPUT_PREVIEW)
}
