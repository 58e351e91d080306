// FormSnap - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Each subsystem owns an enum; `HarnessError` wraps them for the CLI.
// Which of these end a build unit and which are only logged is decided by
// the caller (app::runner), not here.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for FormSnap operations that escape a build unit.
#[derive(Debug)]
pub enum HarnessError {
    /// Project discovery failed.
    Discovery(DiscoveryError),

    /// A build/run command failed.
    Command(CommandError),

    /// Window detection, capture or close failed.
    Window(WindowError),

    /// Icon patching failed.
    Patch(PatchError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery(e) => write!(f, "Discovery error: {e}"),
            Self::Command(e) => write!(f, "Command error: {e}"),
            Self::Window(e) => write!(f, "Window error: {e}"),
            Self::Patch(e) => write!(f, "Patch error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Discovery(e) => Some(e),
            Self::Command(e) => Some(e),
            Self::Window(e) => Some(e),
            Self::Patch(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Discovery errors
// ---------------------------------------------------------------------------

/// Errors related to project discovery.
#[derive(Debug)]
pub enum DiscoveryError {
    /// The root path does not exist.
    RootNotFound { path: PathBuf },

    /// The root path is not a directory.
    NotADirectory { path: PathBuf },

    /// Permission denied accessing the root path.
    PermissionDenied { path: PathBuf, source: io::Error },

    /// A batch scan completed without finding a single buildable project.
    NoProjects { root: PathBuf, container: String },

    /// A single-project path contains no build manifest.
    NoManifests { path: PathBuf, pattern: String },

    /// The manifest glob pattern is invalid.
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// Listing a project directory failed.
    Traversal { path: PathBuf, source: io::Error },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "Path '{}' does not exist", path.display())
            }
            Self::NotADirectory { path } => {
                write!(f, "Path '{}' is not a directory", path.display())
            }
            Self::PermissionDenied { path, source } => {
                write!(
                    f,
                    "Permission denied accessing '{}': {source}",
                    path.display()
                )
            }
            Self::NoProjects { root, container } => write!(
                f,
                "No projects found under '{}' (looked inside '{container}' directories)",
                root.display()
            ),
            Self::NoManifests { path, pattern } => write!(
                f,
                "No build manifest matching '{pattern}' in '{}'",
                path.display()
            ),
            Self::InvalidPattern { pattern, source } => {
                write!(f, "Invalid manifest pattern '{pattern}': {source}")
            }
            Self::Traversal { path, source } => {
                write!(f, "Error listing '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PermissionDenied { source, .. } => Some(source),
            Self::InvalidPattern { source, .. } => Some(source),
            Self::Traversal { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DiscoveryError> for HarnessError {
    fn from(e: DiscoveryError) -> Self {
        Self::Discovery(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

/// Errors produced by the command runner.
#[derive(Debug)]
pub enum CommandError {
    /// The shell could not be started at all.
    Spawn {
        command: String,
        working_dir: PathBuf,
        source: io::Error,
    },

    /// A blocking command exited unsuccessfully.
    ///
    /// `exit_code` is `None` when the process was ended by a signal.
    /// `stderr` is `None` when the command wrote nothing to stderr.
    Failed {
        command: String,
        exit_code: Option<i32>,
        stderr: Option<String>,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn {
                command,
                working_dir,
                source,
            } => write!(
                f,
                "Could not start '{command}' in '{}': {source}",
                working_dir.display()
            ),
            Self::Failed {
                command,
                exit_code,
                stderr: Some(stderr),
            } => {
                let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                write!(f, "'{command}' failed ({code}): {stderr}")
            }
            Self::Failed {
                command,
                exit_code: Some(code),
                stderr: None,
            } => write!(f, "'{command}' failed with return code {code}"),
            Self::Failed {
                command,
                exit_code: None,
                stderr: None,
            } => write!(f, "'{command}' was terminated by a signal"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::Failed { .. } => None,
        }
    }
}

impl From<CommandError> for HarnessError {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Window errors
// ---------------------------------------------------------------------------

/// Errors related to window detection, capture and close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// No qualifying new window appeared within the poll budget.
    DetectionTimeout { attempts: u32 },

    /// A new title was observed but no live window could be resolved for it.
    Resolution { title: String },

    /// The window list could not be read.
    Enumeration { reason: String },

    /// The target window could not be brought to the foreground.
    Activation { title: String, reason: String },

    /// Screenshot capture or save failed.
    Capture { path: PathBuf, reason: String },

    /// The graceful close request could not be delivered.
    CloseRequest { title: String, reason: String },

    /// The operation is not available on this platform.
    Unsupported { operation: &'static str },
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DetectionTimeout { attempts } => write!(
                f,
                "No new application window appeared after {attempts} attempts"
            ),
            Self::Resolution { title } => {
                write!(f, "Window '{title}' disappeared before it could be resolved")
            }
            Self::Enumeration { reason } => write!(f, "Could not list windows: {reason}"),
            Self::Activation { title, reason } => {
                write!(f, "Could not focus window '{title}': {reason}")
            }
            Self::Capture { path, reason } => {
                write!(f, "Screenshot '{}' failed: {reason}", path.display())
            }
            Self::CloseRequest { title, reason } => {
                write!(f, "Could not close window '{title}' gracefully: {reason}")
            }
            Self::Unsupported { operation } => {
                write!(f, "Window {operation} is only supported on Windows")
            }
        }
    }
}

impl std::error::Error for WindowError {}

impl From<WindowError> for HarnessError {
    fn from(e: WindowError) -> Self {
        Self::Window(e)
    }
}

// ---------------------------------------------------------------------------
// Patch errors
// ---------------------------------------------------------------------------

/// Errors related to icon patching of resource and designer files.
#[derive(Debug)]
pub enum PatchError {
    /// The configured icon file does not exist.
    IconNotFound { path: PathBuf },

    /// The icon file exceeds the embedding limit.
    IconTooLarge { path: PathBuf, size: u64, max_size: u64 },

    /// No entry form could be identified for the project.
    EntryFormNotFound { project: PathBuf },

    /// The entry form has a resource file but no designer source.
    DesignerNotFound { form: String, project: PathBuf },

    /// The designer source has no `InitializeComponent` body.
    InitializeComponentNotFound { path: PathBuf },

    /// The resource file has no closing `</root>` element.
    MalformedResource { path: PathBuf },

    /// I/O error reading or writing a patch target.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IconNotFound { path } => {
                write!(f, "Icon file '{}' not found", path.display())
            }
            Self::IconTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Icon '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::EntryFormNotFound { project } => write!(
                f,
                "Could not identify the entry form of '{}'",
                project.display()
            ),
            Self::DesignerNotFound { form, project } => write!(
                f,
                "Form '{form}' in '{}' has no designer file",
                project.display()
            ),
            Self::InitializeComponentNotFound { path } => write!(
                f,
                "'{}' does not define InitializeComponent()",
                path.display()
            ),
            Self::MalformedResource { path } => {
                write!(f, "'{}' has no closing </root> element", path.display())
            }
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for PatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PatchError> for HarnessError {
    fn from(e: PatchError) -> Self {
        Self::Patch(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for HarnessError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_surfaces_stderr_text() {
        let err = CommandError::Failed {
            command: "msbuild App.csproj".to_string(),
            exit_code: Some(1),
            stderr: Some("error MSB1009".to_string()),
        };
        let text = err.to_string();
        assert!(text.contains("error MSB1009"), "got: {text}");
        assert!(text.contains("(1)"), "got: {text}");
    }

    #[test]
    fn command_failed_without_stderr_reports_code_only() {
        let err = CommandError::Failed {
            command: "dotnet clean App.csproj".to_string(),
            exit_code: Some(3),
            stderr: None,
        };
        assert_eq!(
            err.to_string(),
            "'dotnet clean App.csproj' failed with return code 3"
        );
    }

    #[test]
    fn harness_error_keeps_source_chain() {
        use std::error::Error;
        let err: HarnessError = DiscoveryError::PermissionDenied {
            path: PathBuf::from("/projects"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        let discovery = err.source().expect("discovery source");
        assert!(discovery.source().is_some(), "io source must be preserved");
    }
}
