// FormSnap - util/constants.rs
//
// Single source of truth for all named constants, limits, delays and defaults.
// Config validation in platform::config clamps user values against these.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "FormSnap";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "FormSnap";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Project discovery
// =============================================================================

/// Name of the directory (compared case-insensitively) whose immediate
/// subdirectories are candidate projects during a batch scan.
pub const DEFAULT_CONTAINER_DIR: &str = "CS";

/// Glob pattern identifying a build manifest inside a project directory.
pub const DEFAULT_MANIFEST_PATTERN: &str = "*.csproj";

/// Maximum directory recursion depth when scanning for container directories.
pub const DEFAULT_MAX_DEPTH: usize = 12;

/// Hard upper bound on max depth (prevents runaway traversal).
pub const ABSOLUTE_MAX_DEPTH: usize = 50;

/// Maximum depth searched inside a single project for Program.cs and forms.
pub const PROJECT_SCAN_DEPTH: usize = 4;

/// Directory names never descended into, during the batch scan and inside
/// projects (build output and tooling state).
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &["bin", "obj", ".git", ".vs", "packages"];

/// Resource files accepted as the entry form when Program.cs does not name one.
pub const FALLBACK_ENTRY_RESOURCES: &[&str] = &["mainform.resx", "form1.resx"];

// =============================================================================
// Window detection
// =============================================================================

/// Delay between window enumeration polls (ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Number of enumeration polls before a launch is declared windowless.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Bounds for the user-configurable poll interval (ms).
pub const MIN_POLL_INTERVAL_MS: u64 = 50;
pub const MAX_POLL_INTERVAL_MS: u64 = 10_000;

/// Bounds for the user-configurable attempt budget.
pub const MIN_MAX_ATTEMPTS: u32 = 1;
pub const MAX_MAX_ATTEMPTS: u32 = 1_000;

/// Title substrings identifying OS chrome that is never the application window
/// (IME composition windows, console host, OLE helper windows).
pub const WINDOW_DENY_LIST: &[&str] = &[
    "OleMainThreadWndName",
    "MSCTFIME UI",
    "Default IME",
    "ConsoleWindowClass",
];

// =============================================================================
// Settle delays and timeouts
// =============================================================================

/// Pause after asking the window manager to activate the target window (ms).
pub const DEFAULT_ACTIVATION_SETTLE_MS: u64 = 1_000;

/// Pause after asking the window manager to maximise the target window (ms).
pub const DEFAULT_MAXIMIZE_SETTLE_MS: u64 = 2_000;

/// Pause after a graceful close request (ms).
pub const DEFAULT_CLOSE_SETTLE_MS: u64 = 2_000;

/// Pause between projects so OS window/process state can settle (ms).
pub const DEFAULT_COOLDOWN_MS: u64 = 5_000;

/// How long the reaper waits for terminated processes to exit (ms).
pub const DEFAULT_REAP_TIMEOUT_MS: u64 = 3_000;

/// How often the reaper re-reads the process table while waiting (ms).
pub const REAP_POLL_INTERVAL_MS: u64 = 50;

/// Process names (file stem, lower-case) the stray sweep treats as build
/// toolchain.
pub const SWEEP_TOOLCHAIN_NAMES: &[&str] = &["dotnet", "msbuild"];

/// Build-output directories inside a project; executables below them are
/// always strays once their build unit has finished.
pub const SWEEP_OUTPUT_DIRS: &[&str] = &["bin", "obj"];

/// Upper bound shared by every configurable delay (ms).
pub const MAX_DELAY_MS: u64 = 120_000;

// =============================================================================
// Build/run command templates
// =============================================================================

/// Placeholder replaced by the (quoted) manifest file name.
pub const MANIFEST_PLACEHOLDER: &str = "{manifest}";

pub const DEFAULT_CLEAN_COMMAND: &str = "dotnet clean {manifest}";
pub const DEFAULT_RESTORE_COMMAND: &str = "dotnet restore {manifest}";
pub const DEFAULT_BUILD_COMMAND: &str = "msbuild {manifest}";
pub const DEFAULT_RUN_COMMAND: &str = "dotnet run --project {manifest}";

/// Maximum number of stderr characters carried inside a `CommandError`.
/// Longer output is truncated; the full text still goes to debug.log.
pub const MAX_STDERR_CHARS: usize = 8_192;

// =============================================================================
// Resource patching
// =============================================================================

/// Resource key of the form icon inside a .resx file.
pub const ICON_RESOURCE_NAME: &str = "$this.Icon";

/// `type` attribute written on a newly inserted icon entry.
pub const ICON_RESOURCE_TYPE: &str = "System.Drawing.Icon, System.Drawing";

/// `mimetype` attribute written on a newly inserted icon entry.
pub const ICON_RESOURCE_MIMETYPE: &str = "application/x-microsoft.net.object.bytearray.base64";

/// Width of each base64 line inside the `<value>` element.
pub const BASE64_LINE_WIDTH: usize = 80;

/// Indentation of each base64 line inside the `<value>` element.
pub const BASE64_LINE_INDENT: &str = "        ";

/// Indentation of the closing `</value>` tag.
pub const VALUE_CLOSE_INDENT: &str = "    ";

/// Maximum icon file size accepted for embedding.
pub const MAX_ICON_FILE_SIZE: u64 = 4 * 1024 * 1024; // 4 MB

// =============================================================================
// Artifacts
// =============================================================================

/// Suffix appended to the project (and manifest) name for screenshots.
pub const SCREENSHOT_SUFFIX: &str = "_screenshot.png";

// =============================================================================
// Logging
// =============================================================================

/// Default console log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log file names written into the log directory (append mode).
pub const DEBUG_LOG_FILE: &str = "debug.log";
pub const ERROR_LOG_FILE: &str = "error.log";
pub const INFO_LOG_FILE: &str = "info.log";

/// Timestamp format for every log line.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Maximum length of command output echoed into a single debug log event.
pub const DEBUG_MAX_OUTPUT_PREVIEW: usize = 4_096;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
