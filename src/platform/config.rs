// FormSnap - platform/config.rs
//
// Platform-specific configuration directory resolution, and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::discovery::DiscoveryConfig;
use crate::core::window::ObserverTiming;
use crate::platform::command::CommandTemplates;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved platform paths for FormSnap configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/formsnap/ or %APPDATA%\FormSnap\config\)
    pub config_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            tracing::debug!(config = %config_dir.display(), "Platform paths resolved");
            Self { config_dir }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
            }
        }
    }

    /// Default location of config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml shape
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored so an older binary accepts a newer file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub discovery: DiscoverySection,
    pub window: WindowSection,
    pub timing: TimingSection,
    pub commands: CommandsSection,
    pub patch: PatchSection,
    pub cleanup: CleanupSection,
    pub logging: LoggingSection,
}

/// `[discovery]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Name of the directories whose children are projects.
    pub container_dir: Option<String>,
    /// Build manifest glob.
    pub manifest_pattern: Option<String>,
    /// Maximum directory recursion depth.
    pub max_depth: Option<usize>,
    /// Directory names never descended into.
    pub exclude_patterns: Option<Vec<String>>,
}

/// `[window]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub poll_interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    /// Title substrings ignored in addition to the built-in list.
    pub extra_deny_list: Option<Vec<String>>,
}

/// `[timing]` config section. All values in milliseconds.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub activation_settle_ms: Option<u64>,
    pub maximize_settle_ms: Option<u64>,
    pub close_settle_ms: Option<u64>,
    pub cooldown_ms: Option<u64>,
    pub reap_timeout_ms: Option<u64>,
}

/// `[commands]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CommandsSection {
    pub clean: Option<String>,
    pub restore: Option<String>,
    pub build: Option<String>,
    pub run: Option<String>,
}

/// `[patch]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PatchSection {
    /// Icon embedded into each entry form. Patching is off when unset.
    pub icon: Option<String>,
}

/// `[cleanup]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CleanupSection {
    pub sweep_strays: Option<bool>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Directory receiving debug.log / error.log.
    pub dir: Option<String>,
    /// Also write info.log.
    pub info_log: Option<bool>,
}

// =============================================================================
// Validated configuration
// =============================================================================

/// Validated harness configuration.
///
/// Every value has been checked against the limits in `util::constants`.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub discovery: DiscoveryConfig,
    pub timing: ObserverTiming,
    pub extra_deny_list: Vec<String>,
    pub cooldown: Duration,
    pub reap_timeout: Duration,
    pub commands: CommandTemplates,
    pub icon: Option<PathBuf>,
    pub sweep_strays: bool,
    pub log_level: Option<String>,
    pub log_dir: PathBuf,
    pub info_log: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            timing: ObserverTiming::default(),
            extra_deny_list: Vec::new(),
            cooldown: Duration::from_millis(constants::DEFAULT_COOLDOWN_MS),
            reap_timeout: Duration::from_millis(constants::DEFAULT_REAP_TIMEOUT_MS),
            commands: CommandTemplates::default(),
            icon: None,
            sweep_strays: true,
            log_level: None,
            log_dir: PathBuf::from("."),
            info_log: false,
        }
    }
}

/// Load config.toml from its default location.
///
/// A missing file means defaults with no warnings. An unreadable or
/// unparseable file means defaults plus a warning; the harness still runs.
pub fn load_config(config_path: &Path) -> (HarnessConfig, Vec<String>) {
    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (HarnessConfig::default(), Vec::new());
    }

    match load_config_file(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            let msg = format!("{e}. Using defaults.");
            tracing::warn!("{}", msg);
            (HarnessConfig::default(), vec![msg])
        }
    }
}

/// Load a config file the user named explicitly. Any read or parse
/// failure is an error.
pub fn load_config_file(config_path: &Path) -> Result<(HarnessConfig, Vec<String>), ConfigError> {
    let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
        path: config_path.to_path_buf(),
        source,
    })?;
    let raw: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: config_path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %config_path.display(), "Loaded config.toml");
    Ok(validate(raw))
}

/// Check every raw value against its limits, accumulating warnings.
pub fn validate(raw: RawConfig) -> (HarnessConfig, Vec<String>) {
    let mut config = HarnessConfig::default();
    let mut warnings: Vec<String> = Vec::new();

    // -- Discovery --
    if let Some(dir) = raw.discovery.container_dir {
        if dir.trim().is_empty() {
            warnings.push(format!(
                "[discovery] container_dir is empty. Using default ({}).",
                constants::DEFAULT_CONTAINER_DIR
            ));
        } else {
            config.discovery.container_dir = dir.trim().to_string();
        }
    }

    if let Some(pattern) = raw.discovery.manifest_pattern {
        if glob::Pattern::new(&pattern).is_ok() && !pattern.trim().is_empty() {
            config.discovery.manifest_pattern = pattern;
        } else {
            warnings.push(format!(
                "[discovery] manifest_pattern = \"{pattern}\" is not a valid glob. Using default ({}).",
                constants::DEFAULT_MANIFEST_PATTERN
            ));
        }
    }

    if let Some(depth) = raw.discovery.max_depth {
        if (1..=constants::ABSOLUTE_MAX_DEPTH).contains(&depth) {
            config.discovery.max_depth = depth;
        } else {
            warnings.push(out_of_range(
                "discovery.max_depth",
                depth,
                format!("1-{}", constants::ABSOLUTE_MAX_DEPTH),
                constants::DEFAULT_MAX_DEPTH,
            ));
        }
    }

    if let Some(patterns) = raw.discovery.exclude_patterns {
        config.discovery.exclude_patterns = patterns
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }

    // -- Window --
    if let Some(ms) = raw.window.poll_interval_ms {
        if (constants::MIN_POLL_INTERVAL_MS..=constants::MAX_POLL_INTERVAL_MS).contains(&ms) {
            config.timing.poll_interval = Duration::from_millis(ms);
        } else {
            warnings.push(out_of_range(
                "window.poll_interval_ms",
                ms,
                format!(
                    "{}-{}",
                    constants::MIN_POLL_INTERVAL_MS,
                    constants::MAX_POLL_INTERVAL_MS
                ),
                constants::DEFAULT_POLL_INTERVAL_MS,
            ));
        }
    }

    if let Some(attempts) = raw.window.max_attempts {
        if (constants::MIN_MAX_ATTEMPTS..=constants::MAX_MAX_ATTEMPTS).contains(&attempts) {
            config.timing.max_attempts = attempts;
        } else {
            warnings.push(out_of_range(
                "window.max_attempts",
                attempts,
                format!(
                    "{}-{}",
                    constants::MIN_MAX_ATTEMPTS,
                    constants::MAX_MAX_ATTEMPTS
                ),
                constants::DEFAULT_MAX_ATTEMPTS,
            ));
        }
    }

    if let Some(extra) = raw.window.extra_deny_list {
        config.extra_deny_list = extra.into_iter().filter(|t| !t.is_empty()).collect();
    }

    // -- Timing --
    let timing = raw.timing;
    let mut delay = |field: &str, value: Option<u64>, default_ms: u64, target: &mut Duration| {
        if let Some(ms) = value {
            if ms <= constants::MAX_DELAY_MS {
                *target = Duration::from_millis(ms);
            } else {
                warnings.push(out_of_range(
                    field,
                    ms,
                    format!("0-{}", constants::MAX_DELAY_MS),
                    default_ms,
                ));
            }
        }
    };
    delay(
        "timing.activation_settle_ms",
        timing.activation_settle_ms,
        constants::DEFAULT_ACTIVATION_SETTLE_MS,
        &mut config.timing.activation_settle,
    );
    delay(
        "timing.maximize_settle_ms",
        timing.maximize_settle_ms,
        constants::DEFAULT_MAXIMIZE_SETTLE_MS,
        &mut config.timing.maximize_settle,
    );
    delay(
        "timing.close_settle_ms",
        timing.close_settle_ms,
        constants::DEFAULT_CLOSE_SETTLE_MS,
        &mut config.timing.close_settle,
    );
    delay(
        "timing.cooldown_ms",
        timing.cooldown_ms,
        constants::DEFAULT_COOLDOWN_MS,
        &mut config.cooldown,
    );
    delay(
        "timing.reap_timeout_ms",
        timing.reap_timeout_ms,
        constants::DEFAULT_REAP_TIMEOUT_MS,
        &mut config.reap_timeout,
    );

    // -- Commands --
    let commands = raw.commands;
    for (field, value, target) in [
        ("clean", commands.clean, &mut config.commands.clean),
        ("restore", commands.restore, &mut config.commands.restore),
        ("build", commands.build, &mut config.commands.build),
        ("run", commands.run, &mut config.commands.run),
    ] {
        let Some(template) = value else { continue };
        if template.contains(constants::MANIFEST_PLACEHOLDER) {
            *target = template;
        } else {
            warnings.push(format!(
                "[commands] {field} = \"{template}\" does not contain {}. Using default (\"{target}\").",
                constants::MANIFEST_PLACEHOLDER
            ));
        }
    }

    // -- Patch --
    if let Some(icon) = raw.patch.icon {
        if !icon.trim().is_empty() {
            config.icon = Some(PathBuf::from(icon.trim()));
        }
    }

    // -- Cleanup --
    if let Some(sweep) = raw.cleanup.sweep_strays {
        config.sweep_strays = sweep;
    }

    // -- Logging --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    if let Some(dir) = raw.logging.dir {
        if !dir.trim().is_empty() {
            config.log_dir = PathBuf::from(dir.trim());
        }
    }

    if let Some(info_log) = raw.logging.info_log {
        config.info_log = info_log;
    }

    (config, warnings)
}

fn out_of_range<T: std::fmt::Display>(
    field: &str,
    value: T,
    expected: String,
    default: impl std::fmt::Display,
) -> String {
    let err = ConfigError::ValueOutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        expected,
    };
    format!("{err}. Using default ({default}).")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (HarnessConfig, Vec<String>) {
        validate(toml::from_str(text).unwrap())
    }

    #[test]
    fn empty_file_gives_defaults() {
        let (config, warnings) = parse("");
        assert!(warnings.is_empty());
        assert_eq!(config.discovery.container_dir, "CS");
        assert_eq!(config.timing.max_attempts, 20);
        assert_eq!(config.timing.poll_interval, Duration::from_millis(500));
        assert_eq!(config.reap_timeout, Duration::from_secs(3));
        assert!(config.sweep_strays);
        assert!(config.icon.is_none());
    }

    #[test]
    fn valid_values_are_applied() {
        let (config, warnings) = parse(
            r#"
            [discovery]
            container_dir = "WinForms"
            max_depth = 6

            [window]
            max_attempts = 40
            extra_deny_list = ["Splash"]

            [timing]
            cooldown_ms = 0

            [commands]
            build = "dotnet build {manifest} -c Release"

            [patch]
            icon = "C1.ico"

            [cleanup]
            sweep_strays = false
            "#,
        );
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.discovery.container_dir, "WinForms");
        assert_eq!(config.discovery.max_depth, 6);
        assert_eq!(config.timing.max_attempts, 40);
        assert_eq!(config.extra_deny_list, vec!["Splash"]);
        assert_eq!(config.cooldown, Duration::ZERO);
        assert_eq!(config.commands.build, "dotnet build {manifest} -c Release");
        assert_eq!(config.icon, Some(PathBuf::from("C1.ico")));
        assert!(!config.sweep_strays);
    }

    #[test]
    fn out_of_range_values_warn_and_fall_back() {
        let (config, warnings) = parse(
            r#"
            [discovery]
            max_depth = 500

            [window]
            poll_interval_ms = 1

            [timing]
            reap_timeout_ms = 999999999
            "#,
        );
        assert_eq!(warnings.len(), 3, "{warnings:?}");
        assert_eq!(config.discovery.max_depth, constants::DEFAULT_MAX_DEPTH);
        assert_eq!(config.timing.poll_interval, Duration::from_millis(500));
        assert_eq!(config.reap_timeout, Duration::from_secs(3));
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let (config, warnings) = parse("[commands]\nrun = \"dotnet run\"\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("{manifest}"));
        assert_eq!(config.commands.run, constants::DEFAULT_RUN_COMMAND);
    }

    #[test]
    fn unknown_log_level_warns() {
        let (config, warnings) = parse("[logging]\nlevel = \"loud\"\n");
        assert_eq!(warnings.len(), 1);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn unparseable_default_file_falls_back_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(constants::CONFIG_FILE_NAME);
        std::fs::write(&path, "[window\nmax_attempts = ").unwrap();

        let (config, warnings) = load_config(&path);
        assert_eq!(warnings.len(), 1);
        assert_eq!(config.timing.max_attempts, constants::DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn missing_default_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let (_, warnings) = load_config(&dir.path().join(constants::CONFIG_FILE_NAME));
        assert!(warnings.is_empty());
    }
}
