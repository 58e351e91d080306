// FormSnap - core/discovery.rs
//
// Project discovery and entry-form detection.
//
// Batch scans walk the tree with `walkdir` looking for container directories
// (named `CS` by default, compared case-insensitively). Every immediate
// subdirectory of a container that holds a build manifest is a project.
// Build output and tooling directories (bin/, obj/, .git/ …) are never
// descended into.
//
// Per-entry I/O errors during the walk are non-fatal and only logged. The
// walk fails as a whole only when the root is invalid or nothing was found.

use crate::core::model::{EntryForm, ProjectDescriptor};
use crate::util::constants;
use crate::util::error::DiscoveryError;
use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a discovery operation.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Directory name whose children are candidate projects.
    pub container_dir: String,

    /// Glob matched (case-insensitively) against file names directly inside a
    /// project directory to find its build manifests.
    pub manifest_pattern: String,

    /// Maximum directory recursion depth of the batch scan.
    pub max_depth: usize,

    /// Directory names never descended into. Literal names only.
    pub exclude_patterns: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            container_dir: constants::DEFAULT_CONTAINER_DIR.to_string(),
            manifest_pattern: constants::DEFAULT_MANIFEST_PATTERN.to_string(),
            max_depth: constants::DEFAULT_MAX_DEPTH,
            exclude_patterns: constants::DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

const CASE_INSENSITIVE: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

// =============================================================================
// Discovery
// =============================================================================

/// Find every project below `root`, in path order.
///
/// # Fatal errors
/// `RootNotFound`, `NotADirectory`, `PermissionDenied` for an unusable root,
/// `InvalidPattern` for a bad manifest glob, and `NoProjects` when the scan
/// found nothing.
pub fn discover_projects(
    root: &Path,
    config: &DiscoveryConfig,
) -> Result<Vec<ProjectDescriptor>, DiscoveryError> {
    preflight(root)?;
    let manifest_pat = compile_manifest_pattern(&config.manifest_pattern)?;
    let max_depth = config.max_depth.min(constants::ABSOLUTE_MAX_DEPTH);

    tracing::info!(
        root = %root.display(),
        container = %config.container_dir,
        max_depth,
        "Scanning for projects"
    );

    let mut project_dirs: BTreeSet<PathBuf> = BTreeSet::new();

    let walker = walkdir::WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_str().unwrap_or("");
            !is_excluded_component(name, &config.exclude_patterns)
        });

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                let path_str = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                tracing::debug!(path = %path_str, error = %e, "Skipping inaccessible entry");
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }
        let is_container = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.eq_ignore_ascii_case(&config.container_dir));
        if !is_container {
            continue;
        }

        tracing::debug!(dir = %entry.path().display(), "Found container directory");

        let children = match std::fs::read_dir(entry.path()) {
            Ok(rd) => rd,
            Err(e) => {
                tracing::warn!(dir = %entry.path().display(), error = %e, "Cannot list container");
                continue;
            }
        };
        for child in children.flatten() {
            let path = child.path();
            if !path.is_dir() {
                continue;
            }
            match list_manifests(&path, &manifest_pat) {
                Ok(manifests) if !manifests.is_empty() => {
                    tracing::debug!(project = %path.display(), "Found project");
                    project_dirs.insert(path);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "Skipping unreadable project candidate"),
            }
        }
    }

    let mut projects = Vec::with_capacity(project_dirs.len());
    for dir in project_dirs {
        match describe_with(&dir, &manifest_pat, config) {
            Ok(p) => projects.push(p),
            Err(e) => tracing::warn!(error = %e, "Project vanished during scan"),
        }
    }

    if projects.is_empty() {
        return Err(DiscoveryError::NoProjects {
            root: root.to_path_buf(),
            container: config.container_dir.clone(),
        });
    }

    tracing::info!(count = projects.len(), "Discovery complete");
    Ok(projects)
}

/// Describe a single project directory (single-project mode).
pub fn describe_project(
    dir: &Path,
    config: &DiscoveryConfig,
) -> Result<ProjectDescriptor, DiscoveryError> {
    preflight(dir)?;
    let manifest_pat = compile_manifest_pattern(&config.manifest_pattern)?;
    describe_with(dir, &manifest_pat, config)
}

fn describe_with(
    dir: &Path,
    manifest_pat: &Pattern,
    config: &DiscoveryConfig,
) -> Result<ProjectDescriptor, DiscoveryError> {
    let manifests = list_manifests(dir, manifest_pat)?;
    if manifests.is_empty() {
        return Err(DiscoveryError::NoManifests {
            path: dir.to_path_buf(),
            pattern: manifest_pat.as_str().to_string(),
        });
    }

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());

    let entry_form = detect_entry_form(dir, &config.exclude_patterns);
    match &entry_form {
        Some(form) => {
            tracing::debug!(project = %name, form = %form.name, "Entry form detected");
        }
        None => tracing::debug!(project = %name, "No entry form detected"),
    }

    Ok(ProjectDescriptor {
        dir: dir.to_path_buf(),
        name,
        manifests,
        entry_form,
    })
}

/// Build manifests directly inside `dir`, sorted by file name.
fn list_manifests(dir: &Path, pattern: &Pattern) -> Result<Vec<PathBuf>, DiscoveryError> {
    let entries = std::fs::read_dir(dir).map_err(|source| DiscoveryError::Traversal {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut manifests: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| pattern.matches_with(n, CASE_INSENSITIVE))
        })
        .collect();
    manifests.sort();
    Ok(manifests)
}

/// Check the root with `fs::metadata` so permission problems are told apart
/// from missing paths.
fn preflight(root: &Path) -> Result<(), DiscoveryError> {
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(DiscoveryError::NotADirectory {
            path: root.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(DiscoveryError::PermissionDenied {
                path: root.to_path_buf(),
                source: e,
            })
        }
        Err(_) => Err(DiscoveryError::RootNotFound {
            path: root.to_path_buf(),
        }),
    }
}

fn compile_manifest_pattern(pattern: &str) -> Result<Pattern, DiscoveryError> {
    Pattern::new(pattern).map_err(|source| DiscoveryError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn is_excluded_component(dir_name: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|p| p.eq_ignore_ascii_case(dir_name))
}

// =============================================================================
// Entry-form detection
// =============================================================================

fn application_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Application\s*\.\s*Run\s*\(\s*new\s+([A-Za-z_][\w.]*)\s*\(")
            .expect("application_run_regex: invalid regex")
    })
}

/// Identify the form a project opens at startup.
///
/// `Program.cs` naming `Application.Run(new X())` wins when `X.resx` exists;
/// otherwise the first of `MainForm.resx` / `Form1.resx` found is used.
pub fn detect_entry_form(project_dir: &Path, exclude: &[String]) -> Option<EntryForm> {
    let mut programs: Vec<PathBuf> = Vec::new();
    // Lower-cased file name -> path. First hit (shallowest, then by name) wins.
    let mut resources: HashMap<String, PathBuf> = HashMap::new();
    let mut designers: HashMap<String, PathBuf> = HashMap::new();

    let walker = walkdir::WalkDir::new(project_dir)
        .max_depth(constants::PROJECT_SCAN_DEPTH)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !is_excluded_component(e.file_name().to_str().unwrap_or(""), exclude)
        });

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        if lower == "program.cs" {
            programs.push(entry.path().to_path_buf());
        } else if lower.ends_with(".designer.cs") {
            designers
                .entry(lower)
                .or_insert_with(|| entry.path().to_path_buf());
        } else if lower.ends_with(".resx") {
            resources
                .entry(lower)
                .or_insert_with(|| entry.path().to_path_buf());
        }
    }

    let build = |form: &str, resx: &PathBuf| {
        let designer_key = format!("{}.designer.cs", form.to_ascii_lowercase());
        EntryForm {
            name: form.to_string(),
            resx: resx.clone(),
            designer: designers.get(&designer_key).cloned(),
        }
    };

    for program in &programs {
        let content = match std::fs::read(program) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!(file = %program.display(), error = %e, "Cannot read Program.cs");
                continue;
            }
        };
        let Some(caps) = application_run_regex().captures(&content) else {
            continue;
        };
        let qualified = &caps[1];
        let form = qualified.rsplit('.').next().unwrap_or(qualified);
        let key = format!("{}.resx", form.to_ascii_lowercase());
        if let Some(resx) = resources.get(&key) {
            return Some(build(form, resx));
        }
        tracing::debug!(form, "Program.cs names a form without a .resx");
    }

    constants::FALLBACK_ENTRY_RESOURCES.iter().find_map(|key| {
        resources.get(*key).map(|resx| {
            let stem = resx
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            build(&stem, resx)
        })
    })
}

// =============================================================================
// Tests
// =============================================================================
