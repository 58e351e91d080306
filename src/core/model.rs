// FormSnap - core/model.rs
//
// Core data model types shared by discovery, the observer, the reaper and the
// runner. Pure data plus small derived helpers; no OS access.

use crate::util::constants;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Child;

// =============================================================================
// Projects
// =============================================================================

/// A buildable project directory and the attributes derived from it.
///
/// Produced by discovery; read-only for the rest of its iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectDescriptor {
    /// Project directory; also the working directory of every command.
    pub dir: PathBuf,

    /// Directory name, used for screenshot naming and log context.
    pub name: String,

    /// Build manifests directly inside `dir`, sorted by file name.
    /// Each one is an independent build unit.
    pub manifests: Vec<PathBuf>,

    /// The form launched by `Program.cs`, when it could be identified.
    pub entry_form: Option<EntryForm>,
}

impl ProjectDescriptor {
    /// Where the screenshot for `manifest` is written.
    ///
    /// `<dir>/<name>_screenshot.png` for single-manifest projects; the
    /// manifest stem is appended when there are several so units do not
    /// overwrite each other.
    pub fn screenshot_path(&self, manifest: &Path) -> PathBuf {
        let file_name = if self.manifests.len() > 1 {
            let stem = manifest
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{}_{stem}{}", self.name, constants::SCREENSHOT_SUFFIX)
        } else {
            format!("{}{}", self.name, constants::SCREENSHOT_SUFFIX)
        };
        self.dir.join(file_name)
    }
}

/// The form a WinForms project opens at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryForm {
    /// Class name, e.g. `MainForm`.
    pub name: String,
    /// `<name>.resx` path.
    pub resx: PathBuf,
    /// `<name>.Designer.cs` path, when present.
    pub designer: Option<PathBuf>,
}

// =============================================================================
// Windows
// =============================================================================

/// Immutable set of top-level window titles captured at one instant.
///
/// Ordered so "first new title" is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    titles: BTreeSet<String>,
}

impl WindowSnapshot {
    pub fn from_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            titles: titles.into_iter().map(Into::into).collect(),
        }
    }

    /// Titles present here but not in `baseline`, with blank titles removed.
    pub fn new_since(&self, baseline: &WindowSnapshot) -> Vec<String> {
        self.titles
            .difference(&baseline.titles)
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.titles.len()
    }
}

/// Opaque OS window identifier (an HWND on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WindowHandle(pub u64);

/// Window bounding box in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Geometry {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A window resolved once at selection time.
///
/// Every later operation goes through `handle`; `title` is kept for display
/// and logging only. The handle can go stale if the window closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetWindow {
    pub handle: WindowHandle,
    pub title: String,
    pub geometry: Geometry,
    /// Owning process, when the window manager reports one.
    pub pid: Option<u32>,
}

// =============================================================================
// Processes
// =============================================================================

/// Root process of a detached launch.
///
/// Owned by the runner for one build unit and reaped on every exit path.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: Option<Child>,
}

impl ProcessHandle {
    /// Wrap a child spawned by this process.
    pub fn from_child(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
        }
    }

    /// A handle for a process this process did not spawn.
    pub fn untracked(pid: u32) -> Self {
        Self { pid, child: None }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Collect the exit status of an owned child so it does not linger as a
    /// zombie once the tree has been reaped. No-op for untracked handles.
    pub fn collect(&mut self) {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(pid = self.pid, %status, "Launch process exit collected");
                }
                Ok(None) => {
                    tracing::warn!(pid = self.pid, "Launch process still running after reap");
                }
                Err(e) => {
                    tracing::debug!(pid = self.pid, error = %e, "Could not collect launch process");
                }
            }
        }
    }
}

/// How the root process of a reap ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootOutcome {
    /// It had already exited before the reap started.
    AlreadyGone,
    /// It exited after the graceful terminate request.
    Terminated,
    /// It needed a forceful kill.
    Killed,
    /// It was still visible after the forceful kill and final wait.
    Survived,
}

/// Result of one process-tree reap. Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    pub root: u32,
    pub outcome: RootOutcome,
    /// Descendants found when the reap started.
    pub descendants: Vec<u32>,
    /// Descendants that ignored the terminate request and were killed.
    pub force_killed: Vec<u32>,
}

impl ReapReport {
    pub fn already_gone(root: u32) -> Self {
        Self {
            root,
            outcome: RootOutcome::AlreadyGone,
            descendants: Vec::new(),
            force_killed: Vec::new(),
        }
    }
}

// =============================================================================
// Build units and outcomes
// =============================================================================

/// The four external invocations of a build unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    Clean,
    Restore,
    Build,
    Run,
}

impl BuildStep {
    /// The three blocking steps, in execution order.
    pub const BLOCKING: [BuildStep; 3] = [BuildStep::Clean, BuildStep::Restore, BuildStep::Build];

    pub fn label(self) -> &'static str {
        match self {
            Self::Clean => "Clean",
            Self::Restore => "Restore",
            Self::Build => "Build",
            Self::Run => "Run",
        }
    }
}

/// Stages a build unit moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStage {
    Discovered,
    Patched,
    Building,
    Launched,
    WindowPending,
    Captured,
    Closing,
    Reaped,
    Succeeded,
    Failed,
}

/// Why a build unit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Patch,
    Command,
    Launch,
    WindowDetection,
    WindowResolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub kind: FailureKind,
    /// Stage the unit had reached when it failed.
    pub during: UnitStage,
    pub message: String,
}

/// Result of one build unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub manifest: PathBuf,
    /// Final stage: `Succeeded` or `Failed`.
    pub stage: UnitStage,
    pub failure: Option<UnitFailure>,
    pub window_title: Option<String>,
    /// Set when the screenshot was written.
    pub screenshot: Option<PathBuf>,
    /// Set when capture was attempted and failed (non-fatal).
    pub capture_error: Option<String>,
    pub reap: Option<ReapReport>,
}

impl UnitReport {
    pub fn succeeded(&self) -> bool {
        self.stage == UnitStage::Succeeded
    }
}

/// Per-project result: one report per build manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub project: PathBuf,
    pub units: Vec<UnitReport>,
    /// Set when the project itself failed before or around its units
    /// (e.g. an unexpected panic); counted as one failure.
    pub aborted: Option<String>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> usize {
        self.units.iter().filter(|u| u.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        let unit_failures = self.units.iter().filter(|u| !u.succeeded()).count();
        unit_failures + usize::from(self.aborted.is_some())
    }
}

/// Batch totals across all projects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub projects: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchTally {
    pub fn record(&mut self, outcome: &RunOutcome) {
        self.projects += 1;
        self.succeeded += outcome.succeeded();
        self.failed += outcome.failed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(manifests: &[&str]) -> ProjectDescriptor {
        let dir = PathBuf::from("/samples/CS/BarcodeDemo");
        ProjectDescriptor {
            manifests: manifests.iter().map(|m| dir.join(m)).collect(),
            dir,
            name: "BarcodeDemo".to_string(),
            entry_form: None,
        }
    }

    #[test]
    fn new_since_is_set_difference_without_blanks() {
        let baseline = WindowSnapshot::from_titles(["Explorer", "Terminal"]);
        let current =
            WindowSnapshot::from_titles(["Explorer", "Terminal", "", "   ", "MyForm - MainWindow"]);
        assert_eq!(current.new_since(&baseline), vec!["MyForm - MainWindow"]);
    }

    #[test]
    fn vanished_titles_are_not_new() {
        let baseline = WindowSnapshot::from_titles(["Explorer", "Old"]);
        let current = WindowSnapshot::from_titles(["Explorer"]);
        assert!(current.new_since(&baseline).is_empty());
    }

    #[test]
    fn snapshot_len_counts_distinct_titles() {
        let snap = WindowSnapshot::from_titles(["Explorer", "Explorer", "Terminal"]);
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn failure_kinds_serialize_snake_case() {
        let kinds = [
            FailureKind::Patch,
            FailureKind::Command,
            FailureKind::Launch,
            FailureKind::WindowDetection,
            FailureKind::WindowResolution,
        ];
        let names: Vec<String> = kinds
            .iter()
            .map(|k| serde_json::to_string(k).unwrap())
            .collect();
        assert_eq!(
            names,
            [
                "\"patch\"",
                "\"command\"",
                "\"launch\"",
                "\"window_detection\"",
                "\"window_resolution\""
            ]
        );
    }

    #[test]
    fn screenshot_path_single_manifest() {
        let p = project(&["BarcodeDemo.csproj"]);
        assert_eq!(
            p.screenshot_path(&p.manifests[0]),
            PathBuf::from("/samples/CS/BarcodeDemo/BarcodeDemo_screenshot.png")
        );
    }

    #[test]
    fn screenshot_path_multiple_manifests_adds_stem() {
        let p = project(&["A.csproj", "B.csproj"]);
        assert_eq!(
            p.screenshot_path(&p.manifests[1]),
            PathBuf::from("/samples/CS/BarcodeDemo/BarcodeDemo_B_screenshot.png")
        );
    }

    #[test]
    fn aborted_project_counts_as_one_failure() {
        let outcome = RunOutcome {
            project: PathBuf::from("/p"),
            units: Vec::new(),
            aborted: Some("panic".into()),
        };
        let mut tally = BatchTally::default();
        tally.record(&outcome);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.succeeded, 0);
        assert_eq!(tally.projects, 1);
    }
}
