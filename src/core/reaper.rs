// FormSnap - core/reaper.rs
//
// Process-tree termination with escalating force and bounded waits.
//
// Order per reap:
//   1. graceful terminate to every descendant
//   2. wait up to the timeout, force-kill whatever survived
//   3. graceful terminate to the root, wait, force-kill if still alive
//
// Every step treats "no such process" as success: processes exiting on their
// own while we work is the normal case, not an error. `reap` never fails.

use crate::core::model::{ProcessHandle, ReapReport, RootOutcome};
use crate::util::constants;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

// =============================================================================
// Process table seam
// =============================================================================

/// Result of delivering a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signalled {
    Sent,
    /// The process was already gone.
    NoSuchProcess,
    /// The OS refused (permissions, protected process).
    Failed,
}

/// View of the OS process table.
///
/// Queries answer from the last `refresh`; signals act immediately.
pub trait ProcessTable {
    fn refresh(&mut self);

    fn is_alive(&self, pid: u32) -> bool;

    fn parent(&self, pid: u32) -> Option<u32>;

    /// Every transitive child of `pid`, parents before children.
    fn descendants(&self, pid: u32) -> Vec<u32>;

    /// Graceful termination request.
    fn terminate(&mut self, pid: u32) -> Signalled;

    /// Forceful kill.
    fn kill(&mut self, pid: u32) -> Signalled;

    /// Every live process, as of the last `refresh`.
    fn processes(&self) -> Vec<ProcessInfo>;
}

/// What the sweep needs to know about a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Process name as reported by the OS, e.g. `dotnet.exe`.
    pub name: String,
    pub exe: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub args: Vec<String>,
}

impl ProcessInfo {
    /// True for a build-toolchain host (`dotnet`, `MSBuild`).
    fn is_toolchain(&self) -> bool {
        let stem = Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        constants::SWEEP_TOOLCHAIN_NAMES.contains(&stem.as_str())
    }

    /// A process left behind by a build unit of `project_dir`.
    ///
    /// Either its executable sits in the project's build output, or it is a
    /// toolchain process working in or naming the project directory. Other
    /// processes that merely mention the path never match.
    pub fn is_stray_of(&self, project_dir: &Path) -> bool {
        let dir = normalise_path(&project_dir.to_string_lossy());
        if dir.is_empty() {
            return false;
        }

        let in_build_output = self.exe.as_ref().is_some_and(|exe| {
            let exe = normalise_path(&exe.to_string_lossy());
            constants::SWEEP_OUTPUT_DIRS
                .iter()
                .any(|sub| path_within(&exe, &format!("{dir}/{sub}")))
        });
        if in_build_output {
            return true;
        }

        if !self.is_toolchain() {
            return false;
        }
        let works_in_dir = self
            .cwd
            .as_ref()
            .is_some_and(|cwd| path_within(&normalise_path(&cwd.to_string_lossy()), &dir));
        works_in_dir || self.args.iter().any(|arg| mentions_path(arg, &dir))
    }
}

/// Lower-case, forward slashes, no verbatim prefix, no trailing separator.
fn normalise_path(raw: &str) -> String {
    let forward = raw.replace('\\', "/");
    let stripped = forward.strip_prefix("//?/").unwrap_or(&forward);
    stripped.trim_end_matches('/').to_lowercase()
}

/// `path` is `dir` itself or lies below it. Both already normalised.
fn path_within(path: &str, dir: &str) -> bool {
    path.strip_prefix(dir)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// `arg` names `dir` or something below it, anywhere in the argument
/// (`--project=C:\x\Demo\Demo.csproj` counts). `dir` is normalised.
fn mentions_path(arg: &str, dir: &str) -> bool {
    let arg = normalise_path(arg);
    arg.match_indices(dir).any(|(at, _)| {
        let before = arg[..at].chars().next_back();
        let after = arg[at + dir.len()..].chars().next();
        let starts_clean = before.map_or(true, |c| !c.is_alphanumeric() && c != '_');
        let ends_clean =
            after.map_or(true, |c| matches!(c, '/' | '"' | '\'') || c.is_whitespace());
        starts_clean && ends_clean
    })
}

// =============================================================================
// Reaper
// =============================================================================

pub struct ProcessReaper<T: ProcessTable> {
    table: Mutex<T>,
    timeout: Duration,
    poll_interval: Duration,
}

impl<T: ProcessTable> ProcessReaper<T> {
    pub fn new(table: T, timeout: Duration) -> Self {
        Self {
            table: Mutex::new(table),
            timeout,
            poll_interval: Duration::from_millis(constants::REAP_POLL_INTERVAL_MS),
        }
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        // A panic while holding the table leaves it merely stale.
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the process table.
    pub fn with_table<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// Terminate `root` and all of its descendants.
    ///
    /// Idempotent: reaping a pid that is already gone returns an
    /// `AlreadyGone` report without sending anything.
    pub fn reap(&self, root: u32) -> ReapReport {
        let mut table = self.lock();
        table.refresh();

        if !table.is_alive(root) {
            tracing::debug!(pid = root, "Process already gone; nothing to reap");
            return ReapReport::already_gone(root);
        }

        let descendants = table.descendants(root);
        tracing::debug!(pid = root, descendants = ?descendants, "Reaping process tree");

        for &pid in &descendants {
            log_signal(pid, "terminate", table.terminate(pid));
        }

        let mut force_killed = Vec::new();
        if !descendants.is_empty() {
            let survivors = self.wait_for_exit(&mut table, &descendants);
            for &pid in &survivors {
                tracing::warn!(pid, "Descendant ignored terminate; killing");
                log_signal(pid, "kill", table.kill(pid));
                force_killed.push(pid);
            }
            if !survivors.is_empty() {
                let stubborn = self.wait_for_exit(&mut table, &survivors);
                if !stubborn.is_empty() {
                    tracing::warn!(pids = ?stubborn, "Descendants still visible after kill");
                }
            }
        }

        let outcome = self.end_process(&mut table, root);

        tracing::info!(
            pid = root,
            ?outcome,
            descendants = descendants.len(),
            force_killed = force_killed.len(),
            "Process tree reaped"
        );

        ReapReport {
            root,
            outcome,
            descendants,
            force_killed,
        }
    }

    /// Reap the tree behind `handle` and collect the root's exit status.
    pub fn reap_handle(&self, mut handle: ProcessHandle) -> ReapReport {
        let report = self.reap(handle.pid());
        handle.collect();
        report
    }

    /// End the leftovers of a build unit of `project_dir`: build-output
    /// executables and toolchain processes tied to the directory (see
    /// [`ProcessInfo::is_stray_of`]).
    ///
    /// `exclude` and their ancestors are never touched. Each stray is ended
    /// on its own; its children are left alone. Returns one report per
    /// stray.
    pub fn sweep(&self, project_dir: &Path, exclude: &[u32]) -> Vec<ReapReport> {
        let mut table = self.lock();
        table.refresh();

        let mut protected: HashSet<u32> = HashSet::new();
        for &pid in exclude {
            let mut current = Some(pid);
            while let Some(p) = current {
                if !protected.insert(p) {
                    break;
                }
                current = table.parent(p);
            }
        }

        let strays: Vec<ProcessInfo> = table
            .processes()
            .into_iter()
            .filter(|p| !protected.contains(&p.pid) && p.is_stray_of(project_dir))
            .collect();
        if strays.is_empty() {
            return Vec::new();
        }

        let pids: Vec<u32> = strays.iter().map(|p| p.pid).collect();
        tracing::info!(dir = %project_dir.display(), pids = ?pids, "Ending stray processes");

        strays
            .iter()
            .map(|stray| {
                tracing::debug!(pid = stray.pid, name = %stray.name, "Ending stray process");
                let outcome = self.end_process(&mut table, stray.pid);
                ReapReport {
                    root: stray.pid,
                    outcome,
                    descendants: Vec::new(),
                    force_killed: Vec::new(),
                }
            })
            .collect()
    }

    /// Terminate one process, wait, and kill it if it is still there.
    fn end_process(&self, table: &mut T, pid: u32) -> RootOutcome {
        log_signal(pid, "terminate", table.terminate(pid));
        if self.wait_for_exit(table, &[pid]).is_empty() {
            return RootOutcome::Terminated;
        }
        tracing::warn!(pid, "Process ignored terminate; killing");
        log_signal(pid, "kill", table.kill(pid));
        if self.wait_for_exit(table, &[pid]).is_empty() {
            RootOutcome::Killed
        } else {
            tracing::error!(pid, "Process still visible after kill");
            RootOutcome::Survived
        }
    }

    /// Poll until every pid in `pids` is gone or the timeout elapses.
    /// Returns the pids still alive.
    fn wait_for_exit(&self, table: &mut T, pids: &[u32]) -> Vec<u32> {
        let deadline = Instant::now() + self.timeout;
        loop {
            table.refresh();
            let alive: Vec<u32> = pids.iter().copied().filter(|&p| table.is_alive(p)).collect();
            if alive.is_empty() || Instant::now() >= deadline {
                return alive;
            }
            thread::sleep(self.poll_interval);
        }
    }
}

fn log_signal(pid: u32, signal: &str, result: Signalled) {
    match result {
        Signalled::Sent => tracing::trace!(pid, signal, "Signal sent"),
        Signalled::NoSuchProcess => tracing::trace!(pid, signal, "Process exited before signal"),
        Signalled::Failed => tracing::warn!(pid, signal, "Signal could not be delivered"),
    }
}

// =============================================================================
// Live process guard
// =============================================================================

/// A launched process tree that is reaped when the guard goes out of scope.
///
/// Covers every exit path of a build unit, including early returns and
/// panics. `finish` reaps explicitly and returns the report.
pub struct LiveProcess<'a, T: ProcessTable> {
    reaper: &'a ProcessReaper<T>,
    handle: Option<ProcessHandle>,
}

impl<'a, T: ProcessTable> LiveProcess<'a, T> {
    pub fn new(reaper: &'a ProcessReaper<T>, handle: ProcessHandle) -> Self {
        Self {
            reaper,
            handle: Some(handle),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(ProcessHandle::pid)
    }

    pub fn finish(mut self) -> Option<ReapReport> {
        self.handle.take().map(|h| self.reaper.reap_handle(h))
    }
}

impl<T: ProcessTable> Drop for LiveProcess<'_, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(pid = handle.pid(), "Reaping process on unit exit");
            self.reaper.reap_handle(handle);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Debug, Clone, Default)]
    struct FakeProc {
        parent: Option<u32>,
        alive: bool,
        ignores_terminate: bool,
        unkillable: bool,
        info: ProcessInfo,
    }

    /// In-memory process tree recording every signal in order.
    #[derive(Default)]
    struct FakeTable {
        procs: BTreeMap<u32, FakeProc>,
        calls: Arc<StdMutex<Vec<String>>>,
    }

    impl FakeTable {
        fn spawn(mut self, pid: u32, parent: Option<u32>) -> Self {
            self.procs.insert(
                pid,
                FakeProc {
                    parent,
                    alive: true,
                    ..Default::default()
                },
            );
            self
        }

        fn tweak(mut self, pid: u32, f: impl FnOnce(&mut FakeProc)) -> Self {
            if let Some(p) = self.procs.get_mut(&pid) {
                f(p);
            }
            self
        }

        fn record(&self, entry: String) {
            self.calls.lock().unwrap().push(entry);
        }
    }

    impl ProcessTable for FakeTable {
        fn refresh(&mut self) {}

        fn is_alive(&self, pid: u32) -> bool {
            self.procs.get(&pid).is_some_and(|p| p.alive)
        }

        fn parent(&self, pid: u32) -> Option<u32> {
            self.procs.get(&pid).and_then(|p| p.parent)
        }

        fn descendants(&self, pid: u32) -> Vec<u32> {
            let mut out = Vec::new();
            let mut frontier = vec![pid];
            while let Some(parent) = frontier.pop() {
                for (&child, p) in &self.procs {
                    if p.alive && p.parent == Some(parent) {
                        out.push(child);
                        frontier.push(child);
                    }
                }
            }
            out
        }

        fn terminate(&mut self, pid: u32) -> Signalled {
            self.record(format!("term {pid}"));
            match self.procs.get_mut(&pid) {
                Some(p) if p.alive => {
                    if !p.ignores_terminate {
                        p.alive = false;
                    }
                    Signalled::Sent
                }
                _ => Signalled::NoSuchProcess,
            }
        }

        fn kill(&mut self, pid: u32) -> Signalled {
            self.record(format!("kill {pid}"));
            match self.procs.get_mut(&pid) {
                Some(p) if p.alive => {
                    if !p.unkillable {
                        p.alive = false;
                    }
                    Signalled::Sent
                }
                _ => Signalled::NoSuchProcess,
            }
        }

        fn processes(&self) -> Vec<ProcessInfo> {
            self.procs
                .iter()
                .filter(|(_, p)| p.alive)
                .map(|(&pid, p)| ProcessInfo {
                    pid,
                    ..p.info.clone()
                })
                .collect()
        }
    }

    fn reaper(table: FakeTable) -> (ProcessReaper<FakeTable>, Arc<StdMutex<Vec<String>>>) {
        let calls = Arc::clone(&table.calls);
        (ProcessReaper::new(table, Duration::ZERO), calls)
    }

    #[test]
    fn descendants_are_signalled_before_root() {
        let table = FakeTable::default()
            .spawn(100, None)
            .spawn(200, Some(100))
            .spawn(300, Some(200));
        let (reaper, calls) = reaper(table);

        let report = reaper.reap(100);
        assert_eq!(report.outcome, RootOutcome::Terminated);
        assert_eq!(report.descendants.len(), 2);

        let calls = calls.lock().unwrap();
        let root_pos = calls.iter().position(|c| c.ends_with(" 100")).unwrap();
        for pid in ["200", "300"] {
            let pos = calls.iter().position(|c| c.ends_with(pid)).unwrap();
            assert!(pos < root_pos, "descendant {pid} signalled after root: {calls:?}");
        }
    }

    #[test]
    fn reap_twice_is_noop_the_second_time() {
        let (reaper, calls) = reaper(FakeTable::default().spawn(10, None));

        let first = reaper.reap(10);
        assert_eq!(first.outcome, RootOutcome::Terminated);
        let signals_after_first = calls.lock().unwrap().len();

        let second = reaper.reap(10);
        assert_eq!(second, ReapReport::already_gone(10));
        assert_eq!(calls.lock().unwrap().len(), signals_after_first);
    }

    #[test]
    fn reaping_unknown_pid_sends_nothing() {
        let (reaper, calls) = reaper(FakeTable::default());
        assert_eq!(reaper.reap(999).outcome, RootOutcome::AlreadyGone);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn stubborn_descendant_is_force_killed_before_root_terminate() {
        let table = FakeTable::default()
            .spawn(1, None)
            .spawn(2, Some(1))
            .tweak(2, |p| p.ignores_terminate = true);
        let (reaper, calls) = reaper(table);

        let report = reaper.reap(1);
        assert_eq!(report.force_killed, vec![2]);
        assert_eq!(*calls.lock().unwrap(), vec!["term 2", "kill 2", "term 1"]);
    }

    #[test]
    fn root_ignoring_terminate_is_killed() {
        let table = FakeTable::default()
            .spawn(5, None)
            .tweak(5, |p| p.ignores_terminate = true);
        let (reaper, _) = reaper(table);
        assert_eq!(reaper.reap(5).outcome, RootOutcome::Killed);
    }

    #[test]
    fn unkillable_root_is_reported_not_raised() {
        let table = FakeTable::default().spawn(5, None).tweak(5, |p| {
            p.ignores_terminate = true;
            p.unkillable = true;
        });
        let (reaper, _) = reaper(table);
        assert_eq!(reaper.reap(5).outcome, RootOutcome::Survived);
    }

    #[test]
    fn guard_reaps_on_drop() {
        let (reaper, calls) = reaper(FakeTable::default().spawn(42, None));
        {
            let live = LiveProcess::new(&reaper, ProcessHandle::untracked(42));
            assert_eq!(live.pid(), Some(42));
        }
        assert_eq!(*calls.lock().unwrap(), vec!["term 42"]);
        assert!(!reaper.with_table(|t| t.is_alive(42)));
    }

    #[test]
    fn guard_finish_reaps_exactly_once() {
        let (reaper, calls) = reaper(FakeTable::default().spawn(42, None));
        let live = LiveProcess::new(&reaper, ProcessHandle::untracked(42));
        let report = live.finish().unwrap();
        assert_eq!(report.outcome, RootOutcome::Terminated);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    fn process(name: &str, exe: &str, cwd: &str, args: &[&str]) -> ProcessInfo {
        ProcessInfo {
            pid: 0,
            name: name.to_string(),
            exe: Some(PathBuf::from(exe)),
            cwd: Some(PathBuf::from(cwd)),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    #[test]
    fn build_output_executable_is_a_stray() {
        let dir = Path::new(r"C:\samples\CS\Demo");
        let app = process(
            "Demo.exe",
            r"C:\Samples\CS\Demo\bin\Debug\net48\Demo.exe",
            r"C:\Users\me",
            &[],
        );
        assert!(app.is_stray_of(dir));
        // Verbatim prefixes from canonicalisation are ignored.
        assert!(app.is_stray_of(Path::new(r"\\?\C:\samples\CS\Demo")));
    }

    #[test]
    fn toolchain_in_or_naming_the_project_is_a_stray() {
        let dir = Path::new("/s/CS/Demo");
        let in_dir = process("dotnet", "/usr/bin/dotnet", "/s/CS/Demo", &["build-server"]);
        let naming = process(
            "MSBuild.exe",
            "/opt/msbuild/MSBuild.exe",
            "/tmp",
            &["/p:Configuration=Debug", "--project=/s/CS/Demo/Demo.csproj"],
        );
        assert!(in_dir.is_stray_of(dir));
        assert!(naming.is_stray_of(dir));
    }

    #[test]
    fn sibling_with_same_prefix_is_not_a_stray() {
        let dir = Path::new("/s/CS/Demo");
        let sibling_build = process(
            "DemoViewer",
            "/s/CS/DemoViewer/bin/Debug/DemoViewer",
            "/s/CS/DemoViewer",
            &[],
        );
        let sibling_tool = process(
            "dotnet",
            "/usr/bin/dotnet",
            "/s/CS/Demo2",
            &["build", "/s/CS/Demo2/Demo2.csproj"],
        );
        assert!(!sibling_build.is_stray_of(dir));
        assert!(!sibling_tool.is_stray_of(dir));
    }

    #[test]
    fn editors_and_shells_mentioning_the_project_are_not_strays() {
        let dir = Path::new("/s/CS/Demo");
        let tail = process("tail", "/usr/bin/tail", "/s/CS/Demo", &["-f", "/s/CS/Demo/debug.log"]);
        let ide = process(
            "devenv.exe",
            r"C:\VS\devenv.exe",
            "/s/CS/Demo",
            &["/s/CS/Demo/Demo.sln"],
        );
        assert!(!tail.is_stray_of(dir));
        assert!(!ide.is_stray_of(dir));
    }

    #[test]
    fn sweep_ends_only_strays_and_spares_their_children() {
        let table = FakeTable::default()
            .spawn(1, None)
            .tweak(1, |p| {
                p.info = process("Demo", "/s/CS/Demo/bin/Demo", "/s/CS/Demo", &[]);
            })
            .spawn(4, Some(1))
            .tweak(4, |p| {
                p.info = process("helper", "/usr/bin/helper", "/tmp", &[]);
            })
            .spawn(5, None)
            .tweak(5, |p| {
                p.info = process("vim", "/usr/bin/vim", "/s/CS/Demo", &["/s/CS/Demo/Program.cs"]);
            })
            .spawn(6, None)
            .tweak(6, |p| {
                p.info = process("dotnet", "/usr/bin/dotnet", "/s/CS/DemoViewer", &[]);
            });
        let (reaper, calls) = reaper(table);

        let reports = reaper.sweep(Path::new("/s/CS/Demo"), &[]);

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].root, 1);
        assert_eq!(reports[0].outcome, RootOutcome::Terminated);
        assert_eq!(*calls.lock().unwrap(), vec!["term 1"]);
        assert!(reaper.with_table(|t| t.is_alive(4) && t.is_alive(5) && t.is_alive(6)));
    }

    #[test]
    fn sweep_spares_excluded_pids_and_their_ancestors() {
        let table = FakeTable::default()
            .spawn(1, None)
            .tweak(1, |p| {
                p.info = process("dotnet", "/usr/bin/dotnet", "/s/CS/Demo", &["run"]);
            })
            .spawn(9, None)
            .tweak(9, |p| {
                p.info = process("dotnet", "/usr/bin/dotnet", "/s/CS/Demo", &["test"]);
            })
            .spawn(2, Some(9))
            .tweak(2, |p| {
                p.info = process("formsnap", "/s/CS/Demo/bin/formsnap", "/s/CS/Demo", &[]);
            });
        let (reaper, _) = reaper(table);

        let reaped = reaper.sweep(Path::new("/s/CS/Demo"), &[2]);
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].root, 1);
        assert!(reaper.with_table(|t| t.is_alive(2) && t.is_alive(9)));
    }
}
