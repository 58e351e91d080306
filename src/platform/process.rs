// FormSnap - platform/process.rs
//
// `ProcessTable` over the live OS process table via `sysinfo`.
//
// Zombie and dead entries count as gone: a zombie has already exited and
// only waits for its parent to collect the status.

use crate::core::reaper::{ProcessInfo, ProcessTable, Signalled};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System};

pub struct SystemProcessTable {
    system: System,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        let mut table = Self {
            system: System::new(),
        };
        table.refresh();
        table
    }

    fn live(&self, pid: u32) -> Option<&Process> {
        self.system
            .process(Pid::from_u32(pid))
            .filter(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
    }

    fn signal(&mut self, pid: u32, graceful: bool) -> Signalled {
        let Some(process) = self.live(pid) else {
            return Signalled::NoSuchProcess;
        };
        let delivered = if graceful {
            // Not every platform has a terminate signal; fall back to kill.
            process.kill_with(Signal::Term).unwrap_or_else(|| process.kill())
        } else {
            process.kill()
        };
        if delivered {
            Signalled::Sent
        } else if self.live(pid).is_none() {
            Signalled::NoSuchProcess
        } else {
            Signalled::Failed
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.live(pid).is_some()
    }

    fn parent(&self, pid: u32) -> Option<u32> {
        self.system
            .process(Pid::from_u32(pid))
            .and_then(Process::parent)
            .map(Pid::as_u32)
    }

    fn descendants(&self, pid: u32) -> Vec<u32> {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (child, process) in self.system.processes() {
            // Linux lists threads as tasks of their process; skip them.
            if process.thread_kind().is_some() {
                continue;
            }
            let Some(parent) = process.parent() else {
                continue;
            };
            children
                .entry(parent.as_u32())
                .or_default()
                .push(child.as_u32());
        }

        // Breadth-first so parents are listed before their children.
        let mut seen = HashSet::from([pid]);
        let mut out = Vec::new();
        let mut frontier = vec![pid];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for parent in frontier {
                if let Some(kids) = children.get(&parent) {
                    for &kid in kids {
                        if seen.insert(kid) && self.live(kid).is_some() {
                            out.push(kid);
                            next.push(kid);
                        }
                    }
                }
            }
            frontier = next;
        }
        out
    }

    fn terminate(&mut self, pid: u32) -> Signalled {
        self.signal(pid, true)
    }

    fn kill(&mut self, pid: u32) -> Signalled {
        self.signal(pid, false)
    }

    fn processes(&self) -> Vec<ProcessInfo> {
        let mut out: Vec<ProcessInfo> = self
            .system
            .processes()
            .iter()
            .filter(|(_, p)| p.thread_kind().is_none())
            .filter(|(_, p)| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
            .map(|(pid, p)| ProcessInfo {
                pid: pid.as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                exe: p.exe().map(Path::to_path_buf),
                cwd: p.cwd().map(Path::to_path_buf),
                args: p
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect(),
            })
            .collect();
        out.sort_unstable_by_key(|p| p.pid);
        out
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::model::RootOutcome;
    use crate::core::reaper::ProcessReaper;
    use crate::platform::command::{CommandRunner, ShellCommandRunner};
    use std::time::Duration;

    #[test]
    fn own_process_is_alive() {
        let table = SystemProcessTable::new();
        assert!(table.is_alive(std::process::id()));
    }

    #[test]
    fn own_process_is_listed_with_its_executable() {
        let table = SystemProcessTable::new();
        let me = table
            .processes()
            .into_iter()
            .find(|p| p.pid == std::process::id())
            .unwrap();
        assert!(!me.name.is_empty());
        assert!(me.exe.is_some());
        assert!(!me.args.is_empty());
    }

    #[test]
    fn reaps_a_real_shell_tree() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ShellCommandRunner::new()
            .spawn_detached("sleep 30 & sleep 30; wait", dir.path())
            .unwrap();
        let root = handle.pid();
        std::thread::sleep(Duration::from_millis(200));

        let reaper = ProcessReaper::new(SystemProcessTable::new(), Duration::from_secs(3));
        let report = reaper.reap_handle(handle);

        assert!(
            matches!(report.outcome, RootOutcome::Terminated | RootOutcome::Killed),
            "{report:?}"
        );
        assert!(!report.descendants.is_empty());
        assert!(!reaper.with_table(|t| {
            t.refresh();
            t.is_alive(root)
        }));
    }
}
