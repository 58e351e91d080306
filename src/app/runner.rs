// FormSnap - app/runner.rs
//
// Build-unit state machine and batch driver.
//
// Per build unit (one manifest of one project):
//   Discovered -> Patched -> Building -> Launched -> WindowPending
//     -> Captured -> Closing -> Reaped -> Succeeded | Failed
//
// Failures before launch end the unit immediately; nothing is running yet.
// Once launched, the process tree is held by a `LiveProcess` guard, so the
// reap happens on every later path: detection timeout, capture failure,
// early return or panic.
//
// Projects run strictly one after another. A project's last reap completes
// before the next project's first build step starts.

use crate::core::model::{
    BatchTally, BuildStep, FailureKind, ProjectDescriptor, RunOutcome, UnitFailure, UnitReport,
    UnitStage, WindowSnapshot,
};
use crate::core::patch::ResourcePatcher;
use crate::core::reaper::{LiveProcess, ProcessReaper, ProcessTable};
use crate::core::window::{Desktop, WindowObserver};
use crate::platform::command::{CommandRunner, CommandTemplates};
use crate::util::error::WindowError;
use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Settings that shape a run but belong to no single collaborator.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub templates: CommandTemplates,
    /// Pause between projects.
    pub cooldown: Duration,
    /// Reap leftover processes referencing the project directory after
    /// each unit.
    pub sweep_strays: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            templates: CommandTemplates::default(),
            cooldown: Duration::from_millis(crate::util::constants::DEFAULT_COOLDOWN_MS),
            sweep_strays: true,
        }
    }
}

/// Drives projects through build, launch, capture and cleanup.
pub struct Harness<C: CommandRunner, D: Desktop, P: ProcessTable> {
    commands: C,
    observer: WindowObserver<D>,
    reaper: ProcessReaper<P>,
    patcher: Option<ResourcePatcher>,
    settings: RunSettings,
}

impl<C: CommandRunner, D: Desktop, P: ProcessTable> Harness<C, D, P> {
    pub fn new(
        commands: C,
        observer: WindowObserver<D>,
        reaper: ProcessReaper<P>,
        patcher: Option<ResourcePatcher>,
        settings: RunSettings,
    ) -> Self {
        Self {
            commands,
            observer,
            reaper,
            patcher,
            settings,
        }
    }

    pub fn commands(&self) -> &C {
        &self.commands
    }

    pub fn observer(&self) -> &WindowObserver<D> {
        &self.observer
    }

    pub fn reaper(&self) -> &ProcessReaper<P> {
        &self.reaper
    }

    // -------------------------------------------------------------------------
    // Batch
    // -------------------------------------------------------------------------

    /// Run every project in order and total the results.
    ///
    /// A panic inside one project is caught, counted as one failure for
    /// that project, and the batch moves on.
    pub fn run_batch(&self, projects: &[ProjectDescriptor]) -> (BatchTally, Vec<RunOutcome>) {
        let total = projects.len();
        let mut tally = BatchTally::default();
        let mut outcomes = Vec::with_capacity(total);

        for (index, project) in projects.iter().enumerate() {
            if index > 0 && !self.settings.cooldown.is_zero() {
                tracing::debug!(cooldown = ?self.settings.cooldown, "Cooling down");
                thread::sleep(self.settings.cooldown);
            }

            tracing::info!(
                index = index + 1,
                total,
                project = %project.name,
                "Processing project"
            );

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_project(project)))
                .unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(
                        project = %project.dir.display(),
                        error = %message,
                        "Unexpected error while processing project"
                    );
                    RunOutcome {
                        project: project.dir.clone(),
                        units: Vec::new(),
                        aborted: Some(message),
                    }
                });

            tally.record(&outcome);
            outcomes.push(outcome);
        }

        (tally, outcomes)
    }

    // -------------------------------------------------------------------------
    // Project
    // -------------------------------------------------------------------------

    /// Run each build manifest of `project` as an independent unit.
    ///
    /// The window baseline is taken once, before the first launch, and
    /// shared by every unit of the project.
    pub fn run_project(&self, project: &ProjectDescriptor) -> RunOutcome {
        tracing::info!(
            project = %project.dir.display(),
            manifests = project.manifests.len(),
            "Scanning existing windows"
        );

        let baseline = match self.observer.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(project = %project.name, error = %e, "Cannot take window baseline");
                return RunOutcome {
                    project: project.dir.clone(),
                    units: Vec::new(),
                    aborted: Some(e.to_string()),
                };
            }
        };
        tracing::debug!(windows = baseline.len(), "Window baseline taken");

        let units = project
            .manifests
            .iter()
            .map(|manifest| self.run_build_unit(project, manifest, &baseline))
            .collect();

        RunOutcome {
            project: project.dir.clone(),
            units,
            aborted: None,
        }
    }

    // -------------------------------------------------------------------------
    // Build unit
    // -------------------------------------------------------------------------

    /// Run one manifest through the whole state machine. Never fails; the
    /// outcome is in the returned report.
    pub fn run_build_unit(
        &self,
        project: &ProjectDescriptor,
        manifest: &Path,
        baseline: &WindowSnapshot,
    ) -> UnitReport {
        let report = self.drive_unit(project, manifest, baseline);

        if self.settings.sweep_strays {
            let dir = std::fs::canonicalize(&project.dir).unwrap_or_else(|_| project.dir.clone());
            let swept = self.reaper.sweep(&dir, &[std::process::id()]);
            if !swept.is_empty() {
                tracing::info!(project = %project.name, count = swept.len(), "Stray processes reaped");
            }
        }

        match &report.failure {
            None => tracing::info!(
                manifest = %manifest.display(),
                screenshot = ?report.screenshot,
                "Build unit succeeded"
            ),
            Some(f) => tracing::error!(
                project = %project.dir.display(),
                manifest = %manifest.display(),
                during = ?f.during,
                error = %f.message,
                "Build unit failed"
            ),
        }
        report
    }

    fn drive_unit(
        &self,
        project: &ProjectDescriptor,
        manifest: &Path,
        baseline: &WindowSnapshot,
    ) -> UnitReport {
        let mut unit = UnitProgress::new(manifest);

        if let Some(patcher) = &self.patcher {
            if let Err(e) = patcher.patch(project) {
                unit.fail(FailureKind::Patch, e);
                return unit.finish();
            }
        }
        unit.advance(UnitStage::Patched);

        unit.advance(UnitStage::Building);
        for step in BuildStep::BLOCKING {
            let command = self.settings.templates.render(step, manifest);
            tracing::info!(step = step.label(), command = %command, "Running build step");
            if let Err(e) = self.commands.run_blocking(&command, &project.dir) {
                unit.fail(FailureKind::Command, e);
                return unit.finish();
            }
        }

        let run_command = self.settings.templates.render(BuildStep::Run, manifest);
        let handle = match self.commands.spawn_detached(&run_command, &project.dir) {
            Ok(handle) => handle,
            Err(e) => {
                unit.fail(FailureKind::Launch, e);
                return unit.finish();
            }
        };
        let live = LiveProcess::new(&self.reaper, handle);
        unit.advance(UnitStage::Launched);

        unit.advance(UnitStage::WindowPending);
        tracing::info!(manifest = %manifest.display(), "Detecting new application window");
        match self.observer.wait_for_new_window(baseline) {
            Ok(window) => {
                tracing::debug!(
                    title = %window.title,
                    window_pid = ?window.pid,
                    launch_pid = ?live.pid(),
                    "Window owner"
                );
                unit.report.window_title = Some(window.title.clone());

                let destination = project.screenshot_path(manifest);
                match self.observer.focus_and_capture(&window, &destination) {
                    Ok(path) => unit.report.screenshot = Some(path),
                    Err(e) => {
                        tracing::warn!(title = %window.title, error = %e, "Screenshot failed");
                        unit.report.capture_error = Some(e.to_string());
                    }
                }
                unit.advance(UnitStage::Captured);

                unit.advance(UnitStage::Closing);
                if let Err(e) = self.observer.request_close(&window) {
                    tracing::warn!(
                        title = %window.title,
                        error = %e,
                        "Close request failed; relying on process reap"
                    );
                }
            }
            Err(e) => {
                let kind = match e {
                    WindowError::Resolution { .. } => FailureKind::WindowResolution,
                    _ => FailureKind::WindowDetection,
                };
                unit.fail(kind, e);
                unit.advance(UnitStage::Closing);
            }
        }

        unit.report.reap = live.finish();
        unit.advance(UnitStage::Reaped);
        unit.finish()
    }
}

/// Stage tracking for one build unit.
struct UnitProgress {
    report: UnitReport,
}

impl UnitProgress {
    fn new(manifest: &Path) -> Self {
        Self {
            report: UnitReport {
                manifest: manifest.to_path_buf(),
                stage: UnitStage::Discovered,
                failure: None,
                window_title: None,
                screenshot: None,
                capture_error: None,
                reap: None,
            },
        }
    }

    fn advance(&mut self, stage: UnitStage) {
        tracing::debug!(
            manifest = %self.report.manifest.display(),
            from = ?self.report.stage,
            to = ?stage,
            "Stage"
        );
        self.report.stage = stage;
    }

    /// Record the failure against the current stage. The first one wins.
    fn fail(&mut self, kind: FailureKind, error: impl Display) {
        if self.report.failure.is_none() {
            self.report.failure = Some(UnitFailure {
                kind,
                during: self.report.stage,
                message: error.to_string(),
            });
        }
    }

    fn finish(mut self) -> UnitReport {
        let terminal = if self.report.failure.is_some() {
            UnitStage::Failed
        } else {
            UnitStage::Succeeded
        };
        self.advance(terminal);
        self.report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
