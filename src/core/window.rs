// FormSnap - core/window.rs
//
// Window detection, capture and close.
//
// Window enumeration and title-to-handle lookup are two separate, non-atomic
// OS queries: a title can appear in one and be gone by the next. Detection
// therefore resolves a handle exactly once at selection time, and capture and
// close act on that handle, never on the title.
//
// The OS side sits behind the `Desktop` trait; `platform::desktop` provides
// the real implementation.

use crate::core::model::{Geometry, TargetWindow, WindowSnapshot};
use crate::util::constants;
use crate::util::error::WindowError;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

// =============================================================================
// Desktop seam
// =============================================================================

/// Operations the observer needs from the window system.
pub trait Desktop {
    /// Titles of every current top-level window (may include blanks).
    fn window_titles(&self) -> Result<Vec<String>, WindowError>;

    /// Resolve the first live window with exactly this title.
    fn find_by_title(&self, title: &str) -> Result<Option<TargetWindow>, WindowError>;

    /// Whether the window currently has keyboard focus.
    fn is_focused(&self, window: &TargetWindow) -> bool;

    fn activate(&self, window: &TargetWindow) -> Result<(), WindowError>;

    fn maximize(&self, window: &TargetWindow) -> Result<(), WindowError>;

    /// Current bounds of the window behind the handle.
    fn geometry(&self, window: &TargetWindow) -> Result<Geometry, WindowError>;

    /// Pixels of a screen region.
    fn capture_region(&self, region: Geometry) -> Result<RgbaImage, WindowError>;

    /// Ask the window to close.
    fn close(&self, window: &TargetWindow) -> Result<(), WindowError>;
}

// =============================================================================
// Observer
// =============================================================================

/// Timing knobs for the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverTiming {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub activation_settle: Duration,
    pub maximize_settle: Duration,
    pub close_settle: Duration,
}

impl Default for ObserverTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(constants::DEFAULT_POLL_INTERVAL_MS),
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            activation_settle: Duration::from_millis(constants::DEFAULT_ACTIVATION_SETTLE_MS),
            maximize_settle: Duration::from_millis(constants::DEFAULT_MAXIMIZE_SETTLE_MS),
            close_settle: Duration::from_millis(constants::DEFAULT_CLOSE_SETTLE_MS),
        }
    }
}

impl ObserverTiming {
    /// No delays; detection still honours `max_attempts`.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            poll_interval: Duration::ZERO,
            max_attempts,
            activation_settle: Duration::ZERO,
            maximize_settle: Duration::ZERO,
            close_settle: Duration::ZERO,
        }
    }
}

/// Finds the window a launch produced, captures it, and asks it to close.
pub struct WindowObserver<D: Desktop> {
    desktop: D,
    timing: ObserverTiming,
    deny_list: Vec<String>,
}

impl<D: Desktop> WindowObserver<D> {
    /// Observer with the built-in deny-list plus `extra_deny`.
    pub fn new(desktop: D, timing: ObserverTiming, extra_deny: &[String]) -> Self {
        let deny_list = constants::WINDOW_DENY_LIST
            .iter()
            .map(|s| (*s).to_string())
            .chain(extra_deny.iter().filter(|s| !s.is_empty()).cloned())
            .collect();
        Self {
            desktop,
            timing,
            deny_list,
        }
    }

    pub fn desktop(&self) -> &D {
        &self.desktop
    }

    /// Current top-level window titles.
    pub fn snapshot(&self) -> Result<WindowSnapshot, WindowError> {
        self.desktop.window_titles().map(WindowSnapshot::from_titles)
    }

    /// Poll until a window absent from `baseline` appears, then resolve it.
    ///
    /// Each poll consumes one attempt; exactly `max_attempts` polls are made
    /// before giving up with `DetectionTimeout`. A failed enumeration counts
    /// as an empty poll.
    pub fn wait_for_new_window(
        &self,
        baseline: &WindowSnapshot,
    ) -> Result<TargetWindow, WindowError> {
        let max_attempts = self.timing.max_attempts;

        for attempt in 1..=max_attempts {
            let new_titles = match self.snapshot() {
                Ok(current) => current.new_since(baseline),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Window enumeration failed");
                    Vec::new()
                }
            };

            if new_titles.is_empty() {
                tracing::trace!(attempt, max_attempts, "No new window yet");
                if attempt < max_attempts {
                    thread::sleep(self.timing.poll_interval);
                }
                continue;
            }

            tracing::debug!(attempt, titles = ?new_titles, "New windows detected");
            return self.select(&new_titles);
        }

        Err(WindowError::DetectionTimeout {
            attempts: max_attempts,
        })
    }

    /// Pick and resolve one window among `new_titles` (non-empty, ordered).
    ///
    /// The first title not on the deny-list is preferred; when every title is
    /// denied the first raw title is used. If the preferred title no longer
    /// resolves, the first raw title is tried before giving up.
    fn select(&self, new_titles: &[String]) -> Result<TargetWindow, WindowError> {
        let Some(first_raw) = new_titles.first() else {
            return Err(WindowError::DetectionTimeout { attempts: 0 });
        };

        let preferred = match new_titles.iter().find(|t| !self.is_denied(t)) {
            Some(title) => {
                tracing::info!(title = %title, "Selected application window");
                title
            }
            None => {
                tracing::info!(title = %first_raw, "Only system windows appeared; guessing first");
                first_raw
            }
        };

        if let Some(window) = self.resolve(preferred) {
            return Ok(window);
        }

        if preferred != first_raw {
            tracing::warn!(
                title = %preferred,
                fallback = %first_raw,
                "Selected window vanished; trying first new window"
            );
            if let Some(window) = self.resolve(first_raw) {
                return Ok(window);
            }
        }

        Err(WindowError::Resolution {
            title: preferred.clone(),
        })
    }

    fn resolve(&self, title: &str) -> Option<TargetWindow> {
        match self.desktop.find_by_title(title) {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(title, error = %e, "Window lookup failed");
                None
            }
        }
    }

    /// True when `title` contains any deny-list entry.
    pub fn is_denied(&self, title: &str) -> bool {
        self.deny_list.iter().any(|d| title.contains(d.as_str()))
    }

    /// Focus and maximise `window`, then save its pixels as a PNG.
    ///
    /// Focus and maximise failures are logged and capture proceeds anyway.
    /// Only capture/save failures are returned.
    pub fn focus_and_capture(
        &self,
        window: &TargetWindow,
        destination: &Path,
    ) -> Result<PathBuf, WindowError> {
        if !self.desktop.is_focused(window) {
            if let Err(e) = self.desktop.activate(window) {
                tracing::warn!(
                    title = %window.title,
                    error = %e,
                    "Could not focus window; attempting capture anyway"
                );
            }
            // A refused activation may still be in flight.
            thread::sleep(self.timing.activation_settle);
        }

        if let Err(e) = self.desktop.maximize(window) {
            tracing::warn!(title = %window.title, error = %e, "Could not maximise window");
        }
        thread::sleep(self.timing.maximize_settle);

        let region = match self.desktop.geometry(window) {
            Ok(g) => g,
            Err(e) => {
                tracing::debug!(
                    title = %window.title,
                    error = %e,
                    "Using geometry from selection time"
                );
                window.geometry
            }
        };
        if region.is_empty() {
            return Err(WindowError::Capture {
                path: destination.to_path_buf(),
                reason: format!("window has no area ({}x{})", region.width, region.height),
            });
        }

        tracing::info!(title = %window.title, ?region, "Capturing screenshot");
        let image = self
            .desktop
            .capture_region(region)
            .map_err(|e| WindowError::Capture {
                path: destination.to_path_buf(),
                reason: e.to_string(),
            })?;

        image
            .save_with_format(destination, image::ImageFormat::Png)
            .map_err(|e| WindowError::Capture {
                path: destination.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::info!(path = %destination.display(), "Screenshot saved");
        Ok(destination.to_path_buf())
    }

    /// Send a graceful close request. The reaper remains responsible for
    /// actually ending the process.
    pub fn request_close(&self, window: &TargetWindow) -> Result<(), WindowError> {
        self.desktop.close(window)?;
        tracing::debug!(title = %window.title, "Close request sent");
        thread::sleep(self.timing.close_settle);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
