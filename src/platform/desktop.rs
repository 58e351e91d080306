// FormSnap - platform/desktop.rs
//
// The real `Desktop`: window enumeration and screen capture through `xcap`,
// focus/maximise/close through Win32 on Windows.
//
// On other platforms enumeration and capture still work (useful for a dry
// run of detection), while activation, maximise and close report
// `WindowError::Unsupported`. The observer treats the first two as
// non-fatal and the reaper ends the process regardless.

use crate::core::model::{Geometry, TargetWindow, WindowHandle};
use crate::core::window::Desktop;
use crate::util::error::WindowError;
use image::RgbaImage;
use xcap::{Monitor, Window};

#[derive(Debug, Clone, Copy, Default)]
pub struct XcapDesktop;

impl XcapDesktop {
    pub fn new() -> Self {
        Self
    }

    fn windows(&self) -> Result<Vec<Window>, WindowError> {
        Window::all().map_err(|e| WindowError::Enumeration {
            reason: e.to_string(),
        })
    }

    fn by_handle(&self, handle: WindowHandle) -> Result<Option<Window>, WindowError> {
        Ok(self
            .windows()?
            .into_iter()
            .find(|w| w.id().ok().map(u64::from) == Some(handle.0)))
    }
}

fn geometry_of(window: &Window) -> Option<Geometry> {
    Some(Geometry {
        left: window.x().ok()?,
        top: window.y().ok()?,
        width: window.width().ok()?,
        height: window.height().ok()?,
    })
}

impl Desktop for XcapDesktop {
    fn window_titles(&self) -> Result<Vec<String>, WindowError> {
        Ok(self
            .windows()?
            .iter()
            .filter_map(|w| w.title().ok())
            .collect())
    }

    fn find_by_title(&self, title: &str) -> Result<Option<TargetWindow>, WindowError> {
        let found = self
            .windows()?
            .into_iter()
            .find(|w| w.title().ok().as_deref() == Some(title));

        let Some(window) = found else {
            return Ok(None);
        };
        let Ok(id) = window.id() else {
            return Ok(None);
        };

        Ok(Some(TargetWindow {
            handle: WindowHandle(u64::from(id)),
            title: title.to_string(),
            geometry: geometry_of(&window).unwrap_or_default(),
            pid: window.pid().ok(),
        }))
    }

    fn is_focused(&self, window: &TargetWindow) -> bool {
        #[cfg(windows)]
        {
            win32::is_foreground(window.handle)
        }
        #[cfg(not(windows))]
        {
            matches!(
                self.by_handle(window.handle),
                Ok(Some(w)) if w.is_focused().unwrap_or(false)
            )
        }
    }

    fn activate(&self, window: &TargetWindow) -> Result<(), WindowError> {
        #[cfg(windows)]
        {
            win32::activate(window)
        }
        #[cfg(not(windows))]
        {
            let _ = window;
            Err(WindowError::Unsupported {
                operation: "activation",
            })
        }
    }

    fn maximize(&self, window: &TargetWindow) -> Result<(), WindowError> {
        #[cfg(windows)]
        {
            win32::maximize(window);
            Ok(())
        }
        #[cfg(not(windows))]
        {
            let _ = window;
            Err(WindowError::Unsupported {
                operation: "maximise",
            })
        }
    }

    fn geometry(&self, window: &TargetWindow) -> Result<Geometry, WindowError> {
        self.by_handle(window.handle)?
            .as_ref()
            .and_then(geometry_of)
            .ok_or_else(|| WindowError::Resolution {
                title: window.title.clone(),
            })
    }

    fn capture_region(&self, region: Geometry) -> Result<RgbaImage, WindowError> {
        let capture_err = |reason: String| WindowError::Enumeration { reason };

        let centre_x = region.left.saturating_add((region.width / 2) as i32);
        let centre_y = region.top.saturating_add((region.height / 2) as i32);
        let monitor = Monitor::from_point(centre_x, centre_y)
            .map_err(|e| capture_err(format!("no monitor at ({centre_x}, {centre_y}): {e}")))?;
        let origin_x = monitor.x().map_err(|e| capture_err(e.to_string()))?;
        let origin_y = monitor.y().map_err(|e| capture_err(e.to_string()))?;
        let screen = monitor
            .capture_image()
            .map_err(|e| capture_err(e.to_string()))?;

        let crop = clamp_to_screen(region, origin_x, origin_y, screen.width(), screen.height())
            .ok_or_else(|| capture_err("window lies outside its monitor".to_string()))?;
        Ok(image::imageops::crop_imm(
            &screen,
            crop.left as u32,
            crop.top as u32,
            crop.width,
            crop.height,
        )
        .to_image())
    }

    fn close(&self, window: &TargetWindow) -> Result<(), WindowError> {
        #[cfg(windows)]
        {
            win32::close(window)
        }
        #[cfg(not(windows))]
        {
            let _ = window;
            Err(WindowError::Unsupported { operation: "close" })
        }
    }
}

/// Intersect a screen-space `region` with a monitor image whose top-left
/// corner sits at (`origin_x`, `origin_y`). Returns monitor-local bounds.
fn clamp_to_screen(
    region: Geometry,
    origin_x: i32,
    origin_y: i32,
    screen_w: u32,
    screen_h: u32,
) -> Option<Geometry> {
    let left = i64::from(region.left) - i64::from(origin_x);
    let top = i64::from(region.top) - i64::from(origin_y);
    let right = (left + i64::from(region.width)).min(i64::from(screen_w));
    let bottom = (top + i64::from(region.height)).min(i64::from(screen_h));
    let left = left.max(0);
    let top = top.max(0);
    if right <= left || bottom <= top {
        return None;
    }
    Some(Geometry {
        left: left as i32,
        top: top as i32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    })
}

#[cfg(windows)]
mod win32 {
    use crate::core::model::{TargetWindow, WindowHandle};
    use crate::util::error::WindowError;
    use std::ffi::c_void;
    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::UI::WindowsAndMessaging::{
        GetForegroundWindow, PostMessageW, SetForegroundWindow, ShowWindow, SW_MAXIMIZE, WM_CLOSE,
    };

    fn hwnd(handle: WindowHandle) -> HWND {
        HWND(handle.0 as usize as *mut c_void)
    }

    pub fn is_foreground(handle: WindowHandle) -> bool {
        (unsafe { GetForegroundWindow() }) == hwnd(handle)
    }

    pub fn activate(window: &TargetWindow) -> Result<(), WindowError> {
        if unsafe { SetForegroundWindow(hwnd(window.handle)) }.as_bool() {
            Ok(())
        } else {
            Err(WindowError::Activation {
                title: window.title.clone(),
                reason: "SetForegroundWindow was refused".to_string(),
            })
        }
    }

    pub fn maximize(window: &TargetWindow) {
        // Return value is the previous visibility state, not an error.
        let _ = unsafe { ShowWindow(hwnd(window.handle), SW_MAXIMIZE) };
    }

    pub fn close(window: &TargetWindow) -> Result<(), WindowError> {
        unsafe { PostMessageW(Some(hwnd(window.handle)), WM_CLOSE, WPARAM(0), LPARAM(0)) }
            .map_err(|e| WindowError::CloseRequest {
                title: window.title.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(left: i32, top: i32, width: u32, height: u32) -> Geometry {
        Geometry {
            left,
            top,
            width,
            height,
        }
    }

    #[test]
    fn region_inside_monitor_is_unchanged() {
        assert_eq!(
            clamp_to_screen(g(100, 50, 300, 200), 0, 0, 1920, 1080),
            Some(g(100, 50, 300, 200))
        );
    }

    #[test]
    fn maximised_window_borders_are_trimmed() {
        // Maximised windows overhang the monitor by their frame width.
        assert_eq!(
            clamp_to_screen(g(-8, -8, 1936, 1056), 0, 0, 1920, 1080),
            Some(g(0, 0, 1920, 1048))
        );
    }

    #[test]
    fn secondary_monitor_coordinates_are_made_local() {
        assert_eq!(
            clamp_to_screen(g(2000, 100, 400, 300), 1920, 0, 1280, 1024),
            Some(g(80, 100, 400, 300))
        );
    }

    #[test]
    fn region_off_screen_is_rejected() {
        assert_eq!(clamp_to_screen(g(5000, 0, 10, 10), 0, 0, 1920, 1080), None);
    }
}
