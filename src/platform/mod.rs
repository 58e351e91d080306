// FormSnap - platform/mod.rs
//
// Platform abstraction layer: the real implementations behind the core
// seams, plus configuration loading.
// Dependencies: core traits and model, directories, sysinfo, xcap, windows.
// Must NOT depend on: app.

pub mod command;
pub mod config;
pub mod desktop;
pub mod process;
