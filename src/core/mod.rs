// FormSnap - core/mod.rs
//
// Core harness logic layer.
// OS access only through the `Desktop` and `ProcessTable` traits; the real
// implementations live in `platform`.
// Must NOT depend on: app or platform.

pub mod discovery;
pub mod model;
pub mod patch;
pub mod reaper;
pub mod report;
pub mod window;
