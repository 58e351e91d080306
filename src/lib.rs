// FormSnap - lib.rs
//
// Library entry point, exposing every module so integration tests can drive
// the harness with scripted collaborators.
//
// The CLI itself (argument parsing, prompts wiring, signal handling) lives in
// `main.rs` and is not part of the library surface.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
