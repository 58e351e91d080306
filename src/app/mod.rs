// FormSnap - app/mod.rs
//
// Application layer: run orchestration and interactive prompts.
// Dependencies: core layer, platform command runner.

pub mod prompt;
pub mod runner;
