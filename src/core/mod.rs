//! Core primitives for the closed-loop guard: configuration, persisted
//! state, the shell runner, manifest inspection, and the JSONL log sinks.

pub mod config;
pub mod error;
pub mod exec;
pub mod log;
pub mod manifest;
pub mod state;
pub mod time;
