//! Core domain types
//!
//! These types are shared between the orchestrator (which persists analysis
//! records) and the runner (which builds and executes tool invocations).

pub mod analysis;
pub mod command;
