//! Data Transfer Objects
//!
//! Request payloads accepted by the orchestrator's HTTP surface.

pub mod analysis;
