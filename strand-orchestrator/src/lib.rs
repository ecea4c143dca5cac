//! Strand Orchestrator
//!
//! Tracks variant-calling analyses and runs each one through the
//! calling, filtering and annotation stages in the background.
//!
//! Architecture:
//! - Repository: analysis records and sample lookups (Postgres or in-memory)
//! - Service: the analysis state machine and background dispatch
//! - API: a thin HTTP surface over the service

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
