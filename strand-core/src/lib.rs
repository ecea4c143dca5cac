//! Strand Core
//!
//! Core types shared by the Strand genomic analysis services.
//!
//! This crate contains:
//! - Domain types: analysis records and external-tool command descriptors/results
//! - DTOs: request payloads consumed by the orchestrator

pub mod domain;
pub mod dto;
