//! Service Module
//!
//! Business logic layer for the orchestrator.
//! The analysis service owns the record state machine and sequences the
//! pipeline stages; dispatch and clock seams keep it deterministic in tests.

pub mod analysis;
pub mod clock;
pub mod dispatch;

pub use analysis::{AnalysisError, AnalysisService, AnalysisSettings};
pub use clock::{Clock, SystemClock};
pub use dispatch::{BoxedTask, ManualDispatcher, TaskDispatcher, TokioDispatcher};
