//! # Swarm Orchestration
//!
//! Moves intel through the five-stage chain and persists the result.
//!
//! ## Pipeline Flow
//!
//! ```text
//! intel item → Scout → Analyst → Strategist → Composer → Auditor
//! ```
//!
//! - `message` - the envelope passed between stages
//! - `bus` - routing table, pipeline driver and message log
//! - `worker` - item selection, run bookkeeping and batching

pub mod bus;
pub mod ids;
pub mod message;
pub mod worker;

pub use bus::{MessageBus, PipelineAborted, StageFailure, DEFAULT_LOG_CAPACITY};
pub use ids::{IdSource, SequentialIds, UuidIds};
pub use message::{Message, MessageKind};
pub use worker::{
    BatchResult, ItemOutcome, PipelineResult, PipelineWorker, ProcessedQuery, WorkerConfig,
};
