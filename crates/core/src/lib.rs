//! # Signalchain Core
//!
//! The chain behind Signalchain: five model-backed stages that turn raw
//! market intel into insights, actions and drafted outreach.
//!
//! ## Architecture
//!
//! - `agents/` - stage runtime plus the Scout, Analyst, Strategist, Composer and Auditor
//! - `generator/` - text generation against OpenAI and Gemini
//! - `models/` - provider and model configuration
//! - `state/` - SQLite storage for items, runs and stage outputs
//! - `swarm/` - message bus and the pipeline worker
//! - `config` - runtime directory and `config.json`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use signalchain_core::{config::PipelineConfig, generator::Generators, state::IntelDb};
//! use signalchain_core::swarm::{MessageBus, PipelineWorker, UuidIds};
//!
//! let config = PipelineConfig::load().await?;
//! let db = IntelDb::open_at(config.db_path())?;
//! let generators = Generators::from_env(config.request_timeout())?;
//! let bus = MessageBus::standard(config.stage_configs(), &generators, Arc::new(UuidIds));
//! let worker = PipelineWorker::new(&db, Arc::new(bus), config.worker_config());
//! let batch = worker.process_unprocessed_items(None).await;
//! ```

pub mod agents;
pub mod config;
pub mod generator;
pub mod models;
pub mod state;
pub mod swarm;

#[cfg(test)]
pub(crate) mod testing;
