//! # Message Bus
//!
//! Routing table of stages plus the linear pipeline driver.
//!
//! ```text
//! seed ──▶ Scout ──▶ Analyst ──▶ Strategist ──▶ Composer ──▶ Auditor (terminal)
//!            │ None      │ None        │ None          │ None
//!            └───────────┴─────────────┴───────────────┴──▶ stall: stop, keep what was produced
//! ```
//!
//! Every routed message is kept in a bounded in-memory log so a whole
//! trace can be replayed with [`MessageBus::get_trace`].

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::ids::IdSource;
use super::message::Message;
use crate::agents::{Stage, StageConfig, StageKind};
use crate::generator::{GenerateError, Generators};

/// Default number of messages kept in the log
pub const DEFAULT_LOG_CAPACITY: usize = 1_000;

/// A stage call failed with an unexpected generator error
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageFailure {
    pub stage: StageKind,
    #[source]
    pub source: GenerateError,
}

/// A pipeline run stopped on a [`StageFailure`]
#[derive(Debug, Error)]
#[error("pipeline {trace_id} aborted after {} message(s): {failure}", .produced.len())]
pub struct PipelineAborted {
    pub trace_id: String,
    /// Messages produced before the failure, in order
    pub produced: Vec<Message>,
    #[source]
    pub failure: StageFailure,
}

pub struct MessageBus {
    stages: HashMap<StageKind, Stage>,
    ids: Arc<dyn IdSource>,
    log: Mutex<VecDeque<Message>>,
    log_capacity: usize,
}

impl MessageBus {
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self {
            stages: HashMap::new(),
            ids,
            log: Mutex::new(VecDeque::new()),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }

    /// Cap the message log; the oldest messages are evicted first
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    /// Bus with one stage per config, each bound to its provider's generator
    pub fn standard(
        configs: impl IntoIterator<Item = StageConfig>,
        generators: &Generators,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        let mut bus = Self::new(Arc::clone(&ids));
        for config in configs {
            let kind = config.kind;
            let generator = generators.for_provider(config.model.provider);
            bus.register(kind, Stage::new(config, generator, Arc::clone(&ids)));
        }
        bus
    }

    /// Add a stage to the routing table, replacing any stage under `id`
    pub fn register(&mut self, id: StageKind, stage: Stage) {
        if self.stages.insert(id, stage).is_some() {
            tracing::debug!(stage = %id, "Replaced registered stage");
        }
    }

    /// Registered stage ids in chain order
    pub fn stage_ids(&self) -> Vec<StageKind> {
        let mut ids: Vec<_> = self.stages.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Route one message to its addressed stage.
    ///
    /// Returns `Ok(None)` when no stage is registered under `message.to` or
    /// the stage stalled.
    pub async fn send(&self, message: &Message) -> Result<Option<Message>, StageFailure> {
        self.record(message);
        self.dispatch(message).await
    }

    async fn dispatch(&self, message: &Message) -> Result<Option<Message>, StageFailure> {
        let Some(stage) = self.stages.get(&message.to) else {
            tracing::warn!(
                stage = %message.to,
                trace_id = %message.trace_id,
                "No stage registered, dropping message"
            );
            return Ok(None);
        };

        tracing::debug!(
            from = %message.from,
            to = %message.to,
            agent = %stage.config().display_name,
            kind = message.kind.as_str(),
            message_id = %message.id,
            trace_id = %message.trace_id,
            "Routing message"
        );

        match stage.process(message).await {
            Ok(Some(reply)) => {
                self.record(&reply);
                Ok(Some(reply))
            }
            Ok(None) => Ok(None),
            Err(source) => Err(StageFailure {
                stage: message.to,
                source,
            }),
        }
    }

    /// Run the chain from `start` until the Auditor answers or a stage stalls.
    ///
    /// Returns every produced message in order; empty if the first stage
    /// stalled. On a stage failure the messages produced so far travel in
    /// the error.
    pub async fn run_pipeline(
        &self,
        payload: Value,
        start: StageKind,
    ) -> Result<Vec<Message>, PipelineAborted> {
        let trace_id = self.ids.next_id();
        let seed = Message::seed(self.ids.next_id(), trace_id.clone(), start, payload);
        tracing::debug!(trace_id = %trace_id, start = %start, "Pipeline started");
        self.record(&seed);

        let mut produced: Vec<Message> = Vec::new();
        let mut current = seed;

        loop {
            match self.dispatch(&current).await {
                Ok(Some(reply)) => {
                    let terminal = reply.from.is_terminal();
                    produced.push(reply.clone());
                    if terminal {
                        break;
                    }
                    current = reply;
                }
                Ok(None) => {
                    tracing::info!(
                        trace_id = %trace_id,
                        stalled_at = %current.to,
                        produced = produced.len(),
                        "Pipeline stalled"
                    );
                    break;
                }
                Err(failure) => {
                    return Err(PipelineAborted {
                        trace_id,
                        produced,
                        failure,
                    })
                }
            }
        }

        Ok(produced)
    }

    /// Every logged message with this trace id, oldest first
    pub fn get_trace(&self, trace_id: &str) -> Vec<Message> {
        match self.log.lock() {
            Ok(log) => log
                .iter()
                .filter(|m| m.trace_id == trace_id)
                .cloned()
                .collect(),
            Err(e) => {
                tracing::error!("Message log lock poisoned: {}", e);
                Vec::new()
            }
        }
    }

    /// Number of messages currently logged
    pub fn log_len(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or(0)
    }

    fn record(&self, message: &Message) {
        let Ok(mut log) = self.log.lock() else {
            tracing::error!("Message log lock poisoned, message not recorded");
            return;
        };
        while log.len() >= self.log_capacity {
            log.pop_front();
        }
        log.push_back(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::SequentialIds;
    use crate::testing::{full_chain, Scripted, ScriptedGenerator, SCOUT_REPLY};
    use serde_json::json;

    fn bus_with(generator: Arc<ScriptedGenerator>) -> MessageBus {
        let generators = Generators::uniform(generator);
        MessageBus::standard(
            StageKind::all().map(|k| k.default_config()),
            &generators,
            Arc::new(SequentialIds::new("id")),
        )
    }

    fn blob() -> Value {
        json!({"rawContent": "Title: Hospital expansion", "source": "feed"})
    }

    #[tokio::test]
    async fn test_full_chain_runs_to_auditor() {
        let generator = Arc::new(ScriptedGenerator::new(full_chain()));
        let bus = bus_with(Arc::clone(&generator));

        let produced = bus.run_pipeline(blob(), StageKind::Scout).await.unwrap();

        let from: Vec<_> = produced.iter().map(|m| m.from).collect();
        assert_eq!(from, StageKind::all().to_vec());
        assert_eq!(generator.calls().len(), 5);

        // id-1 is the trace, id-2 the seed
        assert!(produced.iter().all(|m| m.trace_id == "id-1"));
        assert_eq!(produced[0].parent_message_id.as_deref(), Some("id-2"));
        for pair in produced.windows(2) {
            assert_eq!(pair[1].parent_message_id.as_deref(), Some(pair[0].id.as_str()));
        }
        assert_eq!(produced[4].to, StageKind::Scout);
    }

    #[tokio::test]
    async fn test_stall_halts_chain() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Scripted::reply(SCOUT_REPLY),
            Scripted::reply("no json here"),
        ]));
        let bus = bus_with(Arc::clone(&generator));

        let produced = bus.run_pipeline(blob(), StageKind::Scout).await.unwrap();
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].from, StageKind::Scout);
        // Strategist was never asked
        assert_eq!(generator.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_scout_produces_nothing() {
        let generator = Arc::new(ScriptedGenerator::new(vec![]));
        let bus = bus_with(Arc::clone(&generator));

        let produced = tokio_test::assert_ok!(bus.run_pipeline(blob(), StageKind::Scout).await);
        assert!(produced.is_empty());
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_carries_produced_prefix() {
        let mut script = full_chain();
        script.truncate(3);
        script.push(Scripted::Fail);
        let bus = bus_with(Arc::new(ScriptedGenerator::new(script)));

        let aborted = bus
            .run_pipeline(blob(), StageKind::Scout)
            .await
            .unwrap_err();
        assert_eq!(aborted.failure.stage, StageKind::Composer);
        assert_eq!(aborted.produced.len(), 3);
        assert!(aborted.produced.iter().all(|m| m.trace_id == aborted.trace_id));
        assert!(aborted.to_string().contains("composer stage failed"));
    }

    #[tokio::test]
    async fn test_unknown_stage_returns_none() {
        let bus = MessageBus::new(Arc::new(SequentialIds::new("id")));
        let message = Message::seed("m".into(), "t".into(), StageKind::Analyst, json!({}));
        assert!(bus.send(&message).await.unwrap().is_none());
        assert_eq!(bus.get_trace("t").len(), 1);
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let ids: Arc<dyn IdSource> = Arc::new(SequentialIds::new("id"));
        let first = Arc::new(ScriptedGenerator::new(vec![]));
        let second = Arc::new(ScriptedGenerator::new(vec![Scripted::reply(SCOUT_REPLY)]));

        let mut bus = MessageBus::new(Arc::clone(&ids));
        let config = StageKind::Scout.default_config();
        bus.register(
            StageKind::Scout,
            Stage::new(config.clone(), first.clone(), Arc::clone(&ids)),
        );
        bus.register(
            StageKind::Scout,
            Stage::new(config, second.clone(), Arc::clone(&ids)),
        );
        assert_eq!(bus.stage_ids(), vec![StageKind::Scout]);

        let produced = bus.run_pipeline(blob(), StageKind::Scout).await.unwrap();
        assert_eq!(produced.len(), 1);
        assert!(first.calls().is_empty());
        assert_eq!(second.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_get_trace_separates_runs() {
        let generator = Arc::new(
            ScriptedGenerator::new(vec![Scripted::reply(SCOUT_REPLY)])
                .with_fallback(Scripted::NotConfigured),
        );
        let bus = bus_with(generator);

        let first = bus.run_pipeline(blob(), StageKind::Scout).await.unwrap();
        let second = bus.run_pipeline(blob(), StageKind::Scout).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());

        // seed + scout reply
        let trace = bus.get_trace(&first[0].trace_id);
        assert_eq!(trace.len(), 2);
        assert!(trace[0].parent_message_id.is_none());
        assert_eq!(trace[1].id, first[0].id);
    }

    #[tokio::test]
    async fn test_log_is_bounded() {
        let generator = Arc::new(ScriptedGenerator::new(full_chain()));
        let bus = bus_with(generator).with_log_capacity(3);

        let produced = bus.run_pipeline(blob(), StageKind::Scout).await.unwrap();
        assert_eq!(bus.log_len(), 3);
        let trace = bus.get_trace(&produced[0].trace_id);
        assert_eq!(trace.last().map(|m| m.from), Some(StageKind::Auditor));
    }
}
