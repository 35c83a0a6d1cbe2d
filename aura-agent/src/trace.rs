//! Command trace events for diagnostics. A process-global flag gates
//! emission; subscribers receive events over a broadcast bus and the
//! aggregator keeps a bounded window of recent command timelines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

static COMMAND_TRACE_ENABLED: AtomicBool = AtomicBool::new(false);

static BUS: Lazy<broadcast::Sender<CommandTraceEvent>> = Lazy::new(|| {
    let (tx, _) = broadcast::channel(256);
    tx
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStage {
    Validation,
    Intent,
    FastPath,
    Fallback,
    Deferred,
    Placement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Started,
    Progress,
    Completed,
    Errored,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTraceEvent {
    pub execution_id: Uuid,
    pub stage: CommandStage,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub extra: Value,
}

impl CommandTraceEvent {
    pub fn begin(execution_id: Uuid, stage: CommandStage) -> Self {
        Self {
            execution_id,
            stage,
            status: StageStatus::Started,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            extra: Value::Null,
        }
    }

    pub fn finish(execution_id: Uuid, stage: CommandStage, status: StageStatus, ms: u64) -> Self {
        let finished = Utc::now();
        Self {
            execution_id,
            stage,
            status,
            started_at: finished - ChronoDuration::milliseconds(ms as i64),
            finished_at: Some(finished),
            duration_ms: Some(ms),
            extra: Value::Null,
        }
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }
}

pub fn enable_command_tracing() {
    COMMAND_TRACE_ENABLED.store(true, Ordering::SeqCst);
}

pub fn disable_command_tracing() {
    COMMAND_TRACE_ENABLED.store(false, Ordering::SeqCst);
}

pub fn command_tracing_enabled() -> bool {
    COMMAND_TRACE_ENABLED.load(Ordering::SeqCst)
}

/// Emit an event when tracing is on. With tracing off this is one atomic
/// load and nothing else.
pub fn emit_command_trace(event: CommandTraceEvent) {
    if !command_tracing_enabled() {
        return;
    }
    if let Err(err) = BUS.send(event) {
        debug!(error = %err, "no subscribers for command trace event");
    }
}

pub fn subscribe_command_traces() -> broadcast::Receiver<CommandTraceEvent> {
    BUS.subscribe()
}

/// Timeline of one command, assembled from its trace events.
#[derive(Debug, Clone)]
pub struct CommandTimeline {
    pub execution_id: Uuid,
    pub stages: HashMap<CommandStage, Vec<CommandTraceEvent>>,
    pub last_updated_at: DateTime<Utc>,
}

/// Collects trace events into per-command timelines with bounded
/// retention.
pub struct TraceAggregator {
    retention: ChronoDuration,
    timelines: Arc<RwLock<HashMap<Uuid, CommandTimeline>>>,
}

impl TraceAggregator {
    pub fn start(retention: Duration) -> (Arc<Self>, JoinHandle<()>) {
        let retention =
            ChronoDuration::from_std(retention).unwrap_or_else(|_| ChronoDuration::minutes(10));
        let aggregator = Arc::new(Self {
            retention,
            timelines: Arc::new(RwLock::new(HashMap::new())),
        });
        let task = {
            let agg = Arc::clone(&aggregator);
            tokio::spawn(async move {
                let mut rx = subscribe_command_traces();
                while let Ok(event) = rx.recv().await {
                    agg.ingest(event).await;
                }
            })
        };
        (aggregator, task)
    }

    async fn ingest(&self, event: CommandTraceEvent) {
        let mut timelines = self.timelines.write().await;
        let at = event.finished_at.unwrap_or(event.started_at);
        let entry = timelines
            .entry(event.execution_id)
            .or_insert_with(|| CommandTimeline {
                execution_id: event.execution_id,
                stages: HashMap::new(),
                last_updated_at: at,
            });
        entry.last_updated_at = at;
        entry.stages.entry(event.stage).or_default().push(event);

        if self.retention > ChronoDuration::zero() {
            let cutoff = Utc::now() - self.retention;
            timelines.retain(|_, t| t.last_updated_at >= cutoff);
        }
    }

    pub async fn snapshot(&self) -> Vec<CommandTimeline> {
        self.timelines.read().await.values().cloned().collect()
    }

    pub async fn clear(&self) {
        self.timelines.write().await.clear();
    }
}
