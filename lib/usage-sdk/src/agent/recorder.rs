use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::agent::batcher::{Batcher, FlushHandler};
use crate::agent::buffer::Buffered;
use crate::agent::builder::UsageRecorderBuilder;
use crate::agent::report::{
    ClientInfo, Execution, ExecutionError, Metadata, OperationMapRecord, Report, RequestOperation,
};
use crate::agent::sampling::SampleRate;
use crate::collector::OperationDefinition;
use crate::sender::SendReport;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RecorderError {
    #[error("expected sample rate to be 0 <= x <= 1, received {0}")]
    InvalidSampleRate(f64),
    #[error("send interval must be greater than zero")]
    InvalidSendInterval,
    #[error("max size must be greater than zero")]
    InvalidMaxSize,
    #[error("a send function is required")]
    MissingSender,
}

/// What happened to a completed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Recorded,
    SampledOut,
    /// The recorder was shut down before the execution completed.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLErrorInfo {
    pub message: String,
    #[serde(default)]
    pub path: Option<Vec<PathSegment>>,
}

/// Result of executing an operation, as seen by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub ok: bool,
    #[serde(default)]
    pub errors: Vec<GraphQLErrorInfo>,
}

impl ExecutionOutcome {
    pub fn ok() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
        }
    }

    fn into_execution(self, duration: std::time::Duration) -> Execution {
        let errors: Vec<ExecutionError> = self
            .errors
            .into_iter()
            .map(|error| ExecutionError {
                message: error.message,
                path: error.path.map(|segments| {
                    segments
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(".")
                }),
            })
            .collect();

        Execution {
            ok: self.ok && errors.is_empty(),
            duration: duration.as_nanos().try_into().unwrap_or(u64::MAX),
            errors_total: errors.len(),
            errors,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UsageItem {
    pub operation: Arc<OperationDefinition>,
    pub execution: Execution,
    pub client: Option<ClientInfo>,
}

pub(crate) struct ReportFlusher {
    pub sender: Arc<dyn SendReport>,
}

#[async_trait]
impl FlushHandler<UsageItem> for ReportFlusher {
    async fn on_flush(&self, items: Vec<Buffered<UsageItem>>) {
        let size = items.len();
        let report = assemble_report(items, unix_millis(SystemTime::now()));

        match self.sender.send(report).await {
            Ok(()) => debug!("reported {} operations", size),
            Err(e) => error!("failed to send usage report: {}", e),
        }
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis().try_into().unwrap_or(u64::MAX))
        .unwrap_or_default()
}

pub(crate) fn assemble_report(items: Vec<Buffered<UsageItem>>, now_ms: u64) -> Report {
    let mut report = Report {
        size: items.len(),
        map: HashMap::new(),
        operations: Vec::with_capacity(items.len()),
    };

    for Buffered { item, added_at } in items {
        let elapsed_ms: u64 = added_at.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        let operation = item.operation;

        report.operations.push(RequestOperation {
            operation_map_key: operation.key.clone(),
            timestamp: now_ms.saturating_sub(elapsed_ms),
            execution: item.execution,
            metadata: item.client.map(|client| Metadata {
                client: Some(client),
            }),
        });

        if let Entry::Vacant(e) = report.map.entry(operation.key.clone()) {
            e.insert(OperationMapRecord {
                operation: operation.operation.clone(),
                operation_name: operation.operation_name.clone(),
                fields: operation.fields.clone(),
            });
        }
    }

    report
}

struct RecorderInner {
    batcher: Batcher<UsageItem>,
    sample_rate: SampleRate,
}

/// Records executions of collected operations and reports them in batches.
///
/// Cloning is cheap, clones share the same buffer.
#[derive(Clone)]
pub struct UsageRecorder {
    inner: Arc<RecorderInner>,
}

impl UsageRecorder {
    pub fn builder() -> UsageRecorderBuilder {
        UsageRecorderBuilder::default()
    }

    pub(crate) fn new(batcher: Batcher<UsageItem>, sample_rate: SampleRate) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                batcher,
                sample_rate,
            }),
        }
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.inner.sample_rate
    }

    /// Starts timing an execution of `operation`.
    pub fn collect(
        &self,
        operation: Arc<OperationDefinition>,
        client: Option<ClientInfo>,
    ) -> PendingExecution {
        PendingExecution {
            recorder: self.clone(),
            operation,
            client,
            started_at: Instant::now(),
        }
    }

    /// Flushes every buffered execution. Executions completed afterwards are dropped.
    pub async fn dispose(&self) {
        self.inner.batcher.wait_for_all().await;
    }
}

/// An execution started with [`UsageRecorder::collect`], waiting for its outcome.
#[must_use = "an execution is only recorded once completed"]
pub struct PendingExecution {
    recorder: UsageRecorder,
    operation: Arc<OperationDefinition>,
    client: Option<ClientInfo>,
    started_at: Instant,
}

impl PendingExecution {
    pub async fn complete(self, outcome: ExecutionOutcome) -> RecordStatus {
        if !self.recorder.inner.sample_rate.should_include() {
            return RecordStatus::SampledOut;
        }

        let item = UsageItem {
            execution: outcome.into_execution(self.started_at.elapsed()),
            operation: self.operation,
            client: self.client,
        };

        match self.recorder.inner.batcher.add(item).await {
            Ok(()) => RecordStatus::Recorded,
            Err(e) => {
                error!("failed to record operation: {}", e);
                RecordStatus::Dropped
            }
        }
    }
}
