use std::{sync::Arc, time::Duration};

use crate::agent::batcher::{Batcher, BatcherOptions};
use crate::agent::recorder::{RecorderError, ReportFlusher, UsageRecorder};
use crate::agent::sampling::SampleRate;
use crate::sender::SendReport;

pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_SIZE: usize = 25;

pub struct UsageRecorderBuilder {
    sample_rate: f64,
    send_interval: Duration,
    max_size: usize,
    sender: Option<Arc<dyn SendReport>>,
}

impl Default for UsageRecorderBuilder {
    fn default() -> Self {
        Self {
            sample_rate: 1.0,
            send_interval: DEFAULT_SEND_INTERVAL,
            max_size: DEFAULT_MAX_SIZE,
            sender: None,
        }
    }
}

impl UsageRecorderBuilder {
    /// Share of completed executions to report, between 0.0 and 1.0.
    /// Default: 1.0
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }
    /// Frequency of sending the buffered executions
    /// Default: 5 seconds
    pub fn send_interval(mut self, send_interval: Duration) -> Self {
        self.send_interval = send_interval;
        self
    }
    /// A maximum number of executions to hold in a buffer before sending
    /// Default: 25
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
    /// Receives every assembled report.
    pub fn sender<S>(mut self, sender: S) -> Self
    where
        S: SendReport + 'static,
    {
        self.sender = Some(Arc::new(sender));
        self
    }
    pub fn shared_sender(mut self, sender: Arc<dyn SendReport>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Validates the configuration and starts the flush interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<UsageRecorder, RecorderError> {
        let sample_rate = SampleRate::new(self.sample_rate)?;

        if self.send_interval.is_zero() {
            return Err(RecorderError::InvalidSendInterval);
        }
        if self.max_size == 0 {
            return Err(RecorderError::InvalidMaxSize);
        }
        let sender = self.sender.ok_or(RecorderError::MissingSender)?;

        let batcher = Batcher::start(
            BatcherOptions {
                max_items: self.max_size,
                max_elapsed: self.send_interval,
            },
            Arc::new(ReportFlusher { sender }),
        );

        Ok(UsageRecorder::new(batcher, sample_rate))
    }
}
