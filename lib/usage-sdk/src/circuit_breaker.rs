use std::time::Duration;

use recloser::{AsyncRecloser, Recloser};

/// Configures the breaker guarding report delivery, so an unavailable endpoint
/// is not hammered with every flush.
#[derive(Debug, Clone)]
pub struct CircuitBreakerBuilder {
    error_threshold: f32,
    volume_threshold: usize,
    reset_timeout: Duration,
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        Self {
            error_threshold: 0.5,
            volume_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CircuitBreakerError {
    #[error("invalid error threshold: {0}, it must be between 0.0 and 1.0")]
    InvalidErrorThreshold(f32),
}

impl CircuitBreakerBuilder {
    /// Failure rate that opens the breaker.
    /// Default: .5
    pub fn error_threshold(mut self, percentage: f32) -> Self {
        self.error_threshold = percentage;
        self
    }
    /// Number of sends observed before the failure rate is evaluated.
    /// Default: 5
    pub fn volume_threshold(mut self, threshold: usize) -> Self {
        self.volume_threshold = threshold;
        self
    }
    /// How long an open breaker rejects sends before letting one through.
    /// Default: 30s
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn build_async(self) -> Result<AsyncRecloser, CircuitBreakerError> {
        if !(0.0..=1.0).contains(&self.error_threshold) {
            return Err(CircuitBreakerError::InvalidErrorThreshold(
                self.error_threshold,
            ));
        }

        let recloser = Recloser::custom()
            .error_rate(self.error_threshold)
            .closed_len(self.volume_threshold)
            .open_wait(self.reset_timeout)
            .build();

        Ok(AsyncRecloser::from(recloser))
    }
}
