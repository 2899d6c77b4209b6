use std::sync::Arc;
use std::time::Duration;

use crm_core::EventListeners;

use crate::backoff::{ExponentialJitterBackoff, IntervalFunction, QuotaFloorBackoff};
use crate::events::RetryEvent;

/// Default max attempts, including the initial one.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;
/// Chosen base interval for transport/timeout backoff. Not specified by name
/// in the source; 500ms keeps a 5-attempt run under ~16s worst case before
/// jitter, which fits comfortably inside typical CLI timeouts.
pub const DEFAULT_TRANSPORT_BASE: Duration = Duration::from_millis(500);
pub const DEFAULT_JITTER_FACTOR: f64 = 0.25;
/// Timeout retries use the same exponential shape as transport errors but
/// with a larger base, since a timed-out call is more likely to time out
/// again immediately.
pub const DEFAULT_TIMEOUT_BASE_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_QUOTA_FLOOR: Duration = Duration::from_secs(30);
pub const DEFAULT_QUOTA_JITTER_FACTOR: f64 = 0.5;

/// Configuration for [`crate::RetryEngine`].
pub struct RetryConfig {
    pub(crate) max_attempts: usize,
    pub(crate) transport_backoff: Arc<dyn IntervalFunction>,
    pub(crate) timeout_backoff: Arc<dyn IntervalFunction>,
    pub(crate) quota_backoff: Arc<dyn IntervalFunction>,
    pub(crate) listeners: EventListeners<RetryEvent>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfigBuilder::new().build()
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder {
    max_attempts: usize,
    transport_base: Duration,
    jitter_factor: f64,
    timeout_base_multiplier: f64,
    quota_floor: Duration,
    quota_jitter_factor: f64,
    max_interval: Option<Duration>,
    listeners: EventListeners<RetryEvent>,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    /// Defaults: 5 max attempts, 500ms base with ±25% jitter for transport
    /// errors, a 2x base for timeouts, a 30s floor with ±50% jitter for
    /// quota errors.
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            transport_base: DEFAULT_TRANSPORT_BASE,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            timeout_base_multiplier: DEFAULT_TIMEOUT_BASE_MULTIPLIER,
            quota_floor: DEFAULT_QUOTA_FLOOR,
            quota_jitter_factor: DEFAULT_QUOTA_JITTER_FACTOR,
            max_interval: None,
            listeners: EventListeners::new(),
        }
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn transport_base(mut self, base: Duration) -> Self {
        self.transport_base = base;
        self
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    pub fn timeout_base_multiplier(mut self, multiplier: f64) -> Self {
        self.timeout_base_multiplier = multiplier;
        self
    }

    pub fn quota_floor(mut self, floor: Duration) -> Self {
        self.quota_floor = floor;
        self
    }

    pub fn quota_jitter_factor(mut self, factor: f64) -> Self {
        self.quota_jitter_factor = factor;
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.listeners.add(crm_core::FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.listeners.add(crm_core::FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    pub fn build(self) -> RetryConfig {
        let mut transport_backoff =
            ExponentialJitterBackoff::new(self.transport_base, self.jitter_factor);
        let mut timeout_backoff = ExponentialJitterBackoff::new(
            self.transport_base.mul_f64(self.timeout_base_multiplier),
            self.jitter_factor,
        );
        if let Some(max) = self.max_interval {
            transport_backoff = transport_backoff.max_interval(max);
            timeout_backoff = timeout_backoff.max_interval(max);
        }

        RetryConfig {
            max_attempts: self.max_attempts,
            transport_backoff: Arc::new(transport_backoff),
            timeout_backoff: Arc::new(timeout_backoff),
            quota_backoff: Arc::new(QuotaFloorBackoff::new(
                self.quota_floor,
                self.quota_jitter_factor,
            )),
            listeners: self.listeners,
        }
    }
}
