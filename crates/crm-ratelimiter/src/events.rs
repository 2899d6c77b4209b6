use std::time::{Duration, Instant};

use crm_core::PipelineEvent;

/// Events emitted by [`crate::RateLimiter`].
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A caller acquired a token after waiting `waited`.
    PermitAcquired { waited: Duration, timestamp: Instant },
    /// A caller's deadline elapsed before a token became available.
    PermitRejected { deadline: Duration, timestamp: Instant },
    /// The adaptive loop changed the steady-state rate.
    RateAdjusted {
        from_per_minute: f64,
        to_per_minute: f64,
        timestamp: Instant,
    },
}

impl RateLimiterEvent {
    pub(crate) fn permit_acquired(waited: Duration) -> Self {
        RateLimiterEvent::PermitAcquired {
            waited,
            timestamp: Instant::now(),
        }
    }

    pub(crate) fn permit_rejected(deadline: Duration) -> Self {
        RateLimiterEvent::PermitRejected {
            deadline,
            timestamp: Instant::now(),
        }
    }

    pub(crate) fn rate_adjusted(from_per_minute: f64, to_per_minute: f64) -> Self {
        RateLimiterEvent::RateAdjusted {
            from_per_minute,
            to_per_minute,
            timestamp: Instant::now(),
        }
    }
}

impl PipelineEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::PermitAcquired { .. } => "permit_acquired",
            RateLimiterEvent::PermitRejected { .. } => "permit_rejected",
            RateLimiterEvent::RateAdjusted { .. } => "rate_adjusted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::PermitAcquired { timestamp, .. } => *timestamp,
            RateLimiterEvent::PermitRejected { timestamp, .. } => *timestamp,
            RateLimiterEvent::RateAdjusted { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        "rate_limiter"
    }
}
