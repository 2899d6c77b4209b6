use std::time::Duration;

/// Minimum steady-state rate, in tokens/minute.
pub const MIN_RATE_PER_MINUTE: f64 = 50.0;
/// Maximum steady-state rate, in tokens/minute.
pub const MAX_RATE_PER_MINUTE: f64 = 300.0;
/// Default burst capacity.
pub const DEFAULT_BURST: usize = 20;
/// Default steady-state rate, in tokens/minute.
pub const DEFAULT_RATE_PER_MINUTE: f64 = 200.0;
/// How often the adaptive adjustment loop re-evaluates the success window.
pub const ADJUSTMENT_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for [`crate::RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub(crate) burst: usize,
    pub(crate) initial_rate_per_minute: f64,
    pub(crate) min_rate_per_minute: f64,
    pub(crate) max_rate_per_minute: f64,
    pub(crate) adjustment_interval: Duration,
    pub(crate) adaptive_enabled: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            burst: DEFAULT_BURST,
            initial_rate_per_minute: DEFAULT_RATE_PER_MINUTE,
            min_rate_per_minute: MIN_RATE_PER_MINUTE,
            max_rate_per_minute: MAX_RATE_PER_MINUTE,
            adjustment_interval: ADJUSTMENT_INTERVAL,
            adaptive_enabled: true,
        }
    }
}

/// Builder for [`RateLimiterConfig`].
#[derive(Debug, Clone)]
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self {
            config: RateLimiterConfig::default(),
        }
    }
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with the documented defaults: burst 20, rate
    /// 200/min, bounds [50, 300]/min, adjustment every 60s.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the token bucket's burst capacity.
    pub fn burst(mut self, burst: usize) -> Self {
        self.config.burst = burst;
        self
    }

    /// Sets the initial steady-state rate, in tokens/minute.
    pub fn rate_per_minute(mut self, rate: f64) -> Self {
        self.config.initial_rate_per_minute = rate;
        self
    }

    /// Sets the adaptive rate's floor and ceiling, in tokens/minute.
    pub fn rate_bounds(mut self, min: f64, max: f64) -> Self {
        self.config.min_rate_per_minute = min;
        self.config.max_rate_per_minute = max;
        self
    }

    /// Overrides how often the adaptive loop re-evaluates its window.
    pub fn adjustment_interval(mut self, interval: Duration) -> Self {
        self.config.adjustment_interval = interval;
        self
    }

    /// Disables adaptive adjustment; the rate stays fixed at its initial
    /// value for the life of the limiter.
    pub fn adaptive(mut self, enabled: bool) -> Self {
        self.config.adaptive_enabled = enabled;
        self
    }

    /// Builds the final configuration.
    pub fn build(self) -> RateLimiterConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_documented_values() {
        let cfg = RateLimiterConfigBuilder::new().build();
        assert_eq!(cfg.burst, 20);
        assert_eq!(cfg.initial_rate_per_minute, 200.0);
        assert_eq!(cfg.min_rate_per_minute, 50.0);
        assert_eq!(cfg.max_rate_per_minute, 300.0);
        assert_eq!(cfg.adjustment_interval, Duration::from_secs(60));
        assert!(cfg.adaptive_enabled);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = RateLimiterConfigBuilder::new()
            .burst(40)
            .rate_per_minute(150.0)
            .rate_bounds(10.0, 500.0)
            .adaptive(false)
            .build();
        assert_eq!(cfg.burst, 40);
        assert_eq!(cfg.initial_rate_per_minute, 150.0);
        assert_eq!(cfg.min_rate_per_minute, 10.0);
        assert_eq!(cfg.max_rate_per_minute, 500.0);
        assert!(!cfg.adaptive_enabled);
    }
}
