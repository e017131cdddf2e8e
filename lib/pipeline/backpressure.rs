use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::info;

/// External backpressure policy.
///
/// Returns how long the whole pipeline should pause before continuing; zero means proceed.
pub trait Governor: Send + Sync {
    fn govern(&self) -> Duration;
}

/// Stock governor: admits at most `rate` loop iterations per second and asks for a pause
/// until the next admission otherwise.
pub struct QuotaGovernor {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    clock: DefaultClock,
}

impl QuotaGovernor {
    pub fn per_second(rate: NonZeroU32) -> Self {
        let clock = DefaultClock::default();
        Self {
            limiter: RateLimiter::direct_with_clock(Quota::per_second(rate), &clock),
            clock,
        }
    }
}

impl Governor for QuotaGovernor {
    fn govern(&self) -> Duration {
        match self.limiter.check() {
            Ok(()) => Duration::ZERO,
            Err(not_until) => not_until.wait_time_from(self.clock.now()),
        }
    }
}

/// Consulted once per executor loop iteration when backpressure is enabled for the run.
#[derive(Clone, Default)]
pub struct BackpressureGate {
    governor: Option<Arc<dyn Governor>>,
}

impl BackpressureGate {
    pub fn disabled() -> Self {
        Self { governor: None }
    }

    pub fn enabled(governor: Arc<dyn Governor>) -> Self {
        Self {
            governor: Some(governor),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.governor.is_some()
    }

    /// Asks the governor for a pause and sleeps for it. Returns the pause applied.
    pub async fn check(&self) -> Duration {
        let Some(governor) = &self.governor else {
            return Duration::ZERO;
        };

        let pause = governor.govern();
        if !pause.is_zero() {
            info!(
                event = "governor_pause",
                pause_ms = pause.as_millis() as u64,
                "Pausing for {:.3} secs, governor has triggered...",
                pause.as_secs_f64()
            );
            tokio::time::sleep(pause).await;
        }
        pause
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use nonzero_ext::nonzero;

    use super::{BackpressureGate, Governor, QuotaGovernor};
    use crate::pipeline::test_support::ScriptedGovernor;

    #[tokio::test]
    async fn disabled_gate_never_pauses() {
        let gate = BackpressureGate::disabled();
        assert!(!gate.is_enabled());
        assert_eq!(gate.check().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn gate_sleeps_for_governor_pause() {
        let governor = Arc::new(ScriptedGovernor::new(vec![
            Duration::from_millis(30),
            Duration::ZERO,
        ]));
        let gate = BackpressureGate::enabled(governor.clone());

        let started = Instant::now();
        assert_eq!(gate.check().await, Duration::from_millis(30));
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(gate.check().await, Duration::ZERO);
        assert_eq!(governor.calls(), 2);
    }

    #[test]
    fn quota_governor_asks_for_pause_once_burst_is_spent() {
        let governor = QuotaGovernor::per_second(nonzero!(1u32));

        assert_eq!(governor.govern(), Duration::ZERO);
        let pause = governor.govern();
        assert!(pause > Duration::ZERO);
        assert!(pause <= Duration::from_secs(1));
    }
}
