use std::time::Duration;

use crate::keys::KeyPool;

/// Lower bound for the cooldown; throttling is never disabled entirely.
pub const HEAT_FLOOR_SECS: f64 = 1.0;
/// Upper bound so repeated overloads can't push the pipeline into hour-long sleeps.
pub const HEAT_CEILING_SECS: f64 = 90.0;
const HEAT_START_SECS: f64 = 2.0;

/// Shared resilience state for every generative/search call: the credential
/// cursor and the adaptive cooldown ("heat"). One context is shared by all
/// callers of the executor, so every caller observes every other caller's
/// failures, acting as a shared circuit-breaker. Constructed explicitly and
/// injected, so tests can build isolated contexts.
#[derive(Debug)]
pub struct ResilienceContext {
    heat_secs: f64,
    pub keys: KeyPool,
}

impl ResilienceContext {
    pub fn new(keys: KeyPool) -> Self {
        Self {
            heat_secs: HEAT_START_SECS,
            keys,
        }
    }

    /// Current proactive-throttle duration applied before each dispatch.
    pub fn heat(&self) -> Duration {
        Duration::from_secs_f64(self.heat_secs)
    }

    /// Service-overload signal: back off substantially so subsequent calls
    /// self-throttle harder.
    pub fn overheat(&mut self) {
        self.heat_secs = (self.heat_secs * 2.0 + 5.0).min(HEAT_CEILING_SECS);
    }

    /// Success signal: relax the throttle, floored so it never reaches zero.
    pub fn cool_down(&mut self) {
        self.heat_secs = (self.heat_secs * 0.5).max(HEAT_FLOOR_SECS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overheat_is_monotonic_up_to_ceiling() {
        let mut ctx = ResilienceContext::new(KeyPool::new(vec!["k".into()]));
        let mut last = ctx.heat();
        for _ in 0..10 {
            ctx.overheat();
            assert!(ctx.heat() >= last, "heat must be non-decreasing under overload");
            last = ctx.heat();
        }
        assert_eq!(ctx.heat(), Duration::from_secs_f64(HEAT_CEILING_SECS));
    }

    #[test]
    fn cool_down_never_drops_below_floor() {
        let mut ctx = ResilienceContext::new(KeyPool::new(vec!["k".into()]));
        ctx.overheat();
        let hot = ctx.heat();
        ctx.cool_down();
        assert!(ctx.heat() < hot, "success must relax the throttle");
        for _ in 0..20 {
            ctx.cool_down();
        }
        assert_eq!(ctx.heat(), Duration::from_secs_f64(HEAT_FLOOR_SECS));
    }
}
