//! Tick-counted timers.
//!
//! Timers count control ticks, never wall time: each one is decremented
//! exactly once per tick so tuning constants keep their meaning at any
//! loop rate. Durations are converted with the half-rate convention of
//! the field computer, `ticks = hz / 2 * seconds`.

use serde::{Deserialize, Serialize};

use crate::config::EngineError;

/// Slack absorbed before rounding so that `5.0 * 2.0` stays 10 ticks.
const ROUNDING_SLACK: f64 = 1e-9;

/// Control loop rate in ticks per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickRate {
    hz: f64,
}

impl TickRate {
    /// Create a tick rate.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `hz` is not positive and finite.
    pub fn new(hz: f64) -> Result<Self, EngineError> {
        if hz.is_finite() && hz > 0.0 {
            Ok(Self { hz })
        } else {
            Err(EngineError::InvalidConfig(format!(
                "tick rate must be positive, got {hz}"
            )))
        }
    }

    /// Ticks per second.
    #[must_use]
    pub const fn hz(self) -> f64 {
        self.hz
    }

    /// Duration of one tick in seconds.
    #[must_use]
    pub fn period_secs(self) -> f64 {
        self.hz.recip()
    }

    /// Half-rate tick count for `secs`, rounded up.
    #[must_use]
    pub fn ticks_ceil(self, secs: f64) -> u32 {
        to_ticks((self.hz * 0.5 * secs - ROUNDING_SLACK).ceil())
    }

    /// Half-rate tick count for `secs`, truncated.
    #[must_use]
    pub fn ticks_floor(self, secs: f64) -> u32 {
        to_ticks((self.hz * 0.5 * secs + ROUNDING_SLACK).floor())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_ticks(value: f64) -> u32 {
    // Saturating float-to-int cast; negatives and NaN become zero.
    value.max(0.0) as u32
}

/// A countdown measured in control ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TicksRemaining(u32);

impl TicksRemaining {
    /// A timer that has already run out.
    pub const EXPIRED: Self = Self(0);

    /// Start a countdown of `ticks`.
    #[must_use]
    pub const fn new(ticks: u32) -> Self {
        Self(ticks)
    }

    /// Start a countdown of `secs` at `rate`, rounded up to whole ticks.
    #[must_use]
    pub fn from_secs(rate: TickRate, secs: f64) -> Self {
        Self(rate.ticks_ceil(secs))
    }

    /// Ticks left before expiry.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether the countdown has reached zero.
    #[must_use]
    pub const fn is_expired(self) -> bool {
        self.0 == 0
    }

    /// Consume one tick. Saturates at zero.
    pub const fn tick(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    /// Force the timer to zero.
    pub const fn clear(&mut self) {
        self.0 = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_rate() {
        assert!(TickRate::new(0.0).is_err());
        assert!(TickRate::new(-5.0).is_err());
        assert!(TickRate::new(f64::INFINITY).is_err());
    }

    #[test]
    fn half_rate_conversion() {
        let rate = TickRate::new(10.0).unwrap();
        assert_eq!(rate.ticks_ceil(2.0), 10);
        assert_eq!(rate.ticks_floor(2.0), 10);
        assert_eq!(rate.ticks_ceil(0.25), 2);
        assert_eq!(rate.ticks_floor(0.25), 1);
        assert_eq!(rate.ticks_ceil(0.0), 0);
    }

    #[test]
    fn odd_rate_rounds_up() {
        let rate = TickRate::new(5.0).unwrap();
        // 2.5 * 1.0 = 2.5 ticks.
        assert_eq!(TicksRemaining::from_secs(rate, 1.0).get(), 3);
    }

    #[test]
    fn countdown_saturates() {
        let mut t = TicksRemaining::new(2);
        assert!(!t.is_expired());
        t.tick();
        t.tick();
        assert!(t.is_expired());
        t.tick();
        assert_eq!(t, TicksRemaining::EXPIRED);
    }

    #[test]
    fn clear_expires() {
        let mut t = TicksRemaining::new(7);
        t.clear();
        assert!(t.is_expired());
    }
}
