//! Reputation table, delivery timing bands and end-of-run scoring
use serde::{Deserialize, Serialize};
use std::fmt;

pub const STARTING_REPUTATION: i32 = 70;
pub const MAX_REPUTATION: i32 = 100;
/// Reputation below this ends the run.
pub const LOSS_THRESHOLD: i32 = 20;
/// Reputation at or above this earns the payout and score bonus.
pub const BONUS_THRESHOLD: i32 = 90;
/// Reputation at or above this softens the first late delivery of a session.
pub const MITIGATION_THRESHOLD: i32 = 85;
pub const BONUS_MULTIPLIER: f64 = 1.05;
/// Fraction of the delivery window that must remain for an early delivery.
pub const EARLY_RATIO: f64 = 0.20;
pub const CANCEL_PENALTY: i32 = -4;
pub const EXPIRED_PENALTY: i32 = -6;
pub const STREAK_LENGTH: u8 = 3;
pub const STREAK_BONUS: i32 = 2;

/// Timing band of a completed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryTiming {
    Early,
    OnTime,
    /// Up to 30 seconds late.
    LateMinor,
    /// 31 to 120 seconds late.
    LateMajor,
    /// More than 120 seconds late.
    LateSevere,
}

impl DeliveryTiming {
    /// Band a delivery by its lateness (negative when early) and the time window it had.
    #[must_use]
    pub fn from_lateness(lateness: f64, window: f64) -> Self {
        if lateness > 0.0 {
            if lateness <= 30.0 {
                Self::LateMinor
            } else if lateness <= 120.0 {
                Self::LateMajor
            } else {
                Self::LateSevere
            }
        } else if window > 0.0 && -lateness / window >= EARLY_RATIO {
            Self::Early
        } else {
            Self::OnTime
        }
    }

    #[must_use]
    pub const fn is_late(self) -> bool {
        matches!(self, Self::LateMinor | Self::LateMajor | Self::LateSevere)
    }

    #[must_use]
    pub const fn base_delta(self) -> i32 {
        match self {
            Self::Early => 5,
            Self::OnTime => 3,
            Self::LateMinor => -2,
            Self::LateMajor => -5,
            Self::LateSevere => -10,
        }
    }

    /// Softened penalty for the first late delivery of a well-regarded courier.
    #[must_use]
    pub const fn mitigated_delta(self) -> i32 {
        match self {
            Self::LateMinor => -1,
            Self::LateMajor => -3,
            Self::LateSevere => -5,
            other => other.base_delta(),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::OnTime => "on_time",
            Self::LateMinor => "late_minor",
            Self::LateMajor => "late_major",
            Self::LateSevere => "late_severe",
        }
    }
}

impl fmt::Display for DeliveryTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classified delivery with the raw measurements behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub timing: DeliveryTiming,
    /// Seconds past the deadline; negative when early.
    pub lateness: f64,
    /// Share of the pickup-to-deadline window left over. Zero for late deliveries.
    pub early_ratio: f64,
}

/// Classify a delivery from its pickup time, delivery time and deadline (game seconds).
#[must_use]
pub fn classify_delivery(pickup_time: f64, delivery_time: f64, deadline: f64) -> DeliveryOutcome {
    let lateness = delivery_time - deadline;
    let window = deadline - pickup_time;
    let early_ratio = if lateness <= 0.0 && window > 0.0 {
        (deadline - delivery_time) / window
    } else {
        0.0
    };
    DeliveryOutcome {
        timing: DeliveryTiming::from_lateness(lateness, window),
        lateness,
        early_ratio,
    }
}

/// Reputation delta for a delivery, honouring the first-late mitigation.
#[must_use]
pub const fn delivery_delta(timing: DeliveryTiming, reputation: i32, first_late: bool) -> i32 {
    if timing.is_late() && first_late && reputation >= MITIGATION_THRESHOLD {
        timing.mitigated_delta()
    } else {
        timing.base_delta()
    }
}

#[must_use]
pub fn payout_multiplier(reputation: i32) -> f64 {
    if reputation >= BONUS_THRESHOLD {
        BONUS_MULTIPLIER
    } else {
        1.0
    }
}

/// End-of-run score.
#[must_use]
pub fn final_score(income: f64, reputation: i32) -> f64 {
    income * payout_multiplier(reputation)
}

/// Result of a single reputation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationChange {
    pub delta: i32,
    pub streak_bonus: i32,
    pub mitigated: bool,
    /// Reputation after the change.
    pub value: i32,
}

impl ReputationChange {
    #[must_use]
    pub const fn total(&self) -> i32 {
        self.delta + self.streak_bonus
    }

    #[must_use]
    pub const fn is_losing(&self) -> bool {
        self.value < LOSS_THRESHOLD
    }
}

/// Reputation ledger for one courier over one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reputation {
    value: i32,
    clean_streak: u8,
    first_late_consumed: bool,
}

impl Reputation {
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self {
            value: clamp_reputation(value),
            clean_streak: 0,
            first_late_consumed: false,
        }
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.value
    }

    #[must_use]
    pub const fn clean_streak(&self) -> u8 {
        self.clean_streak
    }

    #[must_use]
    pub const fn first_late_consumed(&self) -> bool {
        self.first_late_consumed
    }

    #[must_use]
    pub const fn is_losing(&self) -> bool {
        self.value < LOSS_THRESHOLD
    }

    #[must_use]
    pub const fn has_bonus(&self) -> bool {
        self.value >= BONUS_THRESHOLD
    }

    #[must_use]
    pub fn payout_multiplier(&self) -> f64 {
        payout_multiplier(self.value)
    }

    /// Apply a delivery. The first late delivery of the session consumes the
    /// mitigation whether or not the reputation qualified for it.
    pub fn record_delivery(&mut self, timing: DeliveryTiming) -> ReputationChange {
        let first_late = timing.is_late() && !self.first_late_consumed;
        if first_late {
            self.first_late_consumed = true;
        }
        let delta = delivery_delta(timing, self.value, first_late);
        let mut change = self.apply(delta);
        change.mitigated = delta != timing.base_delta();
        change
    }

    pub fn record_cancel(&mut self) -> ReputationChange {
        self.apply(CANCEL_PENALTY)
    }

    /// A carried job expired. Never mitigated.
    pub fn record_expiry(&mut self) -> ReputationChange {
        self.apply(EXPIRED_PENALTY)
    }

    /// Apply a raw delta, tracking the clean streak and clamping to `[0, 100]`.
    pub fn apply(&mut self, delta: i32) -> ReputationChange {
        let mut streak_bonus = 0;
        if delta >= 0 {
            self.clean_streak += 1;
            if self.clean_streak >= STREAK_LENGTH {
                streak_bonus = STREAK_BONUS;
                self.clean_streak = 0;
            }
        } else {
            self.clean_streak = 0;
        }
        self.value = clamp_reputation(self.value + delta + streak_bonus);
        ReputationChange {
            delta,
            streak_bonus,
            mitigated: false,
            value: self.value,
        }
    }
}

impl Default for Reputation {
    fn default() -> Self {
        Self::new(STARTING_REPUTATION)
    }
}

const fn clamp_reputation(value: i32) -> i32 {
    if value < 0 {
        0
    } else if value > MAX_REPUTATION {
        MAX_REPUTATION
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_bands_follow_table() {
        assert_eq!(classify_delivery(0.0, 110.0, 100.0).timing, DeliveryTiming::LateMinor);
        assert_eq!(classify_delivery(0.0, 130.0, 100.0).timing, DeliveryTiming::LateMinor);
        assert_eq!(classify_delivery(0.0, 131.0, 100.0).timing, DeliveryTiming::LateMajor);
        assert_eq!(classify_delivery(0.0, 220.0, 100.0).timing, DeliveryTiming::LateMajor);
        assert_eq!(classify_delivery(0.0, 221.0, 100.0).timing, DeliveryTiming::LateSevere);
    }

    #[test]
    fn severe_lateness_costs_ten() {
        let pickup = 30.0;
        let deadline = pickup + 121.0;
        let outcome = classify_delivery(pickup, deadline + 121.0, deadline);
        assert_eq!(outcome.timing, DeliveryTiming::LateSevere);
        assert_eq!(delivery_delta(outcome.timing, 70, false), -10);
    }

    #[test]
    fn quarter_window_left_is_early() {
        let pickup = 10.0;
        let deadline = pickup + 121.0;
        let delivered = deadline - (deadline - pickup) * 0.25;
        let outcome = classify_delivery(pickup, delivered, deadline);
        assert_eq!(outcome.timing, DeliveryTiming::Early);
        assert!((outcome.early_ratio - 0.25).abs() < 1e-9);
        assert_eq!(delivery_delta(outcome.timing, 50, false), 5);
    }

    #[test]
    fn on_deadline_is_on_time() {
        let outcome = classify_delivery(0.0, 100.0, 100.0);
        assert_eq!(outcome.timing, DeliveryTiming::OnTime);
        assert_eq!(outcome.timing.base_delta(), 3);
    }

    #[test]
    fn first_late_is_mitigated_only_for_trusted_couriers() {
        assert_eq!(delivery_delta(DeliveryTiming::LateMinor, 85, true), -1);
        assert_eq!(delivery_delta(DeliveryTiming::LateMajor, 90, true), -3);
        assert_eq!(delivery_delta(DeliveryTiming::LateSevere, 99, true), -5);
        assert_eq!(delivery_delta(DeliveryTiming::LateSevere, 84, true), -10);
        assert_eq!(delivery_delta(DeliveryTiming::LateSevere, 99, false), -10);
    }

    #[test]
    fn mitigation_is_consumed_once_per_session() {
        let mut rep = Reputation::new(95);
        let first = rep.record_delivery(DeliveryTiming::LateMajor);
        assert!(first.mitigated);
        assert_eq!(first.value, 92);
        let second = rep.record_delivery(DeliveryTiming::LateMajor);
        assert!(!second.mitigated);
        assert_eq!(second.value, 87);
    }

    #[test]
    fn low_reputation_still_consumes_first_late() {
        let mut rep = Reputation::new(60);
        rep.record_delivery(DeliveryTiming::LateMinor);
        assert!(rep.first_late_consumed());
    }

    #[test]
    fn clean_streak_grants_bonus() {
        let mut rep = Reputation::new(50);
        rep.record_delivery(DeliveryTiming::OnTime);
        rep.record_delivery(DeliveryTiming::OnTime);
        let third = rep.record_delivery(DeliveryTiming::OnTime);
        assert_eq!(third.streak_bonus, STREAK_BONUS);
        assert_eq!(rep.value(), 50 + 9 + 2);
        assert_eq!(rep.clean_streak(), 0);
    }

    #[test]
    fn penalties_reset_streak_and_clamp() {
        let mut rep = Reputation::new(2);
        rep.record_delivery(DeliveryTiming::Early);
        let change = rep.record_expiry();
        assert_eq!(change.delta, EXPIRED_PENALTY);
        assert_eq!(rep.value(), 1);
        assert_eq!(rep.clean_streak(), 0);
        rep.record_cancel();
        assert_eq!(rep.value(), 0);

        let mut high = Reputation::new(99);
        high.record_delivery(DeliveryTiming::Early);
        assert_eq!(high.value(), MAX_REPUTATION);
    }

    #[test]
    fn cancel_below_threshold_loses() {
        let mut rep = Reputation::new(22);
        let change = rep.record_cancel();
        assert_eq!(change.value, 18);
        assert!(change.is_losing());
        assert!(rep.is_losing());
    }

    #[test]
    fn score_bonus_applies_at_ninety() {
        assert!((final_score(100.0, 95) - 105.0).abs() < 1e-9);
        assert!((final_score(100.0, 90) - 105.0).abs() < 1e-9);
        assert!((final_score(100.0, 89) - 100.0).abs() < 1e-9);
    }
}
