//! Delivery jobs and their lifecycle
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::clock::RunClock;
use crate::grid::Cell;
use crate::reputation::DeliveryTiming;

pub type JobId = String;

/// Expected pickup-to-dropoff duration used to grade deliveries without a deadline window.
pub const ESTIMATED_DELIVERY_SECS: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Pending,
    Available,
    PickedUp,
    Delivered,
    Expired,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Expired | Self::Cancelled)
    }

    /// Legal forward transitions. Nothing ever returns to `Pending`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Available)
                | (Self::Available, Self::PickedUp)
                | (Self::PickedUp, Self::Delivered)
                | (
                    Self::Pending | Self::Available | Self::PickedUp,
                    Self::Expired
                )
                | (Self::Available | Self::PickedUp, Self::Cancelled)
        )
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::PickedUp => "picked_up",
            Self::Delivered => "delivered",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Job as it appears in the external job feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub pickup: [i32; 2],
    pub dropoff: [i32; 2],
    pub payout: f64,
    #[serde(default = "JobRecord::default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub release_time: f64,
    /// ISO-8601 timestamp; absent or empty means the job never expires.
    #[serde(default)]
    pub deadline: Option<String>,
}

impl JobRecord {
    const fn default_weight() -> f64 {
        1.0
    }
}

/// Reasons a job record is rejected at load time.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JobError {
    #[error("job record {index} has no id")]
    MissingId { index: usize },
    #[error("job {id} has duplicate id")]
    Duplicate { id: JobId },
    #[error("job {id}: {field} must be a finite non-negative number (got {value})")]
    InvalidNumber {
        id: JobId,
        field: &'static str,
        value: f64,
    },
    #[error("job {id}: deadline {value:?} is not a timestamp")]
    BadDeadline { id: JobId, value: String },
    #[error("job record {index} is malformed: {reason}")]
    Malformed { index: usize, reason: String },
}

/// A single delivery job. Times are game seconds since run start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    pickup: Cell,
    dropoff: Cell,
    payout: f64,
    weight: f64,
    priority: i32,
    release_time: f64,
    deadline: Option<f64>,
    state: JobState,
    pickup_time: Option<f64>,
    delivery_time: Option<f64>,
}

impl Job {
    /// New job released immediately, without a deadline.
    #[must_use]
    pub fn new(
        id: impl Into<JobId>,
        pickup: Cell,
        dropoff: Cell,
        payout: f64,
        weight: f64,
    ) -> Self {
        Self {
            id: id.into(),
            pickup,
            dropoff,
            payout,
            weight,
            priority: 0,
            release_time: 0.0,
            deadline: None,
            state: JobState::Available,
            pickup_time: None,
            delivery_time: None,
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Jobs released after the run starts begin as pending.
    #[must_use]
    pub fn with_release_time(mut self, release_time: f64) -> Self {
        self.release_time = release_time.max(0.0);
        self.state = if self.release_time > 0.0 {
            JobState::Pending
        } else {
            JobState::Available
        };
        self
    }

    #[must_use]
    pub const fn with_deadline(mut self, deadline: f64) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build a job from a feed record, resolving the deadline against the run clock.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] for a missing id, non-finite or negative numbers,
    /// or a deadline that is not a timestamp.
    pub fn from_record(
        index: usize,
        record: &JobRecord,
        clock: &RunClock,
    ) -> Result<Self, JobError> {
        let id = record
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(JobError::MissingId { index })?
            .to_string();

        for (field, value) in [
            ("payout", record.payout),
            ("weight", record.weight),
            ("release_time", record.release_time),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(JobError::InvalidNumber { id, field, value });
            }
        }

        let deadline = match record.deadline.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(clock.seconds_until(text).map_err(|_| JobError::BadDeadline {
                id: id.clone(),
                value: text.to_string(),
            })?),
        };

        let mut job = Self::new(
            id,
            Cell::from(record.pickup),
            Cell::from(record.dropoff),
            record.payout,
            record.weight,
        )
        .with_priority(record.priority)
        .with_release_time(record.release_time);
        job.deadline = deadline;
        Ok(job)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn pickup(&self) -> Cell {
        self.pickup
    }

    #[must_use]
    pub const fn dropoff(&self) -> Cell {
        self.dropoff
    }

    #[must_use]
    pub const fn payout(&self) -> f64 {
        self.payout
    }

    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    #[must_use]
    pub const fn release_time(&self) -> f64 {
        self.release_time
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<f64> {
        self.deadline
    }

    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    #[must_use]
    pub const fn pickup_time(&self) -> Option<f64> {
        self.pickup_time
    }

    #[must_use]
    pub const fn delivery_time(&self) -> Option<f64> {
        self.delivery_time
    }

    #[must_use]
    pub fn is_released(&self, now: f64) -> bool {
        now >= self.release_time
    }

    /// True once the deadline has passed for a live job, or if already expired.
    #[must_use]
    pub fn is_expired(&self, now: f64) -> bool {
        match self.state {
            JobState::Expired => true,
            state if state.is_terminal() => false,
            _ => self.deadline.is_some_and(|deadline| now > deadline),
        }
    }

    /// Seconds left before the deadline, floored at zero; infinite without a deadline.
    #[must_use]
    pub fn time_until_deadline(&self, now: f64) -> f64 {
        self.deadline
            .map_or(f64::INFINITY, |deadline| (deadline - now).max(0.0))
    }

    #[must_use]
    pub const fn is_at_pickup(&self, position: Cell) -> bool {
        self.pickup.within_reach(position)
    }

    #[must_use]
    pub const fn is_at_dropoff(&self, position: Cell) -> bool {
        self.dropoff.within_reach(position)
    }

    fn advance(&mut self, next: JobState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    pub(crate) fn release(&mut self) -> bool {
        self.advance(JobState::Available)
    }

    pub(crate) fn mark_picked_up(&mut self, now: f64) -> bool {
        let moved = self.advance(JobState::PickedUp);
        if moved {
            self.pickup_time = Some(now);
        }
        moved
    }

    pub(crate) fn mark_delivered(&mut self, now: f64) -> bool {
        let moved = self.advance(JobState::Delivered);
        if moved {
            self.delivery_time = Some(now);
        }
        moved
    }

    pub(crate) fn expire(&mut self) -> bool {
        self.advance(JobState::Expired)
    }

    pub(crate) fn cancel(&mut self) -> bool {
        self.advance(JobState::Cancelled)
    }

    /// Grade a delivered job against [`ESTIMATED_DELIVERY_SECS`].
    #[must_use]
    pub fn estimated_timing(&self) -> Option<DeliveryTiming> {
        if self.state != JobState::Delivered {
            return None;
        }
        let elapsed = self.delivery_time? - self.pickup_time?;
        Some(DeliveryTiming::from_lateness(
            elapsed - ESTIMATED_DELIVERY_SECS,
            ESTIMATED_DELIVERY_SECS,
        ))
    }

    /// Reputation delta from the estimated delivery duration; `None` until delivered.
    #[must_use]
    pub fn reputation_delta(&self) -> Option<i32> {
        self.estimated_timing().map(DeliveryTiming::base_delta)
    }
}
