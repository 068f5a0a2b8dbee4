//! Jobs manager: owns every job, drives release/expiry and arbitrates pickups and deliveries
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::clock::RunClock;
use crate::grid::{Cell, CityGrid};
use crate::inventory::Inventory;
use crate::job::{Job, JobError, JobId, JobRecord, JobState};

/// Chebyshev radius around the courier reported as "nearby" by [`JobsManager::update`].
pub const NEARBY_RADIUS: u32 = 2;

/// Ranges used by the synthetic job generator.
const GENERATED_PAYOUT: std::ops::RangeInclusive<u32> = 120..=400;
const GENERATED_WEIGHT: std::ops::RangeInclusive<u32> = 1..=3;
const GENERATED_PRIORITY: std::ops::RangeInclusive<i32> = 0..=2;
const GENERATED_DEADLINE_SECS: std::ops::RangeInclusive<u32> = 180..=420;

/// Why a pickup attempt failed. No job or inventory state changes except expiry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PickupRejection {
    #[error("job {0} is not available")]
    NotAvailable(JobId),
    #[error("pickup for job {id} at {pickup} is out of reach")]
    OutOfReach { id: JobId, pickup: Cell },
    #[error("job {0} expired before pickup")]
    Expired(JobId),
    #[error("job {id} weighs {weight} but only {remaining} capacity remains")]
    OverCapacity {
        id: JobId,
        weight: f64,
        remaining: f64,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryRejection {
    #[error("no job selected in inventory")]
    NothingSelected,
    #[error("job {0} is not known to the manager")]
    UnknownJob(JobId),
    #[error("dropoff for job {id} at {dropoff} is out of reach")]
    OutOfReach { id: JobId, dropoff: Cell },
}

/// Outcome of [`JobsManager::try_deliver`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryAttempt {
    /// The job was delivered; payout and reputation are the caller's to apply.
    Delivered(Job),
    /// The selected job expired while carried and was evicted from the inventory.
    ExpiredInTransit(JobId),
    Rejected(DeliveryRejection),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CancelRejection {
    #[error("job {0} is not known to the manager")]
    UnknownJob(JobId),
    #[error("no job selected in inventory")]
    NothingSelected,
    #[error("job {id} cannot be cancelled while {state}")]
    NotCancellable { id: JobId, state: JobState },
}

/// A successful cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub id: JobId,
    /// The job had been accepted (picked up), which carries a reputation penalty.
    pub was_carried: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredJob {
    pub id: JobId,
    pub was_carried: bool,
}

/// Changes discovered by one [`JobsManager::update`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub released: Vec<JobId>,
    pub expired: Vec<ExpiredJob>,
    /// Available jobs whose pickup lies within [`NEARBY_RADIUS`] of the courier.
    pub nearby: Vec<JobId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub available: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub expired: usize,
    pub cancelled: usize,
}

/// Owner of all jobs, with available and completed views.
#[derive(Debug, Clone, Default)]
pub struct JobsManager {
    jobs: Vec<Job>,
    index: HashMap<JobId, usize>,
    available: Vec<usize>,
    completed: Vec<usize>,
    skipped: Vec<JobError>,
}

impl JobsManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load raw feed records, skipping (and logging) any that are malformed.
    #[must_use]
    pub fn from_feed(records: &[serde_json::Value], clock: &RunClock) -> Self {
        let mut manager = Self::new();
        for (index, value) in records.iter().enumerate() {
            let parsed = serde_json::from_value::<JobRecord>(value.clone())
                .map_err(|err| JobError::Malformed {
                    index,
                    reason: err.to_string(),
                })
                .and_then(|record| Job::from_record(index, &record, clock))
                .and_then(|job| manager.insert(job));
            if let Err(err) = parsed {
                log::warn!("skipping job record: {err}");
                manager.skipped.push(err);
            }
        }
        manager
    }

    /// Add a job to the manager.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Duplicate`] if a job with the same id already exists.
    pub fn insert(&mut self, job: Job) -> Result<(), JobError> {
        if self.index.contains_key(job.id()) {
            return Err(JobError::Duplicate {
                id: job.id().to_string(),
            });
        }
        let idx = self.jobs.len();
        self.index.insert(job.id().to_string(), idx);
        if job.state() == JobState::Available {
            self.available.push(idx);
        }
        self.jobs.push(job);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Records rejected while loading a feed.
    #[must_use]
    pub fn skipped(&self) -> &[JobError] {
        &self.skipped
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Job> {
        self.index.get(id).map(|idx| &self.jobs[*idx])
    }

    #[must_use]
    pub fn all(&self) -> &[Job] {
        &self.jobs
    }

    pub fn available(&self) -> impl Iterator<Item = &Job> {
        self.available.iter().map(|idx| &self.jobs[*idx])
    }

    /// Delivered jobs in delivery order.
    pub fn completed(&self) -> impl Iterator<Item = &Job> {
        self.completed.iter().map(|idx| &self.jobs[*idx])
    }

    #[must_use]
    pub fn is_available(&self, id: &str) -> bool {
        self.index
            .get(id)
            .is_some_and(|idx| self.available.contains(idx))
    }

    /// Available jobs whose pickup is within `radius` (Chebyshev) of `position`.
    #[must_use]
    pub fn nearby_available(&self, position: Cell, radius: u32) -> Vec<&Job> {
        self.available()
            .filter(|job| job.pickup().chebyshev(position) <= radius)
            .collect()
    }

    /// Release due jobs, expire overdue ones and refresh the available view.
    pub fn update(&mut self, now: f64, courier_pos: Cell) -> UpdateReport {
        let mut report = UpdateReport::default();
        for job in &mut self.jobs {
            if job.state() == JobState::Pending
                && job.is_released(now)
                && !job.is_expired(now)
                && job.release()
            {
                report.released.push(job.id().to_string());
            }
            if !job.state().is_terminal() && job.is_expired(now) {
                let was_carried = job.state() == JobState::PickedUp;
                if job.expire() {
                    report.expired.push(ExpiredJob {
                        id: job.id().to_string(),
                        was_carried,
                    });
                }
            }
        }
        self.refresh_available();
        report.nearby = self
            .nearby_available(courier_pos, NEARBY_RADIUS)
            .into_iter()
            .map(|job| job.id().to_string())
            .collect();
        report
    }

    fn refresh_available(&mut self) {
        self.available = self
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.state() == JobState::Available)
            .map(|(idx, _)| idx)
            .collect();
    }

    /// Pick up an available job into `inventory`.
    ///
    /// # Errors
    ///
    /// Returns a [`PickupRejection`] when the job is not available, the courier is
    /// not next to the pickup, the job has just expired, or it does not fit.
    pub fn try_pickup(
        &mut self,
        job_id: &str,
        courier_pos: Cell,
        inventory: &mut Inventory,
        now: f64,
    ) -> Result<(), PickupRejection> {
        let idx = self
            .index
            .get(job_id)
            .copied()
            .filter(|idx| self.available.contains(idx))
            .ok_or_else(|| PickupRejection::NotAvailable(job_id.to_string()))?;
        let job = &mut self.jobs[idx];

        if !job.is_at_pickup(courier_pos) {
            return Err(PickupRejection::OutOfReach {
                id: job_id.to_string(),
                pickup: job.pickup(),
            });
        }
        if job.is_expired(now) {
            job.expire();
            self.available.retain(|other| *other != idx);
            return Err(PickupRejection::Expired(job_id.to_string()));
        }
        if !inventory.can_add(job.weight()) {
            return Err(PickupRejection::OverCapacity {
                id: job_id.to_string(),
                weight: job.weight(),
                remaining: inventory.remaining_capacity(),
            });
        }

        job.mark_picked_up(now);
        inventory.add(job);
        self.available.retain(|other| *other != idx);
        Ok(())
    }

    /// Deliver the inventory's currently selected job.
    pub fn try_deliver(
        &mut self,
        inventory: &mut Inventory,
        courier_pos: Cell,
        now: f64,
    ) -> DeliveryAttempt {
        let Some(id) = inventory.current().map(|carried| carried.id.clone()) else {
            return DeliveryAttempt::Rejected(DeliveryRejection::NothingSelected);
        };
        let Some(idx) = self.index.get(&id).copied() else {
            return DeliveryAttempt::Rejected(DeliveryRejection::UnknownJob(id));
        };
        let job = &mut self.jobs[idx];

        if job.state() == JobState::Expired || job.is_expired(now) {
            job.expire();
            inventory.remove(&id);
            return DeliveryAttempt::ExpiredInTransit(id);
        }
        if !job.is_at_dropoff(courier_pos) {
            return DeliveryAttempt::Rejected(DeliveryRejection::OutOfReach {
                id,
                dropoff: job.dropoff(),
            });
        }

        job.mark_delivered(now);
        inventory.remove(&id);
        self.completed.push(idx);
        DeliveryAttempt::Delivered(job.clone())
    }

    /// Cancel a job, or the inventory's current job when `job_id` is `None`.
    ///
    /// Carried jobs can only be cancelled through the inventory that holds them.
    ///
    /// # Errors
    ///
    /// Returns a [`CancelRejection`] for unknown, unselected or terminal jobs.
    pub fn cancel(
        &mut self,
        job_id: Option<&str>,
        inventory: &mut Inventory,
    ) -> Result<Cancellation, CancelRejection> {
        let id = match job_id {
            Some(id) => id.to_string(),
            None => inventory
                .current()
                .map(|carried| carried.id.clone())
                .ok_or(CancelRejection::NothingSelected)?,
        };
        let idx = self
            .index
            .get(&id)
            .copied()
            .ok_or_else(|| CancelRejection::UnknownJob(id.clone()))?;
        let job = &mut self.jobs[idx];
        let state = job.state();
        let carried_here = inventory.contains(&id);

        let allowed = match state {
            JobState::Available => true,
            JobState::PickedUp => carried_here,
            _ => false,
        };
        if !allowed || !job.cancel() {
            return Err(CancelRejection::NotCancellable { id, state });
        }

        self.available.retain(|other| *other != idx);
        if carried_here {
            inventory.remove(&id);
        }
        Ok(Cancellation {
            id,
            was_carried: state == JobState::PickedUp,
        })
    }

    /// Synthesize up to `count` jobs between positions next to buildings
    /// (or any street when there are none). Returns how many were created.
    pub fn generate_random_jobs<R: Rng + ?Sized>(
        &mut self,
        grid: &CityGrid,
        count: usize,
        now: f64,
        rng: &mut R,
    ) -> usize {
        let mut positions = grid.building_edges();
        if positions.len() < 2 {
            positions = grid.street_positions();
        }
        if positions.len() < 2 {
            log::warn!("no valid positions for synthetic jobs; generated none");
            return 0;
        }
        let actual = count.min(positions.len() - 1);
        if actual < count {
            log::warn!("only {actual} of {count} synthetic jobs fit on this map");
        }

        let mut created = 0;
        let mut serial = self.jobs.len();
        while created < actual {
            serial += 1;
            let id = format!("JOB-{serial:03}");
            if self.index.contains_key(&id) {
                continue;
            }
            let pickup_idx = rng.gen_range(0..positions.len());
            let mut dropoff_idx = rng.gen_range(0..positions.len() - 1);
            if dropoff_idx >= pickup_idx {
                dropoff_idx += 1;
            }
            let payout = f64::from(rng.gen_range(GENERATED_PAYOUT));
            let weight = f64::from(rng.gen_range(GENERATED_WEIGHT));
            let priority = rng.gen_range(GENERATED_PRIORITY);
            let deadline = now + f64::from(rng.gen_range(GENERATED_DEADLINE_SECS));

            let job = Job::new(id, positions[pickup_idx], positions[dropoff_idx], payout, weight)
                .with_priority(priority)
                .with_deadline(deadline);
            if self.insert(job).is_ok() {
                created += 1;
            }
        }
        log::info!("generated {created} synthetic jobs");
        created
    }

    #[must_use]
    pub fn stats(&self) -> JobStats {
        let mut stats = JobStats {
            total: self.jobs.len(),
            ..JobStats::default()
        };
        for job in &self.jobs {
            match job.state() {
                JobState::Pending => stats.pending += 1,
                JobState::Available => stats.available += 1,
                JobState::PickedUp => stats.in_progress += 1,
                JobState::Delivered => stats.completed += 1,
                JobState::Expired => stats.expired += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}
