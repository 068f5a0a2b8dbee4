//! End-of-run score records and their storage
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::convert::Infallible;

use crate::reputation::final_score;

/// Final result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score: f64,
    pub income: f64,
    /// Game seconds played.
    pub time: f64,
    pub reputation: i32,
    pub timestamp: DateTime<Utc>,
}

impl ScoreRecord {
    /// Score a finished run, applying the end-of-run reputation bonus.
    #[must_use]
    pub fn new(income: f64, time: f64, reputation: i32, timestamp: DateTime<Utc>) -> Self {
        Self {
            score: final_score(income, reputation),
            income,
            time,
            reputation,
            timestamp,
        }
    }
}

/// Best first: higher score, then the more recent record.
#[must_use]
pub fn leaderboard_order(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.timestamp.cmp(&a.timestamp))
}

/// Where finished runs are kept.
pub trait ScoreStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    fn record(&mut self, record: ScoreRecord) -> Result<(), Self::Error>;

    /// Stored records, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be read.
    fn top(&self, limit: usize) -> Result<Vec<ScoreRecord>, Self::Error>;
}

/// In-process score list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryScores {
    records: Vec<ScoreRecord>,
}

impl MemoryScores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ScoreStore for MemoryScores {
    type Error = Infallible;

    fn record(&mut self, record: ScoreRecord) -> Result<(), Self::Error> {
        self.records.push(record);
        self.records.sort_by(leaderboard_order);
        Ok(())
    }

    fn top(&self, limit: usize) -> Result<Vec<ScoreRecord>, Self::Error> {
        Ok(self.records.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn record_applies_reputation_bonus() {
        let record = ScoreRecord::new(100.0, 300.0, 95, at(0));
        assert!((record.score - 105.0).abs() < 1e-9);
        let record = ScoreRecord::new(100.0, 300.0, 89, at(0));
        assert!((record.score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn memory_scores_sort_best_then_newest() {
        let mut scores = MemoryScores::new();
        scores.record(ScoreRecord::new(50.0, 10.0, 70, at(1))).unwrap();
        scores.record(ScoreRecord::new(200.0, 10.0, 70, at(2))).unwrap();
        scores.record(ScoreRecord::new(50.0, 10.0, 70, at(3))).unwrap();
        let top = scores.top(10).unwrap();
        assert_eq!(top.len(), 3);
        assert!((top[0].income - 200.0).abs() < 1e-9);
        assert_eq!(top[1].timestamp, at(3));
        assert_eq!(top[2].timestamp, at(1));
        assert_eq!(scores.top(1).unwrap().len(), 1);
    }
}
