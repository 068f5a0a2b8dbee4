use courier_game::ScoreStore;
use courier_game::score::{ScoreRecord, leaderboard_order};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoreFileError {
    #[error("failed to access score file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("score file {path} is not a score list: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Score list persisted as a JSON array at an explicit path.
#[derive(Debug, Clone)]
pub struct JsonScoreFile {
    path: PathBuf,
}

impl JsonScoreFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn read_all(&self) -> Result<Vec<ScoreRecord>, ScoreFileError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ScoreFileError::Io {
                    path: self.label(),
                    source,
                });
            }
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut records: Vec<ScoreRecord> =
            serde_json::from_str(&text).map_err(|source| ScoreFileError::Json {
                path: self.label(),
                source,
            })?;
        records.sort_by(leaderboard_order);
        Ok(records)
    }
}

impl ScoreStore for JsonScoreFile {
    type Error = ScoreFileError;

    fn record(&mut self, record: ScoreRecord) -> Result<(), Self::Error> {
        let mut records = self.read_all()?;
        records.push(record);
        records.sort_by(leaderboard_order);
        let json = serde_json::to_string_pretty(&records).map_err(|source| ScoreFileError::Json {
            path: self.label(),
            source,
        })?;
        fs::write(&self.path, json).map_err(|source| ScoreFileError::Io {
            path: self.label(),
            source,
        })
    }

    fn top(&self, limit: usize) -> Result<Vec<ScoreRecord>, Self::Error> {
        let mut records = self.read_all()?;
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn temp_path(label: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "courier-scores-{label}-{}.json",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        path
    }

    fn record(income: f64, secs: i64) -> ScoreRecord {
        let timestamp = DateTime::from_timestamp(secs, 0).unwrap();
        ScoreRecord::new(income, 900.0, 70, timestamp)
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let store = JsonScoreFile::new(temp_path("missing"));
        assert!(store.top(10).unwrap().is_empty());
    }

    #[test]
    fn records_persist_sorted_across_instances() {
        let path = temp_path("sorted");
        let mut store = JsonScoreFile::new(&path);
        store.record(record(120.0, 10)).unwrap();
        store.record(record(480.0, 20)).unwrap();
        store.record(record(120.0, 30)).unwrap();

        let reopened = JsonScoreFile::new(&path);
        let top = reopened.top(10).unwrap();
        assert_eq!(top.len(), 3);
        assert!((top[0].income - 480.0).abs() < 1e-9);
        assert_eq!(top[1].timestamp.timestamp(), 30);
        assert_eq!(top[2].timestamp.timestamp(), 10);
        assert_eq!(reopened.top(1).unwrap().len(), 1);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn garbage_files_are_reported() {
        let path = temp_path("garbage");
        fs::write(&path, "{\"not\": \"a list\"}").unwrap();
        let mut store = JsonScoreFile::new(&path);
        assert!(matches!(store.top(3), Err(ScoreFileError::Json { .. })));
        assert!(store.record(record(1.0, 1)).is_err());
        let _ = fs::remove_file(path);
    }
}
