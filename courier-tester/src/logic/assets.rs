use anyhow::{Context, Result};
use courier_game::{DataLoader, LoadError, MapFeed, WeatherConfig, parse_job_feed};
use serde_json::Value;
use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};

/// Feed files named on the command line. Absent paths mean built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct FeedFiles {
    pub map: Option<PathBuf>,
    pub jobs: Option<PathBuf>,
    pub weather: Option<PathBuf>,
}

fn read_feed(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

impl DataLoader for FeedFiles {
    type Error = LoadError;

    fn load_map(&self) -> Result<Option<MapFeed>, Self::Error> {
        let Some(path) = &self.map else {
            return Ok(None);
        };
        let text = read_feed(path)?;
        MapFeed::from_json(&text)
            .map(Some)
            .map_err(|source| LoadError::Json {
                what: "map feed",
                source,
            })
    }

    fn load_jobs(&self) -> Result<Option<Vec<Value>>, Self::Error> {
        let Some(path) = &self.jobs else {
            return Ok(None);
        };
        let text = read_feed(path)?;
        parse_job_feed(&text)
            .map(Some)
            .map_err(|source| LoadError::Json {
                what: "job feed",
                source,
            })
    }

    fn load_weather(&self) -> Result<Option<WeatherConfig>, Self::Error> {
        let Some(path) = &self.weather else {
            return Ok(None);
        };
        let text = read_feed(path)?;
        Ok(Some(WeatherConfig::from_json(&text)?))
    }
}

/// Feeds read once at startup and shared by every run.
#[derive(Debug, Clone)]
pub struct TesterAssets {
    map: MapFeed,
    jobs: Option<Vec<Value>>,
    weather: Option<WeatherConfig>,
}

impl TesterAssets {
    /// Read the named feeds, falling back to the embedded demo city when no map is given.
    ///
    /// # Errors
    ///
    /// Fails when a named file cannot be read or parsed.
    pub fn load(files: &FeedFiles) -> Result<Self> {
        let map = match files.load_map()? {
            Some(map) => map,
            None => MapFeed::demo_city().context("embedded demo city is malformed")?,
        };
        let jobs = files.load_jobs()?;
        if let Some(records) = &jobs {
            log::info!("loaded {} job records", records.len());
        }
        let weather = files.load_weather()?;
        Ok(Self { map, jobs, weather })
    }

    /// Demo city, synthetic jobs and the built-in weather.
    ///
    /// # Errors
    ///
    /// Fails only if the embedded demo city cannot be parsed.
    pub fn load_default() -> Result<Self> {
        Self::load(&FeedFiles::default())
    }

    /// Force the run length, overriding whatever the map declares.
    #[must_use]
    pub fn with_max_time(mut self, max_time: Option<f64>) -> Self {
        if let Some(max_time) = max_time {
            self.map.max_time = Some(max_time);
        }
        self
    }

    #[must_use]
    pub fn uses_feed_jobs(&self) -> bool {
        self.jobs.is_some()
    }
}

impl DataLoader for TesterAssets {
    type Error = Infallible;

    fn load_map(&self) -> Result<Option<MapFeed>, Self::Error> {
        Ok(Some(self.map.clone()))
    }

    fn load_jobs(&self) -> Result<Option<Vec<Value>>, Self::Error> {
        Ok(self.jobs.clone())
    }

    fn load_weather(&self) -> Result<Option<WeatherConfig>, Self::Error> {
        Ok(self.weather.clone())
    }
}
