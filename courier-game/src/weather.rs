//! Weather Markov process with smooth blending between conditions
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Labels shipped with the default configuration.
pub const KNOWN_CONDITIONS: [&str; 9] = [
    "clear",
    "clouds",
    "rain_light",
    "rain",
    "storm",
    "fog",
    "wind",
    "heat",
    "cold",
];

/// Movement and stamina multipliers for a condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionEffect {
    pub speed: f64,
    pub stamina_cost: f64,
}

impl ConditionEffect {
    pub const NEUTRAL: Self = Self {
        speed: 1.0,
        stamina_cost: 1.0,
    };

    #[must_use]
    pub const fn new(speed: f64, stamina_cost: f64) -> Self {
        Self {
            speed,
            stamina_cost,
        }
    }

    #[must_use]
    pub fn lerp(self, to: Self, t: f64) -> Self {
        Self {
            speed: self.speed + (to.speed - self.speed) * t,
            stamina_cost: self.stamina_cost + (to.stamina_cost - self.stamina_cost) * t,
        }
    }
}

impl Default for ConditionEffect {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Closed range sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformRange {
    pub min: f64,
    pub max: f64,
}

impl UniformRange {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(self, rng: &mut R) -> f64 {
        if self.max > self.min {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        }
    }

    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialWeather {
    #[serde(default = "InitialWeather::default_condition")]
    pub condition: String,
    #[serde(default)]
    pub intensity: f64,
}

impl InitialWeather {
    fn default_condition() -> String {
        "clear".to_string()
    }
}

impl Default for InitialWeather {
    fn default() -> Self {
        Self {
            condition: Self::default_condition(),
            intensity: 0.0,
        }
    }
}

pub type TransitionMatrix = BTreeMap<String, BTreeMap<String, f64>>;

/// Errors raised when weather configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum WeatherConfigError {
    #[error("weather JSON parse error: {0}")]
    Parse(String),
    #[error("{field} range invalid (min {min:.2}, max {max:.2})")]
    Range {
        field: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{field} must be between 0 and 1 (got {value:.2})")]
    Unit { field: &'static str, value: f64 },
    #[error("transition weight {from} -> {to} must be finite and non-negative (got {weight})")]
    Transition { from: String, to: String, weight: f64 },
    #[error("transition weights from {from} do not sum to a finite total")]
    TransitionTotal { from: String },
}

/// Weather process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub initial: InitialWeather,
    #[serde(default = "WeatherConfig::default_transition")]
    pub transition: TransitionMatrix,
    #[serde(default = "WeatherConfig::default_effects")]
    pub effects: BTreeMap<String, ConditionEffect>,
    #[serde(default = "WeatherConfig::default_burst")]
    pub burst_secs: UniformRange,
    #[serde(default = "WeatherConfig::default_blend")]
    pub blend_secs: UniformRange,
    #[serde(default = "WeatherConfig::default_intensity_range")]
    pub intensity_range: UniformRange,
    #[serde(default = "WeatherConfig::default_intensity_speed_penalty")]
    pub intensity_speed_penalty: f64,
    #[serde(default = "WeatherConfig::default_intensity_stamina_boost")]
    pub intensity_stamina_boost: f64,
    #[serde(default = "WeatherConfig::default_min_speed")]
    pub min_speed: f64,
}

impl WeatherConfig {
    fn default_transition() -> TransitionMatrix {
        BTreeMap::from([(
            "clear".to_string(),
            BTreeMap::from([
                ("clear".to_string(), 0.5),
                ("clouds".to_string(), 0.4),
                ("rain_light".to_string(), 0.1),
            ]),
        )])
    }

    fn default_effects() -> BTreeMap<String, ConditionEffect> {
        let table = [
            (1.00, 1.00),
            (0.98, 1.00),
            (0.90, 1.10),
            (0.85, 1.10),
            (0.75, 1.30),
            (0.88, 1.00),
            (0.92, 1.05),
            (0.90, 1.20),
            (0.92, 1.00),
        ];
        KNOWN_CONDITIONS
            .iter()
            .zip(table)
            .map(|(label, (speed, cost))| ((*label).to_string(), ConditionEffect::new(speed, cost)))
            .collect()
    }

    const fn default_burst() -> UniformRange {
        UniformRange::new(45.0, 60.0)
    }

    const fn default_blend() -> UniformRange {
        UniformRange::new(3.0, 5.0)
    }

    const fn default_intensity_range() -> UniformRange {
        UniformRange::new(0.3, 1.0)
    }

    const fn default_intensity_speed_penalty() -> f64 {
        0.15
    }

    const fn default_intensity_stamina_boost() -> f64 {
        0.7
    }

    const fn default_min_speed() -> f64 {
        0.45
    }

    /// Load weather configuration from a JSON feed (bare or `{"data": ...}`).
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed or validation fails.
    pub fn from_json(json: &str) -> Result<Self, WeatherConfigError> {
        let config: Self =
            crate::data::parse_feed(json).map_err(|e| WeatherConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate ranges and unit intervals.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), WeatherConfigError> {
        for (field, range) in [
            ("burst_secs", self.burst_secs),
            ("blend_secs", self.blend_secs),
            ("intensity_range", self.intensity_range),
        ] {
            if !(range.min.is_finite() && range.max.is_finite())
                || range.min < 0.0
                || range.min > range.max
            {
                return Err(WeatherConfigError::Range {
                    field,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        if self.intensity_range.max > 1.0 {
            return Err(WeatherConfigError::Unit {
                field: "intensity_range.max",
                value: self.intensity_range.max,
            });
        }
        if !UniformRange::new(0.0, 1.0).contains(self.initial.intensity) {
            return Err(WeatherConfigError::Unit {
                field: "initial.intensity",
                value: self.initial.intensity,
            });
        }
        for (from, row) in &self.transition {
            if let Some((to, weight)) = row.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
                return Err(WeatherConfigError::Transition {
                    from: from.clone(),
                    to: to.clone(),
                    weight: *weight,
                });
            }
            if !row.values().sum::<f64>().is_finite() {
                return Err(WeatherConfigError::TransitionTotal { from: from.clone() });
            }
        }
        Ok(())
    }

    /// Embedded default configuration.
    #[must_use]
    pub fn default_config() -> Self {
        Self::from_json(include_str!("../assets/weather.json")).unwrap_or_default()
    }

    /// Multipliers for `condition` at `intensity`. Unknown labels are neutral.
    #[must_use]
    pub fn effect_for(&self, condition: &str, intensity: f64) -> ConditionEffect {
        let Some(base) = self.effects.get(condition) else {
            return ConditionEffect::NEUTRAL;
        };
        let intensity = intensity.clamp(0.0, 1.0);
        let speed = (base.speed * (1.0 - self.intensity_speed_penalty * intensity))
            .clamp(self.min_speed.min(1.0), 1.0);
        let stamina_cost = base.stamina_cost * (1.0 + self.intensity_stamina_boost * intensity);
        ConditionEffect::new(speed, stamina_cost)
    }

    /// Every label mentioned by the effect table or the transition matrix, sorted.
    #[must_use]
    pub fn known_conditions(&self) -> Vec<&str> {
        let mut labels: BTreeSet<&str> = self.effects.keys().map(String::as_str).collect();
        for (from, row) in &self.transition {
            labels.insert(from);
            labels.extend(row.keys().map(String::as_str));
        }
        labels.into_iter().collect()
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            initial: InitialWeather::default(),
            transition: Self::default_transition(),
            effects: Self::default_effects(),
            burst_secs: Self::default_burst(),
            blend_secs: Self::default_blend(),
            intensity_range: Self::default_intensity_range(),
            intensity_speed_penalty: Self::default_intensity_speed_penalty(),
            intensity_stamina_boost: Self::default_intensity_stamina_boost(),
            min_speed: Self::default_min_speed(),
        }
    }
}

/// An in-progress interpolation between two conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blend {
    pub from_condition: String,
    pub to_condition: String,
    pub from: ConditionEffect,
    pub to: ConditionEffect,
    pub from_intensity: f64,
    pub to_intensity: f64,
    pub elapsed: f64,
    pub duration: f64,
}

impl Blend {
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }

    #[must_use]
    pub fn effect(&self) -> ConditionEffect {
        self.from.lerp(self.to, self.progress())
    }
}

/// Notable weather change reported by [`WeatherProcess::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherShift {
    Began { from: String, to: String },
    Settled { condition: String },
}

/// Serializable view for HUD/renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub condition: String,
    pub intensity: f64,
    pub speed_multiplier: f64,
    pub stamina_cost_multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blending_to: Option<String>,
    pub blend_progress: f64,
}

/// Markov-chain weather sampler. Mutated only through [`WeatherProcess::update`].
#[derive(Debug, Clone)]
pub struct WeatherProcess {
    config: WeatherConfig,
    condition: String,
    intensity: f64,
    since_change: f64,
    burst: f64,
    blend: Option<Blend>,
    transitions: u32,
}

impl WeatherProcess {
    pub fn new<R: Rng + ?Sized>(config: WeatherConfig, rng: &mut R) -> Self {
        let burst = config.burst_secs.sample(rng);
        Self {
            condition: config.initial.condition.clone(),
            intensity: config.initial.intensity.clamp(0.0, 1.0),
            config,
            since_change: 0.0,
            burst,
            blend: None,
            transitions: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &WeatherConfig {
        &self.config
    }

    /// Committed condition. While blending this is still the old condition.
    #[must_use]
    pub fn condition(&self) -> &str {
        &self.condition
    }

    #[must_use]
    pub fn intensity(&self) -> f64 {
        self.blend.as_ref().map_or(self.intensity, |blend| {
            blend.from_intensity + (blend.to_intensity - blend.from_intensity) * blend.progress()
        })
    }

    #[must_use]
    pub fn blend(&self) -> Option<&Blend> {
        self.blend.as_ref()
    }

    #[must_use]
    pub const fn is_blending(&self) -> bool {
        self.blend.is_some()
    }

    #[must_use]
    pub const fn burst_duration(&self) -> f64 {
        self.burst
    }

    #[must_use]
    pub const fn time_since_change(&self) -> f64 {
        self.since_change
    }

    /// Number of committed condition changes.
    #[must_use]
    pub const fn transitions(&self) -> u32 {
        self.transitions
    }

    fn effect(&self) -> ConditionEffect {
        self.blend.as_ref().map_or_else(
            || self.config.effect_for(&self.condition, self.intensity),
            Blend::effect,
        )
    }

    #[must_use]
    pub fn speed_multiplier(&self) -> f64 {
        self.effect().speed
    }

    #[must_use]
    pub fn stamina_cost_multiplier(&self) -> f64 {
        self.effect().stamina_cost
    }

    /// Advance the process by `dt` seconds.
    pub fn update<R: Rng + ?Sized>(&mut self, dt: f64, rng: &mut R) -> Option<WeatherShift> {
        if !dt.is_finite() || dt <= 0.0 {
            return None;
        }
        self.since_change += dt;
        let mut shift = None;

        if let Some(blend) = self.blend.as_mut() {
            blend.elapsed += dt;
            if blend.elapsed >= blend.duration {
                let blend = self.blend.take()?;
                self.condition = blend.to_condition;
                self.intensity = blend.to_intensity;
                self.since_change = 0.0;
                self.burst = self.config.burst_secs.sample(rng);
                self.transitions += 1;
                log::info!(
                    "weather settled on {} (intensity {:.2})",
                    self.condition,
                    self.intensity
                );
                shift = Some(WeatherShift::Settled {
                    condition: self.condition.clone(),
                });
            }
        }

        if self.blend.is_none() && self.since_change >= self.burst {
            let next = self.sample_next(rng);
            self.since_change = 0.0;
            if next == self.condition {
                self.burst = self.config.burst_secs.sample(rng);
            } else {
                let to_intensity = self.config.intensity_range.sample(rng);
                let duration = self.config.blend_secs.sample(rng);
                log::debug!("weather blending {} -> {next} over {duration:.1}s", self.condition);
                shift = Some(WeatherShift::Began {
                    from: self.condition.clone(),
                    to: next.clone(),
                });
                self.blend = Some(Blend {
                    from: self.config.effect_for(&self.condition, self.intensity),
                    to: self.config.effect_for(&next, to_intensity),
                    from_condition: self.condition.clone(),
                    to_condition: next,
                    from_intensity: self.intensity,
                    to_intensity,
                    elapsed: 0.0,
                    duration,
                });
            }
        }

        shift
    }

    fn sample_next<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let candidates: Vec<(&str, f64)> = self
            .config
            .transition
            .get(&self.condition)
            .map(|row| {
                row.iter()
                    .filter(|(_, weight)| weight.is_finite() && **weight > 0.0)
                    .map(|(label, weight)| (label.as_str(), *weight))
                    .collect()
            })
            .unwrap_or_default();

        let total: f64 = candidates.iter().map(|(_, weight)| weight).sum();
        if candidates.is_empty() || !total.is_finite() {
            let known = self.config.known_conditions();
            if known.is_empty() {
                return self.condition.clone();
            }
            let idx = rng.gen_range(0..known.len());
            return known[idx].to_string();
        }

        let mut roll = rng.gen_range(0.0..total);
        for (label, weight) in &candidates {
            if roll < *weight {
                return (*label).to_string();
            }
            roll -= weight;
        }
        candidates
            .last()
            .map_or_else(|| self.condition.clone(), |(label, _)| (*label).to_string())
    }

    #[must_use]
    pub fn snapshot(&self) -> WeatherSnapshot {
        let effect = self.effect();
        WeatherSnapshot {
            condition: self.condition.clone(),
            intensity: self.intensity(),
            speed_multiplier: effect.speed,
            stamina_cost_multiplier: effect.stamina_cost,
            blending_to: self.blend.as_ref().map(|blend| blend.to_condition.clone()),
            blend_progress: self.blend.as_ref().map_or(0.0, Blend::progress),
        }
    }
}
