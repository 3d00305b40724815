use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::Path};

use crate::error::PipelineError;

/// Historical delay averages used to turn categorical inputs into ratio scores.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReferenceStats {
    pub global_mean: f64,
    pub route_mean: BTreeMap<String, f64>,
    pub hour_mean: BTreeMap<u8, f64>,
    pub day_mean: BTreeMap<u8, f64>,
    pub weather_mean: BTreeMap<String, f64>,
    /// Route frequency, already normalised to [0, 1].
    #[serde(default)]
    pub route_frequency: Option<BTreeMap<String, f64>>,
}

impl ReferenceStats {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read reference stats at {}", path.display()))?;
        let stats: ReferenceStats = serde_json::from_str(&txt)
            .with_context(|| format!("failed to parse reference stats {}", path.display()))?;
        stats.validate()?;
        tracing::info!(
            global_mean = stats.global_mean,
            routes = stats.route_mean.len(),
            hours = stats.hour_mean.len(),
            "loaded reference stats"
        );
        Ok(stats)
    }

    /// Every mean is a divisor, so all of them must be finite and positive.
    pub fn validate(&self) -> Result<()> {
        if !(self.global_mean.is_finite() && self.global_mean > 0.0) {
            bail!("global_mean must be finite and > 0, got {}", self.global_mean);
        }
        check_means("route_mean", self.route_mean.iter())?;
        check_means("hour_mean", self.hour_mean.iter())?;
        check_means("day_mean", self.day_mean.iter())?;
        check_means("weather_mean", self.weather_mean.iter())?;
        if let Some(h) = self.hour_mean.keys().find(|h| **h > 23) {
            bail!("hour_mean has key {h} outside 0..=23");
        }
        if let Some(d) = self.day_mean.keys().find(|d| **d > 6) {
            bail!("day_mean has key {d} outside 0..=6");
        }
        if let Some(freq) = &self.route_frequency {
            for (route, f) in freq {
                if !(0.0..=1.0).contains(f) {
                    bail!("route_frequency[{route}] = {f} is not in [0, 1]");
                }
            }
        }
        Ok(())
    }

    pub fn route_score(&self, route: &str) -> Result<f64, PipelineError> {
        self.ratio("route", self.route_mean.get(route), route)
    }

    pub fn hour_score(&self, hour: u8) -> Result<f64, PipelineError> {
        self.ratio("hour", self.hour_mean.get(&hour), hour)
    }

    pub fn day_score(&self, day: u8) -> Result<f64, PipelineError> {
        self.ratio("day_of_week", self.day_mean.get(&day), day)
    }

    pub fn weather_score(&self, weather: &str) -> Result<f64, PipelineError> {
        self.ratio("weather", self.weather_mean.get(weather), weather)
    }

    /// Frequency for `route`, or `None` when no frequency table was loaded.
    pub fn route_frequency(&self, route: &str) -> Option<Result<f64, PipelineError>> {
        self.route_frequency.as_ref().map(|freq| {
            freq.get(route)
                .copied()
                .ok_or_else(|| PipelineError::unknown("route", route))
        })
    }

    fn ratio(
        &self,
        dimension: &'static str,
        mean: Option<&f64>,
        value: impl ToString,
    ) -> Result<f64, PipelineError> {
        mean.map(|m| self.global_mean / m)
            .ok_or_else(|| PipelineError::unknown(dimension, value.to_string()))
    }
}

fn check_means<'a, K: std::fmt::Display + 'a>(
    name: &str,
    entries: impl Iterator<Item = (&'a K, &'a f64)>,
) -> Result<()> {
    for (k, v) in entries {
        if !(v.is_finite() && *v > 0.0) {
            bail!("{name}[{k}] must be finite and > 0, got {v}");
        }
    }
    Ok(())
}
