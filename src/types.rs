use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::PipelineError;

pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Raw trip attributes as submitted by a caller. Nothing here is validated
/// yet; `derive_features` does that.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TripInput {
    pub route: String,
    pub hour: i32,
    pub day_of_week: DayInput,
    pub weather: String,
    pub passenger_count: i64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Day of week either as an index (Monday=0) or an English day name.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DayInput {
    Index(i64),
    Name(String),
}

impl DayInput {
    /// Resolve to an index in 0..=6.
    pub fn resolve(&self) -> Result<u8, PipelineError> {
        match self {
            DayInput::Index(d) if (0..=6).contains(d) => Ok(*d as u8),
            DayInput::Index(d) => Err(PipelineError::range("day_of_week", d, "0..=6")),
            DayInput::Name(name) => DAY_NAMES
                .iter()
                .position(|n| n.eq_ignore_ascii_case(name.trim()))
                .map(|i| i as u8)
                .ok_or_else(|| PipelineError::unknown("day_of_week", name.as_str())),
        }
    }
}

/// Weather conditions, ordered by expected disruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Weather {
    Sunny,
    Cloudy,
    Rainy,
}

impl Weather {
    pub const ALL: [Weather; 3] = [Weather::Sunny, Weather::Rainy, Weather::Cloudy];

    pub fn severity(self) -> f64 {
        match self {
            Weather::Sunny => 0.0,
            Weather::Cloudy => 1.0,
            Weather::Rainy => 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Weather::Sunny => "Sunny",
            Weather::Cloudy => "Cloudy",
            Weather::Rainy => "Rainy",
        }
    }

    /// Name of the one-hot column for this condition.
    pub fn column(self) -> String {
        format!("weather_{}", self.as_str().to_ascii_lowercase())
    }
}

impl FromStr for Weather {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Weather::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::unknown("weather", s))
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayCategory {
    Low,
    Medium,
    High,
}

impl DelayCategory {
    pub fn label(self) -> &'static str {
        match self {
            DelayCategory::Low => "Low Delay",
            DelayCategory::Medium => "Medium Delay",
            DelayCategory::High => "High Delay",
        }
    }
}

impl fmt::Display for DelayCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub raw_score: f64,
    pub estimated_minutes: f64,
    pub category: DelayCategory,
    pub label: String,
    /// Set when scores were placeholders rather than derived from reference stats.
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_names_resolve_case_insensitively() {
        assert_eq!(DayInput::Name("monday".into()).resolve().unwrap(), 0);
        assert_eq!(DayInput::Name(" Sunday ".into()).resolve().unwrap(), 6);
        assert!(matches!(
            DayInput::Name("Funday".into()).resolve(),
            Err(PipelineError::UnknownCategory { dimension: "day_of_week", .. })
        ));
    }

    #[test]
    fn day_index_out_of_range() {
        assert!(matches!(
            DayInput::Index(7).resolve(),
            Err(PipelineError::Range { field: "day_of_week", .. })
        ));
        assert!(DayInput::Index(-1).resolve().is_err());
    }

    #[test]
    fn weather_parsing_and_severity() {
        assert_eq!("rainy".parse::<Weather>().unwrap(), Weather::Rainy);
        assert_eq!(Weather::Sunny.severity(), 0.0);
        assert_eq!(Weather::Cloudy.severity(), 1.0);
        assert_eq!(Weather::Rainy.severity(), 2.0);
        assert_eq!(Weather::Cloudy.column(), "weather_cloudy");
        assert!("Snowy".parse::<Weather>().is_err());
    }

    #[test]
    fn trip_input_accepts_day_as_name_or_number() {
        let a: TripInput = serde_json::from_str(
            r#"{"route":"R1","hour":8,"day_of_week":"Friday","weather":"Sunny","passenger_count":10}"#,
        )
        .unwrap();
        assert_eq!(a.day_of_week, DayInput::Name("Friday".into()));
        assert!(a.latitude.is_none());

        let b: TripInput = serde_json::from_str(
            r#"{"route":"R1","hour":8,"day_of_week":4,"weather":"Sunny","passenger_count":10,"latitude":1.5}"#,
        )
        .unwrap();
        assert_eq!(b.day_of_week, DayInput::Index(4));
        assert_eq!(b.latitude, Some(1.5));
    }

    #[test]
    fn categories_are_ordered() {
        assert!(DelayCategory::Low < DelayCategory::Medium);
        assert!(DelayCategory::Medium < DelayCategory::High);
        assert_eq!(serde_json::to_string(&DelayCategory::High).unwrap(), "\"high\"");
    }
}
