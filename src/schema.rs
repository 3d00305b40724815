//! Ordered feature names a deployed model was fit on.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::PipelineError;

pub const ROUTE_ONE_HOT_PREFIX: &str = "route_id_";
pub const WEATHER_ONE_HOT_PREFIX: &str = "weather_";

/// Column order of the location-aware model with route and weather one-hots.
pub const DEFAULT_FEATURES: [&str; 19] = [
    "latitude",
    "longitude",
    "hour_sin",
    "hour_cos",
    "is_weekend",
    "passenger_count_scaled",
    "score_route",
    "score_hour",
    "score_day",
    "score_weather",
    "route_frequency_scaled",
    "weather_severity",
    "route_id_R1",
    "route_id_R2",
    "route_id_R3",
    "route_id_R4",
    "weather_sunny",
    "weather_rainy",
    "weather_cloudy",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    features: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty lists and duplicate names.
    pub fn new<I, S>(features: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let features: Vec<String> = features.into_iter().map(Into::into).collect();
        if features.is_empty() {
            return Err(PipelineError::SchemaMismatch("schema declares no features".into()));
        }
        let mut seen = HashSet::with_capacity(features.len());
        for f in &features {
            if !seen.insert(f.as_str()) {
                return Err(PipelineError::SchemaMismatch(format!(
                    "feature {f:?} declared twice"
                )));
            }
        }
        Ok(Self { features })
    }

    pub fn keys(&self) -> &[String] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.iter().any(|f| f == name)
    }

    pub fn wants_route_one_hot(&self) -> bool {
        self.features.iter().any(|f| f.starts_with(ROUTE_ONE_HOT_PREFIX))
    }

    pub fn wants_weather_one_hot(&self) -> bool {
        // weather_severity shares the prefix but is not a one-hot column
        self.features
            .iter()
            .any(|f| f.starts_with(WEATHER_ONE_HOT_PREFIX) && f != "weather_severity")
    }

    /// Check that `names` is exactly this schema, same names in the same order.
    pub fn check_columns(&self, names: &[String]) -> Result<(), PipelineError> {
        if names.len() != self.features.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "got {} columns, expected {}",
                names.len(),
                self.features.len()
            )));
        }
        for (i, (got, want)) in names.iter().zip(&self.features).enumerate() {
            if got != want {
                return Err(PipelineError::SchemaMismatch(format!(
                    "column {i} is {got:?}, expected {want:?}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            features: DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = PipelineError;

    fn try_from(v: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(s: FeatureSchema) -> Self {
        s.features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicates_and_empty() {
        assert!(FeatureSchema::new(["hour_sin", "hour_sin"]).is_err());
        assert!(FeatureSchema::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn one_hot_detection() {
        let s = FeatureSchema::new(["hour_sin", "weather_severity"]).unwrap();
        assert!(!s.wants_route_one_hot());
        assert!(!s.wants_weather_one_hot());

        let d = FeatureSchema::default();
        assert!(d.wants_route_one_hot());
        assert!(d.wants_weather_one_hot());
        assert_eq!(d.len(), 19);
    }

    #[test]
    fn column_check_reports_first_difference() {
        let s = FeatureSchema::new(["a", "b"]).unwrap();
        assert!(s.check_columns(&["a".into(), "b".into()]).is_ok());
        let err = s.check_columns(&["b".into(), "a".into()]).unwrap_err();
        assert_eq!(
            err,
            PipelineError::SchemaMismatch("column 0 is \"b\", expected \"a\"".into())
        );
    }

    #[test]
    fn deserializes_from_plain_list() {
        let s: FeatureSchema = serde_json::from_str(r#"["hour_sin","hour_cos"]"#).unwrap();
        assert_eq!(s.keys(), ["hour_sin", "hour_cos"]);
        assert!(serde_json::from_str::<FeatureSchema>(r#"["x","x"]"#).is_err());
    }
}
