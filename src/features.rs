//! Raw trip attributes -> model feature vector.
//!
//! Everything here is pure. The only per-deployment knobs live in
//! [`Encoding`]; the column set and order come from the [`FeatureSchema`].

use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use std::f64::consts::PI;

use crate::{
    error::PipelineError,
    schema::{FeatureSchema, ROUTE_ONE_HOT_PREFIX},
    stats::ReferenceStats,
    types::{TripInput, Weather},
};

/// Score substituted for every categorical ratio when no stats are loaded.
pub const PLACEHOLDER_SCORE: f64 = 1.0;
/// Route frequency used when no frequency table is available.
pub const PLACEHOLDER_ROUTE_FREQUENCY: f64 = 0.5;

/// Features computed for every trip regardless of configuration.
pub const BASE_FEATURES: [&str; 12] = [
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
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            latitude: 24.5,
            longitude: 32.5,
        }
    }
}

/// Constants pinned to one trained model artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    /// Divisor for `passenger_count_scaled`. Must match what the model was fit with.
    pub passenger_scale: f64,
    pub max_passengers: i64,
    pub routes: Vec<String>,
    pub default_location: Location,
}

impl Encoding {
    pub fn new(passenger_scale: f64) -> Self {
        Self {
            passenger_scale,
            max_passengers: 500,
            routes: ["R1", "R2", "R3", "R4"].map(String::from).to_vec(),
            default_location: Location::default(),
        }
    }

    fn check_route<'a>(&self, route: &'a str) -> Result<&'a str, PipelineError> {
        if self.routes.iter().any(|r| r == route) {
            Ok(route)
        } else {
            Err(PipelineError::unknown("route", route))
        }
    }

    /// Every feature name `derive_features` can produce under this encoding.
    pub fn computable_features(&self) -> Vec<String> {
        BASE_FEATURES
            .iter()
            .map(|f| f.to_string())
            .chain(self.routes.iter().map(|r| format!("{ROUTE_ONE_HOT_PREFIX}{r}")))
            .chain(Weather::ALL.into_iter().map(Weather::column))
            .collect()
    }

    /// Reject a schema naming any feature this encoding cannot compute.
    pub fn check_schema(&self, schema: &FeatureSchema) -> Result<(), PipelineError> {
        let computable = self.computable_features();
        let missing: Vec<&str> = schema
            .keys()
            .iter()
            .filter(|k| !computable.contains(k))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::SchemaMismatch(format!(
                "schema names features that cannot be computed: {missing:?}"
            )))
        }
    }
}

/// Ordered `(name, value)` pairs handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
    degraded: bool,
}

impl FeatureVector {
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when categorical scores are placeholders, not data-derived.
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    pub fn to_row(&self) -> Vec<f32> {
        self.entries.iter().map(|(_, v)| *v as f32).collect()
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

pub fn hour_sin(hour: f64) -> f64 {
    (2.0 * PI * hour / 24.0).sin()
}

pub fn hour_cos(hour: f64) -> f64 {
    (2.0 * PI * hour / 24.0).cos()
}

/// Inverse of the cyclic hour encoding, in [0, 24).
pub fn decode_hour(sin: f64, cos: f64) -> f64 {
    let h = sin.atan2(cos) * 24.0 / (2.0 * PI);
    if h < 0.0 {
        h + 24.0
    } else {
        h
    }
}

pub fn is_weekend(day: i64) -> Result<f64, PipelineError> {
    match day {
        0..=4 => Ok(0.0),
        5 | 6 => Ok(1.0),
        _ => Err(PipelineError::range("day_of_week", day, "0..=6")),
    }
}

pub fn scale_passengers(count: i64, passenger_scale: f64) -> f64 {
    count as f64 / passenger_scale
}

fn check_hour(hour: i32) -> Result<u8, PipelineError> {
    if (0..=23).contains(&hour) {
        Ok(hour as u8)
    } else {
        Err(PipelineError::range("hour", hour, "0..=23"))
    }
}

fn check_coordinate(field: &'static str, v: f64) -> Result<f64, PipelineError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(PipelineError::range(field, v, "a finite number"))
    }
}

/// Build the model input for one trip.
///
/// Keys come out in exactly `schema` order. A schema key this function does
/// not know how to compute is a [`PipelineError::SchemaMismatch`]; computed
/// keys the schema does not list are dropped with a warning.
pub fn derive_features(
    input: &TripInput,
    stats: Option<&ReferenceStats>,
    schema: &FeatureSchema,
    encoding: &Encoding,
) -> Result<FeatureVector, PipelineError> {
    let route = encoding.check_route(&input.route)?;
    let hour = check_hour(input.hour)?;
    let day = input.day_of_week.resolve()?;
    let weather: Weather = input.weather.parse()?;
    if input.passenger_count <= 0 || input.passenger_count > encoding.max_passengers {
        return Err(PipelineError::range(
            "passenger_count",
            input.passenger_count,
            "1..=max_passengers",
        ));
    }
    let latitude = check_coordinate(
        "latitude",
        input.latitude.unwrap_or(encoding.default_location.latitude),
    )?;
    let longitude = check_coordinate(
        "longitude",
        input.longitude.unwrap_or(encoding.default_location.longitude),
    )?;

    let (scores, route_frequency) = match stats {
        Some(s) => (
            [
                s.route_score(route)?,
                s.hour_score(hour)?,
                s.day_score(day)?,
                s.weather_score(weather.as_str())?,
            ],
            s.route_frequency(route)
                .transpose()?
                .unwrap_or(PLACEHOLDER_ROUTE_FREQUENCY),
        ),
        None => ([PLACEHOLDER_SCORE; 4], PLACEHOLDER_ROUTE_FREQUENCY),
    };

    let h = f64::from(hour);
    let base = [
        latitude,
        longitude,
        hour_sin(h),
        hour_cos(h),
        is_weekend(i64::from(day))?,
        scale_passengers(input.passenger_count, encoding.passenger_scale),
        scores[0],
        scores[1],
        scores[2],
        scores[3],
        route_frequency,
        weather.severity(),
    ];
    let mut computed: Vec<(String, f64)> = BASE_FEATURES
        .iter()
        .zip(base)
        .map(|(name, v)| (name.to_string(), v))
        .collect();

    if schema.wants_route_one_hot() {
        for r in &encoding.routes {
            let hot = if r == route { 1.0 } else { 0.0 };
            computed.push((format!("{ROUTE_ONE_HOT_PREFIX}{r}"), hot));
        }
    }
    if schema.wants_weather_one_hot() {
        for w in Weather::ALL {
            computed.push((w.column(), if w == weather { 1.0 } else { 0.0 }));
        }
    }

    assemble(computed, schema, stats.is_none())
}

fn assemble(
    mut computed: Vec<(String, f64)>,
    schema: &FeatureSchema,
    degraded: bool,
) -> Result<FeatureVector, PipelineError> {
    let mut entries = Vec::with_capacity(schema.len());
    for key in schema.keys() {
        let idx = computed
            .iter()
            .position(|(k, _)| k == key)
            .ok_or_else(|| {
                PipelineError::SchemaMismatch(format!("no value computed for feature {key:?}"))
            })?;
        entries.push(computed.swap_remove(idx));
    }

    if !computed.is_empty() {
        let dropped: Vec<&str> = computed.iter().map(|(k, _)| k.as_str()).collect();
        tracing::warn!(?dropped, "computed features not in schema were dropped");
    }

    Ok(FeatureVector { entries, degraded })
}
