use anyhow::{Context, Result};

use crate::{
    config::DeploymentConfig,
    error::{PipelineError, PredictError},
    features::{derive_features, Encoding, FeatureVector},
    model::DelayModel,
    schema::FeatureSchema,
    scoring::{interpret, CategoryThresholds, MinutesBasis},
    stats::ReferenceStats,
    types::{DayInput, PredictionResult, TripInput, Weather},
};

/// Everything one prediction needs, built once at start-up and shared
/// read-only between requests.
pub struct Predictor {
    model: Box<dyn DelayModel>,
    stats: Option<ReferenceStats>,
    schema: FeatureSchema,
    encoding: Encoding,
    minutes_basis: f64,
    thresholds: CategoryThresholds,
}

impl Predictor {
    pub fn new(
        model: Box<dyn DelayModel>,
        stats: Option<ReferenceStats>,
        schema: FeatureSchema,
        encoding: Encoding,
        minutes_basis: MinutesBasis,
        thresholds: CategoryThresholds,
    ) -> Result<Self> {
        if let Some(names) = model.feature_names() {
            schema
                .check_columns(names)
                .with_context(|| format!("model {} does not match feature schema", model.name()))?;
        }
        encoding.check_schema(&schema)?;
        thresholds.validate()?;
        let minutes_basis = minutes_basis.resolve(stats.as_ref())?;
        if stats.is_none() {
            tracing::warn!("no reference stats loaded; categorical scores use placeholder constants");
        }
        Ok(Self {
            model,
            stats,
            schema,
            encoding,
            minutes_basis,
            thresholds,
        })
    }

    pub fn from_config(
        cfg: &DeploymentConfig,
        model: Box<dyn DelayModel>,
        stats: Option<ReferenceStats>,
    ) -> Result<Self> {
        Self::new(
            model,
            stats,
            cfg.features.clone(),
            cfg.encoding(),
            cfg.minutes_basis,
            cfg.thresholds.clone(),
        )
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// True when running without reference stats.
    pub fn degraded(&self) -> bool {
        self.stats.is_none()
    }

    /// A trip every category lookup can resolve: only values present in the
    /// reference stats are picked when stats are loaded.
    pub fn warmup_trip(&self) -> Result<TripInput> {
        let route = match &self.stats {
            Some(s) => self.encoding.routes.iter().find(|r| {
                s.route_mean.contains_key(*r)
                    && s.route_frequency.as_ref().map_or(true, |f| f.contains_key(*r))
            }),
            None => self.encoding.routes.first(),
        }
        .context("no configured route has reference stats")?;
        let hour = match &self.stats {
            Some(s) => *s.hour_mean.keys().next().context("hour_mean is empty")?,
            None => 8,
        };
        let day = match &self.stats {
            Some(s) => *s.day_mean.keys().next().context("day_mean is empty")?,
            None => 0,
        };
        let weather = match &self.stats {
            Some(s) => Weather::ALL
                .into_iter()
                .find(|w| s.weather_mean.contains_key(w.as_str()))
                .context("weather_mean has no known condition")?,
            None => Weather::Sunny,
        };
        Ok(TripInput {
            route: route.clone(),
            hour: i32::from(hour),
            day_of_week: DayInput::Index(i64::from(day)),
            weather: weather.as_str().to_string(),
            passenger_count: 1,
            latitude: None,
            longitude: None,
        })
    }

    /// Run one prediction end to end so a broken deployment fails at start-up.
    pub fn warmup(&self) -> Result<PredictionResult> {
        let trip = self.warmup_trip()?;
        self.predict(&trip)
            .map_err(|e| anyhow::anyhow!("warmup prediction failed: {e}"))
    }

    pub fn features(&self, input: &TripInput) -> Result<FeatureVector, PipelineError> {
        derive_features(input, self.stats.as_ref(), &self.schema, &self.encoding)
    }

    pub fn predict(&self, input: &TripInput) -> Result<PredictionResult, PredictError> {
        let row = self.features(input)?;
        let mut out = self.score(std::slice::from_ref(&row))?;
        Ok(out.remove(0))
    }

    /// Derive every row first so a bad input fails before the model is called.
    pub fn predict_batch(
        &self,
        inputs: &[TripInput],
    ) -> Result<Vec<PredictionResult>, PredictError> {
        let rows = inputs
            .iter()
            .map(|i| self.features(i))
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.score(&rows)
    }

    fn score(&self, rows: &[FeatureVector]) -> Result<Vec<PredictionResult>, PredictError> {
        for row in rows {
            if row.len() != self.schema.len() {
                return Err(PipelineError::SchemaMismatch(format!(
                    "row has {} features, schema has {}",
                    row.len(),
                    self.schema.len()
                ))
                .into());
            }
        }
        let scores = self.model.predict(rows).map_err(PredictError::Model)?;
        if scores.len() != rows.len() {
            return Err(PredictError::Model(anyhow::anyhow!(
                "model returned {} scores for {} rows",
                scores.len(),
                rows.len()
            )));
        }
        scores
            .into_iter()
            .zip(rows)
            .map(|(s, row)| -> Result<PredictionResult, PredictError> {
                let mut r = interpret(s, self.minutes_basis, &self.thresholds)?;
                r.degraded = row.degraded();
                Ok(r)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearModel;

    struct Fixed(f64);

    impl DelayModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
            Ok(vec![self.0; rows.len()])
        }
    }

    struct Short;

    impl DelayModel for Short {
        fn name(&self) -> &str {
            "short"
        }

        fn predict(&self, _rows: &[FeatureVector]) -> Result<Vec<f64>> {
            Ok(Vec::new())
        }
    }

    fn trip(route: &str) -> TripInput {
        TripInput {
            route: route.into(),
            hour: 17,
            day_of_week: DayInput::Name("Tuesday".into()),
            weather: "Cloudy".into(),
            passenger_count: 120,
            latitude: None,
            longitude: None,
        }
    }

    fn predictor(model: Box<dyn DelayModel>) -> Predictor {
        Predictor::new(
            model,
            None,
            FeatureSchema::default(),
            Encoding::new(500.0),
            MinutesBasis::Fixed(60.0),
            CategoryThresholds::minutes_preset(),
        )
        .unwrap()
    }

    #[test]
    fn predicts_minutes_and_category() {
        let p = predictor(Box::new(Fixed(0.5)));
        let r = p.predict(&trip("R3")).unwrap();
        assert_eq!(r.estimated_minutes, 30.0);
        assert_eq!(r.label, "Medium Delay");
        assert!(r.degraded);
    }

    #[test]
    fn batch_fails_before_model_on_bad_row() {
        let p = predictor(Box::new(Fixed(0.1)));
        let err = p.predict_batch(&[trip("R1"), trip("X")]).unwrap_err();
        assert!(matches!(
            err,
            PredictError::Pipeline(PipelineError::UnknownCategory { dimension: "route", .. })
        ));
        assert!(p.predict_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn short_model_output_is_a_model_error() {
        let p = predictor(Box::new(Short));
        assert!(matches!(p.predict(&trip("R1")), Err(PredictError::Model(_))));
    }

    #[test]
    fn model_columns_must_match_schema() {
        let model = LinearModel::new("lm", 0.0, [("hour_cos".to_string(), 1.0)]);
        let res = Predictor::new(
            Box::new(model),
            None,
            FeatureSchema::new(["hour_sin"]).unwrap(),
            Encoding::new(500.0),
            MinutesBasis::Fixed(60.0),
            CategoryThresholds::minutes_preset(),
        );
        assert!(res.is_err());
    }

    #[test]
    fn schema_must_be_computable() {
        let encoding = Encoding {
            routes: ["R1", "R2", "R3"].map(String::from).to_vec(),
            ..Encoding::new(500.0)
        };
        let res = Predictor::new(
            Box::new(Fixed(0.2)),
            None,
            FeatureSchema::new(["hour_sin", "route_id_R4", "hour_sine"]).unwrap(),
            encoding,
            MinutesBasis::Fixed(60.0),
            CategoryThresholds::minutes_preset(),
        );
        let err = res.err().expect("unfillable schema accepted");
        let mismatch = err.downcast_ref::<PipelineError>().expect("schema error");
        assert!(matches!(
            mismatch,
            PipelineError::SchemaMismatch(m) if m.contains("route_id_R4") && m.contains("hour_sine")
        ));
    }

    #[test]
    fn warmup_uses_values_known_to_stats() {
        let stats: ReferenceStats = serde_json::from_str(
            r#"{
                "global_mean": 20.0,
                "route_mean": {"R3": 10.0},
                "hour_mean": {"14": 25.0},
                "day_mean": {"5": 20.0},
                "weather_mean": {"Rainy": 40.0}
            }"#,
        )
        .unwrap();
        let p = Predictor::new(
            Box::new(Fixed(0.1)),
            Some(stats),
            FeatureSchema::default(),
            Encoding::new(500.0),
            MinutesBasis::GlobalMean,
            CategoryThresholds::ratio_preset(),
        )
        .unwrap();
        let trip = p.warmup_trip().unwrap();
        assert_eq!(trip.route, "R3");
        assert_eq!(trip.hour, 14);
        assert_eq!(trip.day_of_week, DayInput::Index(5));
        assert_eq!(trip.weather, "Rainy");
        let r = p.warmup().unwrap();
        assert!(!r.degraded);
        assert_eq!(r.estimated_minutes, 2.0);
    }

    #[test]
    fn warmup_fails_when_stats_cover_no_route() {
        let stats: ReferenceStats = serde_json::from_str(
            r#"{
                "global_mean": 20.0,
                "route_mean": {"R9": 10.0},
                "hour_mean": {"8": 25.0},
                "day_mean": {"0": 20.0},
                "weather_mean": {"Sunny": 40.0}
            }"#,
        )
        .unwrap();
        let p = Predictor::new(
            Box::new(Fixed(0.1)),
            Some(stats),
            FeatureSchema::default(),
            Encoding::new(500.0),
            MinutesBasis::Fixed(60.0),
            CategoryThresholds::minutes_preset(),
        )
        .unwrap();
        assert!(p.warmup().is_err());
    }

    #[test]
    fn global_mean_basis_needs_stats() {
        let res = Predictor::new(
            Box::new(Fixed(1.0)),
            None,
            FeatureSchema::default(),
            Encoding::new(500.0),
            MinutesBasis::GlobalMean,
            CategoryThresholds::ratio_preset(),
        );
        assert!(res.is_err());
    }
}
