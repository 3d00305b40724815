use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    error::PredictError,
    features::FeatureVector,
    predictor::Predictor,
    types::{PredictionResult, TripInput},
};

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
    pub log_pred: bool,
}

type ApiError = (StatusCode, Json<Value>);

fn error_response(e: PredictError) -> ApiError {
    let status = match &e {
        PredictError::Pipeline(p) if p.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("prediction failed: {e}");
    } else {
        tracing::debug!("rejected input: {e}");
    }
    (status, Json(json!({ "error": e.to_string() })))
}

// Debug signal so we can confirm features are not all placeholders
fn log_features(input: &TripInput, fv: &FeatureVector) {
    let vals: Vec<f64> = fv.values().collect();
    let nz = vals.iter().filter(|x| **x != 0.0).count();
    let mean = if vals.is_empty() {
        0.0
    } else {
        vals.iter().sum::<f64>() / vals.len() as f64
    };
    let std = if vals.len() < 2 {
        0.0
    } else {
        (vals.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / vals.len() as f64).sqrt()
    };
    let sample: Vec<String> = fv
        .keys()
        .zip(&vals)
        .take(6)
        .map(|(name, v)| format!("{}={:.3}", name, v))
        .collect();
    tracing::info!(
        "recv route={} hour={} in_dim={} nonzero={} mean={:.3} std={:.3} degraded={} sample=[{}]",
        input.route,
        input.hour,
        vals.len(),
        nz,
        mean,
        std,
        fv.degraded(),
        sample.join(", ")
    );
}

// ---------- Handlers ----------

async fn predict(
    State(state): State<AppState>,
    Json(payload): Json<TripInput>,
) -> Result<Json<PredictionResult>, ApiError> {
    if state.log_pred {
        if let Ok(fv) = state.predictor.features(&payload) {
            log_features(&payload, &fv);
        }
    }
    state
        .predictor
        .predict(&payload)
        .map(Json)
        .map_err(error_response)
}

async fn predict_batch(
    State(state): State<AppState>,
    Json(payload): Json<Vec<TripInput>>,
) -> Result<Json<Vec<PredictionResult>>, ApiError> {
    state
        .predictor
        .predict_batch(&payload)
        .map(Json)
        .map_err(error_response)
}

async fn schema(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "model": state.predictor.model_name(),
        "features": state.predictor.schema().keys(),
        "degraded": state.predictor.degraded(),
    }))
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/schema", get(schema))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn input_errors_map_to_422() {
        let (status, body) = error_response(PredictError::Pipeline(PipelineError::Range {
            field: "hour",
            value: "24".into(),
            expected: "0..=23",
        }));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.0["error"].as_str().unwrap().contains("hour=24"));
    }

    #[test]
    fn schema_mismatch_maps_to_500() {
        let (status, body) = error_response(PredictError::Pipeline(PipelineError::SchemaMismatch(
            "no value computed for feature \"route_id_R4\"".into(),
        )));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.0["error"].as_str().unwrap().contains("route_id_R4"));
    }

    #[test]
    fn model_failure_maps_to_500() {
        let (status, _) = error_response(PredictError::Model(anyhow::anyhow!("backend down")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
