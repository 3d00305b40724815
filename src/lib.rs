//! Transit delay prediction: trip attributes -> model features -> delay category.

pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod predictor;
pub mod schema;
pub mod scoring;
pub mod server;
pub mod stats;
pub mod types;

pub use error::{PipelineError, PredictError};
pub use features::{derive_features, Encoding, FeatureVector, Location};
pub use model::{load_model, DelayModel, LinearModel};
pub use predictor::Predictor;
pub use schema::FeatureSchema;
pub use scoring::{interpret, Band, CategoryThresholds, MinutesBasis, ThresholdMetric};
pub use stats::ReferenceStats;
pub use types::{DayInput, DelayCategory, PredictionResult, TripInput, Weather};
