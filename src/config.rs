use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::{
    features::{Encoding, Location},
    schema::FeatureSchema,
    scoring::{CategoryThresholds, MinutesBasis},
};

fn default_max_passengers() -> i64 {
    500
}

fn default_routes() -> Vec<String> {
    ["R1", "R2", "R3", "R4"].map(String::from).to_vec()
}

/// Per-artifact deployment settings, read from JSON next to the model.
#[derive(Deserialize, Debug, Clone)]
pub struct DeploymentConfig {
    /// Authoritative input order.
    pub features: FeatureSchema,
    #[serde(default)]
    pub in_dim: Option<usize>,
    /// No default: 300 and 500 have both been used to train models.
    pub passenger_scale: f64,
    #[serde(default = "default_max_passengers")]
    pub max_passengers: i64,
    #[serde(default = "default_routes")]
    pub routes: Vec<String>,
    #[serde(default)]
    pub default_location: Location,
    pub minutes_basis: MinutesBasis,
    pub thresholds: CategoryThresholds,
}

impl DeploymentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("config file not found at {}", path.display()))?;
        Self::from_json(&data).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let cfg: DeploymentConfig = serde_json::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.passenger_scale.is_finite() && self.passenger_scale > 0.0) {
            bail!("passenger_scale must be > 0, got {}", self.passenger_scale);
        }
        if self.max_passengers < 1 {
            bail!("max_passengers must be >= 1, got {}", self.max_passengers);
        }
        if self.routes.is_empty() {
            bail!("routes must not be empty");
        }
        if let Some(in_dim) = self.in_dim {
            if in_dim != self.features.len() {
                bail!(
                    "in_dim ({}) != features.len() ({}); the model input width must match the schema",
                    in_dim,
                    self.features.len()
                );
            }
        }
        self.thresholds.validate()
    }

    /// Width of one model input row.
    pub fn input_width(&self) -> usize {
        self.in_dim.unwrap_or(self.features.len())
    }

    pub fn encoding(&self) -> Encoding {
        Encoding {
            passenger_scale: self.passenger_scale,
            max_passengers: self.max_passengers,
            routes: self.routes.clone(),
            default_location: self.default_location,
        }
    }
}

/// Process settings taken from the environment.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub config_path: String,
    pub model_path: String,
    pub stats_path: Option<String>,
    pub port: u16,
    pub log_pred: bool,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            config_path: std::env::var("CONFIG_PATH").context("CONFIG_PATH not set")?,
            model_path: std::env::var("MODEL_PATH").context("MODEL_PATH not set")?,
            stats_path: std::env::var("STATS_PATH").ok().filter(|s| !s.is_empty()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            log_pred: std::env::var("LOG_PRED").ok().as_deref() == Some("1"),
        })
    }
}
