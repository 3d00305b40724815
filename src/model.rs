use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::features::FeatureVector;

/// Opaque regression model: one score per feature row.
pub trait DelayModel: Send + Sync {
    fn name(&self) -> &str;

    /// Column names the model was fit on, when the artifact records them.
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<f64>>;
}

#[derive(Deserialize)]
struct LinearJson {
    name: String,
    intercept: f64,
    /// Ordered list of `[feature, weight]` pairs.
    weights: Vec<(String, f64)>,
    clamp: Option<(f64, f64)>,
}

/// `intercept + Σ wᵢ·xᵢ`, optionally clamped. Stored as JSON.
pub struct LinearModel {
    name: String,
    intercept: f64,
    names: Vec<String>,
    weights: Vec<f64>,
    clamp: Option<(f64, f64)>,
}

impl LinearModel {
    pub fn new(
        name: impl Into<String>,
        intercept: f64,
        weights: impl IntoIterator<Item = (String, f64)>,
    ) -> Self {
        let (names, weights): (Vec<String>, Vec<f64>) = weights.into_iter().unzip();
        Self {
            name: name.into(),
            intercept,
            names,
            weights,
            clamp: None,
        }
    }

    pub fn with_clamp(mut self, lo: f64, hi: f64) -> Self {
        self.clamp = Some((lo, hi));
        self
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read linear model at {}", path.display()))?;
        let raw: LinearJson =
            serde_json::from_str(&txt).with_context(|| "failed to parse linear model JSON")?;
        if let Some((lo, hi)) = raw.clamp {
            if lo > hi {
                bail!("linear model clamp [{lo}, {hi}] is empty");
            }
        }
        let mut model = Self::new(raw.name, raw.intercept, raw.weights);
        model.clamp = raw.clamp;
        Ok(model)
    }
}

impl DelayModel for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> Option<&[String]> {
        Some(&self.names)
    }

    fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.weights.len() {
                    bail!(
                        "feature length mismatch: got {}, expected {}",
                        row.len(),
                        self.weights.len()
                    );
                }
                let s = self.intercept
                    + self
                        .weights
                        .iter()
                        .zip(row.values())
                        .map(|(w, x)| w * x)
                        .sum::<f64>();
                Ok(match self.clamp {
                    Some((lo, hi)) => s.clamp(lo, hi),
                    None => s,
                })
            })
            .collect()
    }
}

/// Load a model, picking the backend from the file extension. `in_dim` is
/// the schema width, used to probe backends that cannot report their columns.
pub fn load_model(path: &str, in_dim: usize) -> Result<Box<dyn DelayModel>> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "json" => Ok(Box::new(LinearModel::load(path)?)),
        #[cfg(feature = "torch")]
        "pt" | "ts" => Ok(Box::new(torch::TorchModel::load(path)?.probe(in_dim)?)),
        #[cfg(not(feature = "torch"))]
        "pt" | "ts" => {
            let _ = in_dim;
            bail!("{path} is a TorchScript model; rebuild with --features torch")
        }
        other => bail!("unsupported model format {other:?} for {path}"),
    }
}

#[cfg(feature = "torch")]
pub mod torch {
    use super::*;
    use tch::{kind::Kind, CModule, Device, Tensor};

    /// TorchScript regression model taking `[B, D]` and returning `[B]` or `[B, 1]`.
    pub struct TorchModel {
        name: String,
        model: CModule,
        device: Device,
        in_dim: Option<usize>,
    }

    impl TorchModel {
        pub fn load(model_path: &str) -> Result<Self> {
            let device = Device::Cpu;
            let model = CModule::load_on_device(model_path, device)
                .with_context(|| format!("failed to load TorchScript {}", model_path))?;
            Ok(Self {
                name: model_path.to_string(),
                model,
                device,
                in_dim: None,
            })
        }

        /// Probe the output shape with a dummy forward; expect one score per row.
        pub fn probe(mut self, in_dim: usize) -> Result<Self> {
            let dummy = Tensor::zeros([1, in_dim as i64], (Kind::Float, self.device));
            let t = self.model.forward_ts(&[dummy])?;
            let sz = t.size();
            if !(sz == [1] || sz == [1, 1]) {
                bail!("unexpected model output size: {:?}", sz);
            }
            self.in_dim = Some(in_dim);
            Ok(self)
        }
    }

    impl DelayModel for TorchModel {
        fn name(&self) -> &str {
            &self.name
        }

        fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
            let Some(first) = rows.first() else {
                return Ok(Vec::new());
            };
            let dim = first.len();
            if let Some(expected) = self.in_dim {
                if dim != expected {
                    bail!("feature length mismatch: got {}, expected {}", dim, expected);
                }
            }
            let flat: Vec<f32> = rows.iter().flat_map(|r| r.to_row()).collect();
            let input = Tensor::from_slice(&flat)
                .reshape([rows.len() as i64, dim as i64])
                .to_device(self.device);

            let out = self.model.forward_ts(&[input])?.to_kind(Kind::Double).reshape([-1]);
            let scores = Vec::<f64>::try_from(&out)?;
            if scores.len() != rows.len() {
                bail!("model returned {} scores for {} rows", scores.len(), rows.len());
            }
            Ok(scores)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        features::{derive_features, Encoding},
        schema::FeatureSchema,
        types::{DayInput, TripInput},
    };

    fn row(schema: &FeatureSchema) -> FeatureVector {
        let trip = TripInput {
            route: "R2".into(),
            hour: 6,
            day_of_week: DayInput::Index(5),
            weather: "Rainy".into(),
            passenger_count: 250,
            latitude: None,
            longitude: None,
        };
        derive_features(&trip, None, schema, &Encoding::new(500.0)).unwrap()
    }

    #[test]
    fn linear_model_dot_product() {
        let schema = FeatureSchema::new(["is_weekend", "weather_severity", "passenger_count_scaled"])
            .unwrap();
        let m = LinearModel::new(
            "tiny",
            0.1,
            [
                ("is_weekend".to_string(), 0.2),
                ("weather_severity".to_string(), 0.3),
                ("passenger_count_scaled".to_string(), 1.0),
            ],
        );
        // 0.1 + 0.2*1 + 0.3*2 + 1.0*0.5
        let out = m.predict(&[row(&schema)]).unwrap();
        assert!((out[0] - 1.4).abs() < 1e-12);

        let clamped = m.with_clamp(0.0, 1.0).predict(&[row(&schema)]).unwrap();
        assert_eq!(clamped, vec![1.0]);
    }

    #[test]
    fn linear_model_rejects_wrong_width() {
        let m = LinearModel::new("w", 0.0, [("hour_sin".to_string(), 1.0)]);
        let schema = FeatureSchema::new(["hour_sin", "hour_cos"]).unwrap();
        assert!(m.predict(&[row(&schema)]).is_err());
    }

    #[test]
    fn unknown_extension_rejected() {
        assert!(load_model("model.pkl", 3).is_err());
    }
}
