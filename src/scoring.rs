use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::{
    error::PipelineError,
    stats::ReferenceStats,
    types::{DelayCategory, PredictionResult},
};

/// Which quantity the thresholds are compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMetric {
    Minutes,
    RawScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Exclusive upper bound.
    pub below: f64,
    pub category: DelayCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryThresholds {
    pub metric: ThresholdMetric,
    pub bands: Vec<Band>,
    /// Category for values at or above the last band.
    pub otherwise: DelayCategory,
}

impl CategoryThresholds {
    /// `<20` min Low, `<40` min Medium, else High.
    pub fn minutes_preset() -> Self {
        Self {
            metric: ThresholdMetric::Minutes,
            bands: vec![
                Band {
                    below: 20.0,
                    category: DelayCategory::Low,
                },
                Band {
                    below: 40.0,
                    category: DelayCategory::Medium,
                },
            ],
            otherwise: DelayCategory::High,
        }
    }

    /// `<0.9` Low, `<1.2` Medium, else High, on the raw ratio score.
    pub fn ratio_preset() -> Self {
        Self {
            metric: ThresholdMetric::RawScore,
            bands: vec![
                Band {
                    below: 0.9,
                    category: DelayCategory::Low,
                },
                Band {
                    below: 1.2,
                    category: DelayCategory::Medium,
                },
            ],
            otherwise: DelayCategory::High,
        }
    }

    /// Bounds must strictly ascend and categories must never step down,
    /// `otherwise` included.
    pub fn validate(&self) -> Result<()> {
        let mut prev = f64::NEG_INFINITY;
        let mut prev_category: Option<DelayCategory> = None;
        for b in &self.bands {
            if !b.below.is_finite() {
                bail!("threshold bound {} is not finite", b.below);
            }
            if b.below <= prev {
                bail!("threshold bounds must be strictly ascending ({} after {})", b.below, prev);
            }
            if let Some(p) = prev_category.filter(|p| b.category < *p) {
                bail!("threshold category {:?} below {} follows {:?}", b.category, b.below, p);
            }
            prev = b.below;
            prev_category = Some(b.category);
        }
        if let Some(p) = prev_category.filter(|p| self.otherwise < *p) {
            bail!("otherwise category {:?} is lower than the last band's {:?}", self.otherwise, p);
        }
        Ok(())
    }

    pub fn categorize(&self, value: f64) -> DelayCategory {
        self.bands
            .iter()
            .find(|b| value < b.below)
            .map(|b| b.category)
            .unwrap_or(self.otherwise)
    }
}

/// Multiplier that turns a raw score into minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinutesBasis {
    /// Score is a fraction of this many minutes (typically 60).
    Fixed(f64),
    /// Score is a ratio to the historical global mean delay.
    GlobalMean,
}

impl MinutesBasis {
    pub fn resolve(self, stats: Option<&ReferenceStats>) -> Result<f64> {
        let basis = match (self, stats) {
            (MinutesBasis::Fixed(m), _) => m,
            (MinutesBasis::GlobalMean, Some(s)) => s.global_mean,
            (MinutesBasis::GlobalMean, None) => {
                bail!("minutes_basis is global_mean but no reference stats were loaded")
            }
        };
        if !basis.is_finite() {
            bail!("minutes basis {basis} is not finite");
        }
        Ok(basis)
    }
}

/// Turn a raw model score into minutes and a category.
pub fn interpret(
    raw_score: f64,
    minutes_basis: f64,
    thresholds: &CategoryThresholds,
) -> Result<PredictionResult, PipelineError> {
    if !raw_score.is_finite() {
        return Err(PipelineError::range("raw_score", raw_score, "a finite number"));
    }
    if !minutes_basis.is_finite() {
        return Err(PipelineError::range("minutes_basis", minutes_basis, "a finite number"));
    }
    let estimated_minutes = raw_score * minutes_basis;
    let metric = match thresholds.metric {
        ThresholdMetric::Minutes => estimated_minutes,
        ThresholdMetric::RawScore => raw_score,
    };
    let category = thresholds.categorize(metric);
    Ok(PredictionResult {
        raw_score,
        estimated_minutes,
        category,
        label: category.label().to_string(),
        degraded: false,
    })
}
