use thiserror::Error;

/// Input validation and schema failures raised while building features or
/// interpreting a score. All of them are deterministic in the input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("unknown {dimension} value {value:?}")]
    UnknownCategory { dimension: &'static str, value: String },

    #[error("{field}={value} out of range (expected {expected})")]
    Range {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("feature schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl PipelineError {
    pub(crate) fn unknown(dimension: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownCategory {
            dimension,
            value: value.into(),
        }
    }

    pub(crate) fn range(
        field: &'static str,
        value: impl ToString,
        expected: &'static str,
    ) -> Self {
        Self::Range {
            field,
            value: value.to_string(),
            expected,
        }
    }

    /// True for errors caused by the caller's input rather than by configuration.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::UnknownCategory { .. } | Self::Range { .. })
    }
}

/// Anything that can go wrong during a full prediction.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    // anyhow::Error is not a std Error, so it is carried without #[source]
    #[error("model inference failed: {0:#}")]
    Model(anyhow::Error),
}
