//! Error types for crystal-predict

use thiserror::Error;

/// Result type for prediction operations.
pub type Result<T> = std::result::Result<T, PredictError>;

/// Errors raised while loading feature lists and models or predicting.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A feature expression is malformed.
    #[error("cannot parse feature '{expr}' at offset {offset}: {message}")]
    FeatureParse {
        expr: String,
        offset: usize,
        message: String,
    },

    /// A feature refers to a column the raw rows do not carry.
    #[error("feature '{expr}' uses unknown column '{column}'")]
    UnknownColumn { expr: String, column: String },

    #[error("feature list {0} holds no features")]
    EmptyFeatureList(String),

    /// Error reported by the ONNX runtime.
    #[error("model error: {0}")]
    Model(#[from] ort::Error),

    /// A model returned a different number of scores than rows given.
    #[error("model {model} returned {got} scores for {expected} rows")]
    Shape {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("raw row has {got} values, expected {expected}")]
    RowWidth { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PredictError::UnknownColumn {
            expr: "cl.nope * 2".into(),
            column: "cl.nope".into(),
        };
        assert_eq!(
            err.to_string(),
            "feature 'cl.nope * 2' uses unknown column 'cl.nope'"
        );

        let err = PredictError::RowWidth {
            expected: 25,
            got: 3,
        };
        assert_eq!(err.to_string(), "raw row has 3 values, expected 25");
    }
}
