//! Error types for the sign recognition engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data: need {required} distinct labels or samples, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Prediction failed for model {model_id}: {source}")]
    Prediction {
        model_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Model artifact not found: {0}")]
    ModelNotFound(String),

    #[error("Model inference error: {0}")]
    Inference(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Training cancelled for model {0}")]
    Cancelled(String),
}

impl Error {
    /// Wrap any failure on the inference path with the model it belongs to.
    pub fn prediction(model_id: impl Into<String>, source: Error) -> Self {
        Error::Prediction {
            model_id: model_id.into(),
            source: Box::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ModelNotFound(_) => true,
            Error::Prediction { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_error_names_cause() {
        let err = Error::prediction("model-1", Error::ModelNotFound("model-1".to_string()));
        let msg = err.to_string();
        assert!(msg.contains("model-1"));
        assert!(msg.contains("not found"));
        assert!(err.is_not_found());
    }
}
