use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

/// Failures crossing the model-service boundary. The cache layer propagates
/// these unchanged; there is no retry below the caller.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model service returned {status}: {body}")]
    Invocation { status: u16, body: String },

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error("network: {0}")]
    Network(#[from] reqwest::Error),
}
