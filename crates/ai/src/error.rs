use thiserror::Error;

/// Failure of the external text capability or of a stage definition.
///
/// Stage failures are not retried by the pipeline; callers decide what a failed
/// stage means for the job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AiError {
    #[error("invalid stage definition: {0}")]
    InvalidStage(String),

    #[error("text service request failed: {0}")]
    Request(String),

    #[error("text service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("text service response could not be decoded: {0}")]
    Decode(String),

    #[error("text service returned no content")]
    EmptyResponse,
}

impl AiError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}
