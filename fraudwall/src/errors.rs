// fraudwall/src/errors.rs
//
// One error kind per failure class. The orchestrator translates anything
// recoverable into a degraded factor; only consumer-layer errors propagate
// far enough to trigger ingress retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    // Poison pill: dropped with a warning, never re-queued.
    #[error("validation failed: {0}")]
    Validation(String),

    // Transient: pipeline degrades to empty context.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    // Transient: persistence skipped, publish continues.
    #[error("database unavailable: {0}")]
    DatabaseUnavailable(String),

    // Neutralized to a zero-score factor.
    #[error("analyzer {analyzer} failed: {message}")]
    AnalyzerFailed { analyzer: &'static str, message: String },

    // Neutral 0.5 score, version suffixed "-error".
    #[error("ml inference failed: {0}")]
    MlFailure(String),

    // Logged; delivery guaranteed by redelivery.
    #[error("publish to {topic} failed: {message}")]
    PublishFailed { topic: String, message: String },

    // Persisted analysis carries status TIMEOUT; decision still emitted.
    #[error("analysis deadline exceeded")]
    DeadlineExceeded,

    // Fatal at startup: refusal to serve.
    #[error("model integrity check failed: {0}")]
    ModelIntegrity(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_)          => "E_VALIDATION",
            Self::CacheUnavailable(_)    => "E_CACHE",
            Self::DatabaseUnavailable(_) => "E_DATABASE",
            Self::AnalyzerFailed { .. }  => "E_ANALYZER",
            Self::MlFailure(_)           => "E_ML",
            Self::PublishFailed { .. }   => "E_PUBLISH",
            Self::DeadlineExceeded       => "E_DEADLINE",
            Self::ModelIntegrity(_)      => "E_MODEL_HASH",
        }
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(e: redis::RedisError) -> Self {
        Self::CacheUnavailable(e.to_string())
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
