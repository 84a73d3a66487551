use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No training data: accepted documents contain no text")]
    NoTrainingData,

    #[error("No evaluation data: held-out set is empty")]
    NoEvaluationData,

    #[error("Invalid metrics: {0}")]
    InvalidMetrics(String),

    #[error("External command `{command}` failed: {detail}")]
    External { command: String, detail: String },
}

pub type Result<T> = std::result::Result<T, Error>;
