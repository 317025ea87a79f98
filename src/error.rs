//! Error types for the evolution strategy engine

use evolving_es_sampling::SamplerError;
use thiserror::Error;

/// Errors that abort an optimization run
#[derive(Error, Debug)]
pub enum EsError {
    /// Configuration that cannot be clamped into a valid one
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sampler could not be constructed
    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    /// The fitness function reported a failure
    #[error("Fitness evaluation failed: {0}")]
    Fitness(#[source] anyhow::Error),

    /// The fitness function returned NaN or an infinity
    #[error("Fitness function returned a non-finite value for evaluation {evaluation}")]
    NonFiniteFitness { evaluation: usize },

    /// A batch evaluator returned the wrong number of fitness values
    #[error("Batch evaluation returned {got} values for {expected} designs")]
    BatchSizeMismatch { expected: usize, got: usize },

    /// Thread pool construction failed
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EsResult<T> = Result<T, EsError>;
