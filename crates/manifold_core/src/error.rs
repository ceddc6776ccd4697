use thiserror::Error;

/// Errors raised by the manifold cost engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The trial collection spans more than one solution manifold.
    #[error("Trials span {fingerprints} distinct manifolds; costs require a single manifold.")]
    ManifoldMismatch { fingerprints: usize },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// A manifold-determining settings field is absent.
    #[error("Missing required setting \"{0}\".")]
    MissingSetting(String),

    #[error("Cannot normalize a zero-length vector.")]
    DegenerateVector,

    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    /// The external evaluator died or answered with something that is not a number.
    #[error("Oracle communication failed: {0}")]
    OracleCommunication(String),

    #[error("Oracle session has already been closed.")]
    SessionClosed,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Malformed landscape data at line {line}: {reason}")]
    MalformedLandscape { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Landscape generation by the external mapper failed.
    #[error("Landscape generation failed: {0:#}")]
    Landscape(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
