//! Domain error types.

/// Top-level error type for neutron.
#[derive(Debug, thiserror::Error)]
pub enum NeutronError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("empty price series for the requested range")]
    EmptyPriceSeries,

    #[error("no eligible assets after universe and quality filtering")]
    EmptyUniverse,

    #[error("insufficient history: have {bars} bars, need {minimum}")]
    InsufficientHistory { bars: usize, minimum: usize },

    #[error("data quality gate failed: {reason}")]
    QualityGate { reason: String },

    #[error("input shape mismatch: {context}")]
    ShapeMismatch { context: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&NeutronError> for std::process::ExitCode {
    fn from(err: &NeutronError) -> Self {
        let code: u8 = match err {
            NeutronError::Io(_) => 1,
            NeutronError::ConfigParse { .. }
            | NeutronError::ConfigMissing { .. }
            | NeutronError::ConfigInvalid { .. } => 2,
            NeutronError::Data { .. } => 3,
            NeutronError::QualityGate { .. } => 4,
            NeutronError::EmptyPriceSeries
            | NeutronError::EmptyUniverse
            | NeutronError::InsufficientHistory { .. }
            | NeutronError::ShapeMismatch { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
