use thiserror::Error;

/// Error type of the decision point facade, aggregating the errors of the
/// engine crates with configuration and I/O failures.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("policy error: {0}")]
    Policy(#[from] arbiter_policy::PolicyError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RootError {
    fn from(e: serde_json::Error) -> Self {
        RootError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

pub type RootResult<T> = Result<T, RootError>;
