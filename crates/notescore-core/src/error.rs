use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown note status: {0}")]
    UnknownStatus(String),

    #[error("unknown scorer tier: {0}")]
    UnknownTier(String),

    #[error("unknown explanation tag: {0}")]
    UnknownTag(String),

    #[error("unknown enrollment state: {0}")]
    UnknownEnrollmentState(String),

    #[error("unknown {kind}: {value}")]
    UnknownLabel { kind: &'static str, value: String },

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
