use thiserror::Error;

#[derive(Error, Debug)]
pub enum IamError {
    #[error("Malformed policy document '{policy}': {reason}")]
    MalformedPolicy { policy: String, reason: String },

    #[error("Unsupported policy version '{version}' in '{policy}' (expected 2012-10-17 or 2008-10-17)")]
    UnsupportedVersion { policy: String, version: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unknown condition operator: {0}")]
    UnknownConditionOperator(String),

    #[error("Invalid condition value for {operator} on '{key}': {value}")]
    InvalidConditionValue {
        operator: String,
        key: String,
        value: String,
    },

    #[error("Invalid account id: {0} (must be 12 digits)")]
    InvalidAccountId(String),

    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("Unknown user: {0}")]
    UnknownPrincipal(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Policy '{0}' must set exactly one of `file` or `document`")]
    PolicySource(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, IamError>;
