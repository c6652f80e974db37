use thiserror::Error;

/// Errors from model stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Missing identity key: {0}")]
    MissingKey(String),

    #[error("'{model}' has no concrete field '{field}'")]
    UnknownField { model: &'static str, field: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    pub fn unknown_field(model: &'static str, field: &str) -> Self {
        StoreError::UnknownField {
            model,
            field: field.to_string(),
        }
    }
}
