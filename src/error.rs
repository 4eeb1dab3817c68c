pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Missing stack output key `{0}`")]
    MissingKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider error ({code}): {message}")]
    Provider { code: String, message: String },

    #[error("Unknown provider error: {0}")]
    Unknown(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid values file: {0}")]
    InvalidValues(String),
}

impl Error {
    /// Service-error constructor; `code` falls back to "Unknown" when the
    /// provider response carries none.
    pub fn provider(code: Option<&str>, message: impl ToString) -> Self {
        Self::Provider {
            code: code.unwrap_or("Unknown").to_string(),
            message: message.to_string(),
        }
    }
}
