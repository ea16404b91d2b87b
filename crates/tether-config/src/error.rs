use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Input text is not valid TOML. Assembly aborts; nothing is written.
    #[error("malformed {source_name}: {message}")]
    Malformed {
        source_name: String,
        message: String,
    },

    /// A section path runs through a key that holds a plain value.
    #[error("section [{section}] conflicts with value `{key}`")]
    Conflict { section: String, key: String },
}

impl ConfigError {
    pub fn malformed(source_name: &str, err: impl std::fmt::Display) -> Self {
        Self::Malformed {
            source_name: source_name.to_string(),
            message: err.to_string().trim_end().to_string(),
        }
    }
}
