use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// during fs read from disk
    #[error("Failed to read config file. See: `{0}`")]
    ReadFailed(#[from] std::io::Error),

    /// parsing
    #[error("Failed to parse config file. See: `{0}`")]
    ParseFailed(#[from] toml::de::Error),

    /// an environment override that doesn't parse into the field's type
    #[error("Invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
}
