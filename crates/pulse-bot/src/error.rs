//! Error types for the application crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing mandatory configuration: {0}")]
    MissingConfig(String),

    #[error("Config file error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] pulse_registry::RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] pulse_persistence::StoreError),
}

pub type AppResult<T> = Result<T, AppError>;
