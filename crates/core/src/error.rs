//! Error types for the prenatal core crate.

use prenatal_types::{IdError, TextError};

#[derive(Debug, thiserror::Error)]
pub enum PrenatalError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid text: {0}")]
    Text(#[from] TextError),
    #[error("invalid identifier: {0}")]
    Id(#[from] IdError),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to remove record: {0}")]
    FileRemove(std::io::Error),
    #[error("failed to serialize JSON: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize JSON: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),

    #[error("store lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl PrenatalError {
    pub fn patient_not_found(id: impl std::fmt::Display) -> Self {
        PrenatalError::NotFound {
            kind: "patient",
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PrenatalError::NotFound { .. })
    }
}

pub type PrenatalResult<T> = std::result::Result<T, PrenatalError>;
