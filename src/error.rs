use super::draft::InvariantViolation;

#[derive(thiserror::Error, Debug)]
pub enum DraftError {
    #[error("Storage backend failed: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error("Failed to decode record under '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: minicbor::decode::Error,
    },
    #[error("Record under '{key}' has schema version {found}, expected {expected}")]
    SchemaVersion { key: String, found: u16, expected: u16 },
    #[error("Record under '{key}' holds inconsistent draft data: {violation}")]
    Malformed {
        key: String,
        #[source]
        violation: InvariantViolation,
    },
    #[error("Unknown service category '{0}'")]
    UnknownCategory(String),
    #[error("Failed to mint draft id: {0}")]
    DraftId(String),
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for DraftError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        DraftError::Encode(value.to_string())
    }
}
