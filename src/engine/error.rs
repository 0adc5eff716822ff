use crate::store::StorageError;
use crate::validate::ValidationError;

use super::conflict::Conflict;

#[derive(Debug)]
pub enum EngineError {
    /// Bad or missing input.
    Validation(ValidationError),
    /// Valid input that collides with a block already in the bucket.
    Overlap(Conflict),
    /// No block with this id in the addressed bucket.
    NotFound(String),
    /// The backing store failed. Never retried by the engine.
    Storage(StorageError),
}

impl EngineError {
    /// Stable, caller-visible category code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::Overlap(_) => "overlap",
            EngineError::NotFound(_) => "not_found",
            EngineError::Storage(_) => "storage",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(e) => write!(f, "{e}"),
            EngineError::Overlap(c) => write!(f, "{c}"),
            EngineError::NotFound(_) => write!(f, "Block not found"),
            EngineError::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Validation(e) => Some(e),
            EngineError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::Validation(e)
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        EngineError::Storage(e)
    }
}

impl From<Conflict> for EngineError {
    fn from(c: Conflict) -> Self {
        EngineError::Overlap(c)
    }
}
