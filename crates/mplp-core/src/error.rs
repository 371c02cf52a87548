//! Registry errors.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid registry id: must not be empty")]
    EmptyId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_registered_display() {
        let err = RegistryError::AlreadyRegistered("echo".to_string());
        assert!(err.to_string().contains("Already registered"));
        assert!(err.to_string().contains("echo"));
    }

    #[test]
    fn test_not_found_display() {
        let err = RegistryError::NotFound("missing".to_string());
        assert!(err.to_string().contains("missing"));
    }
}
