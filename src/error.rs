//! InsightMap error types

use thiserror::Error;

/// InsightMap error type
#[derive(Error, Debug)]
pub enum Error {
    /// Node or session does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Node identifier cannot be used as a file stem
    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    /// Tag cannot be encoded in a tag header line
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// A single upstream generation unit could not be decoded
    #[error("Malformed fragment: {0}")]
    MalformedFragment(String),

    /// Generation provider failed to open or broke mid-stream
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a missing node
    pub fn node_not_found(id: &str) -> Self {
        Self::NotFound(format!("Node '{}' not found", id))
    }

    /// Shorthand for a missing or expired session
    pub fn session_not_found(id: &str) -> Self {
        Self::NotFound(format!("Session '{}' not found", id))
    }

    /// Whether this error means the addressed entity is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias for InsightMap operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_messages() {
        let err = Error::node_not_found("Rust");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: Node 'Rust' not found");

        let err = Error::session_not_found("abc");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_not_found());
    }
}
