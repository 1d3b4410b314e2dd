//! Error types for Docshelf

use std::path::PathBuf;
use thiserror::Error;

/// Docshelf error type
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A view directory could not be resolved or created
    #[error("Cannot prepare view directory {}: {source}", path.display())]
    Configuration {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating a link inside a view directory failed
    #[error("Creating link {}: {source}", path.display())]
    Link {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid glob pattern
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Unknown reading state value
    #[error("Invalid reading state: {0} (expected unread, reading or read)")]
    InvalidReadingState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Several independent view passes failed
    #[error("{}", join_errors(.0))]
    Views(Vec<Error>),
}

impl Error {
    /// Collapse the failures of independent passes into one error, if any.
    pub fn combine(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Views(errors)),
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for Docshelf operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<glob::PatternError> for Error {
    fn from(err: glob::PatternError) -> Self {
        Error::InvalidPattern(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidReadingState("skimmed".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid reading state: skimmed (expected unread, reading or read)"
        );
    }

    #[test]
    fn test_link_error_names_path() {
        let err = Error::Link {
            path: PathBuf::from("/views/fav/a.pdf"),
            source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists"),
        };
        assert!(err.to_string().contains("/views/fav/a.pdf"));
    }

    #[test]
    fn test_combine_keeps_every_failure() {
        assert!(Error::combine(Vec::new()).is_none());

        let single = Error::combine(vec![Error::ConfigError("one".to_string())]).unwrap();
        assert!(matches!(single, Error::ConfigError(_)));

        let both = Error::combine(vec![
            Error::ConfigError("one".to_string()),
            Error::ConfigError("two".to_string()),
        ])
        .unwrap();
        assert_eq!(
            both.to_string(),
            "Configuration error: one; Configuration error: two"
        );
    }
}
