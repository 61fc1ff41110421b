//! Common error types used throughout reelforge.
//!
//! Every external collaborator (LLM backends, the render API, FFmpeg, the
//! publishing provider) surfaces its failures as a [`Error::Provider`] or
//! [`Error::Timeout`]; request validation and lookups have their own
//! variants so HTTP handlers can map them to status codes.

/// Common error type for reelforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request was malformed or incomplete. Surfaced synchronously as a
    /// client error; no workflow is created.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// An upstream provider failed, returned unparseable output, or the
    /// transport to it broke.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The referenced workflow or scene does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A bounded polling loop exhausted its attempts.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new Validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new Provider error.
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Timeout error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Provider(err.to_string())
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::validation("duration must be 15, 30 or 60");
        assert_eq!(
            err.to_string(),
            "Invalid request: duration must be 15, 30 or 60"
        );

        let err = Error::provider("upstream returned 500");
        assert_eq!(err.to_string(), "Provider error: upstream returned 500");

        let err = Error::not_found("workflow abc");
        assert_eq!(err.to_string(), "Not found: workflow abc");

        let err = Error::timeout("render job xyz");
        assert_eq!(err.to_string(), "Timed out: render job xyz");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(Error::validation("x"), Error::Validation(_)));
        assert!(matches!(Error::provider("x"), Error::Provider(_)));
        assert!(matches!(Error::not_found("x"), Error::NotFound(_)));
        assert!(matches!(Error::timeout("x"), Error::Timeout(_)));
    }
}
