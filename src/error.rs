use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::PoisonError;

use config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy of the store layer.
///
/// `NotFound` and `Cancelled` are expected outcomes that callers branch on,
/// `Parse` and `Backend` carry the failure as a message. No error is ever
/// swallowed by this layer: every operation either returns its declared
/// value or one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed connection string or malformed numeric parameter.
    Parse(String),
    /// The requested key does not exist. Recoverable, not a fault.
    NotFound,
    /// I/O, transaction or protocol failure in the backing engine,
    /// including any operation on a closed handle.
    Backend(String),
    /// A deadline or cancellation signal fired while the operation was
    /// in flight.
    Cancelled,
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Error {
        Error::Parse(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Error {
        Error::Backend(msg.into())
    }

    /// Whether this is the recoverable key-absent outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(s) | Error::Backend(s) => {
                write!(f, "{}", s)
            }
            Error::NotFound => write!(f, "key not found"),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for Error {}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Error::Backend(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Backend(err.to_string())
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Cancelled
    }
}

#[macro_export]
macro_rules! parse_err {
    ($($arg:tt)*) => {
        $crate::error::Error::Parse(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! backend_err {
    ($($arg:tt)*) => {
        $crate::error::Error::Backend(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_kind_checks() {
        assert!(Error::NotFound.is_not_found());
        assert!(!Error::Cancelled.is_not_found());
        assert!(!Error::backend("boom").is_not_found());
    }

    #[test]
    fn test_display() {
        assert_eq!("key not found", Error::NotFound.to_string());
        assert_eq!("operation cancelled", Error::Cancelled.to_string());
        assert_eq!("boom", backend_err!("{}", "boom").to_string());
        assert_eq!("bad dsn", parse_err!("bad {}", "dsn").to_string());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_cancelled() {
        let elapsed = tokio::time::timeout(Duration::ZERO, futures::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(Error::Cancelled, Error::from(elapsed));
    }
}
