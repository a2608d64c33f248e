//! Error taxonomy and `Result` alias used throughout the engine.
//!
//! The engine surfaces typed error *kinds*, not a grab-bag of strings. A
//! page-level corruption and a broken uniqueness constraint are both
//! failures, but callers need to tell them apart — a corrupt page means stop
//! touching the file; a uniqueness violation means retry with different
//! data. `ErrorCode` is that distinction; `Error` carries a human-readable
//! message alongside it and, when the underlying failure came from another
//! error, the original as its `source()`.

use std::fmt;

/// Broad category of failure. Mirrors the kinds a caller needs to
/// branch on, not a type per failure site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Underlying storage read/write failed; not recoverable by the engine.
    Io,
    /// Page type byte unexpected, row length overflows page, usage-map
    /// pointer out of range, or any other on-disk layout violation.
    CorruptFormat,
    /// File-format version or column type not implemented in this build.
    Unsupported,
    /// Uniqueness, required, FK presence/referenced-by, validator, or
    /// row/column null mismatch.
    ConstraintViolation,
    /// Bad row shape, unknown column/index/table name, cursor used against
    /// a different table, invalid schema configuration.
    InvalidArgument,
    /// Operation on a closed database, or cursor positioned past
    /// end/before-beginning for a mutating operation.
    IllegalState,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::Io => "io",
            ErrorCode::CorruptFormat => "corrupt format",
            ErrorCode::Unsupported => "unsupported",
            ErrorCode::ConstraintViolation => "constraint violation",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::IllegalState => "illegal state",
        };
        f.write_str(s)
    }
}

/// The engine's error type. Carries a [`ErrorCode`] for callers to match on
/// and a message for humans; `Batch` additionally carries how many rows of a
/// multi-row insert committed before `cause` aborted it.
#[derive(Debug)]
pub enum Error {
    Plain {
        code: ErrorCode,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    Batch {
        count: usize,
        cause: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(code: ErrorCode) -> Self {
        Error::Plain {
            message: code.to_string(),
            code,
            source: None,
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Plain {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Plain {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap `self` as the cause of a batch operation that committed `count`
    /// rows before failing.
    pub fn into_batch(self, count: usize) -> Self {
        Error::Batch {
            count,
            cause: Box::new(self),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Plain { code, .. } => *code,
            Error::Batch { cause, .. } => cause.code(),
        }
    }

    /// Rows committed before failure; `0` for any non-batch error.
    pub fn committed_count(&self) -> usize {
        match self {
            Error::Plain { .. } => 0,
            Error::Batch { count, .. } => *count,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Plain { code, message, .. } => write!(f, "{code}: {message}"),
            Error::Batch { count, cause } => {
                write!(f, "batch failed after {count} row(s) committed: {cause}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Plain { source, .. } => {
                source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
            }
            Error::Batch { cause, .. } => Some(cause.as_ref()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::with_source(ErrorCode::Io, e.to_string(), e)
    }
}

/// Per-table hook for row-level I/O errors: may substitute a value
/// and let the cursor continue, or rethrow. Schema/structural errors bypass
/// this and always propagate.
pub trait ErrorHandler: Send {
    /// Called when a row fails to decode or validate. Returning `Ok(None)`
    /// skips the row; `Ok(Some(bytes))` substitutes replacement row bytes;
    /// `Err(_)` rethrows (the default).
    fn handle_row_error(&mut self, err: &Error) -> Result<Option<Vec<u8>>> {
        Err(Error::with_message(err.code(), err.to_string()))
    }
}

/// Default handler: every row error is fatal.
#[derive(Default)]
pub struct RethrowHandler;

impl ErrorHandler for RethrowHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_error_carries_committed_count() {
        let cause = Error::new(ErrorCode::ConstraintViolation);
        let batch = cause.into_batch(3);
        assert_eq!(batch.committed_count(), 3);
        assert_eq!(batch.code(), ErrorCode::ConstraintViolation);
    }

    #[test]
    fn display_includes_code() {
        let e = Error::with_message(ErrorCode::CorruptFormat, "bad page type");
        assert!(e.to_string().contains("corrupt format"));
        assert!(e.to_string().contains("bad page type"));
    }
}
