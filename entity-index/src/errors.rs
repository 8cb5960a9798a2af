use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds for entity index operations
///
/// Each kind describes one category of failure so callers can tell a caller
/// bug from a stale transaction or a damaged file.
///
/// # Examples
///
/// ```rust
/// use entity_index::errors::{ErrorKind, IndexError, IndexResult};
///
/// fn example() -> IndexResult<()> {
///     Err(IndexError::new("Node 12 is out of range", ErrorKind::InvalidId))
/// }
/// assert!(example().is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Argument Errors
    /// An argument is outside of its valid domain
    InvalidArgument,
    /// A node id outside `[0, capacity)`
    InvalidId,

    // Key Errors
    /// A by-key lookup or update matched more than one entity
    DuplicateKey,
    /// The requested entity does not exist
    NotFound,

    // Transaction Errors
    /// The index advanced since the transaction began
    StaleTransaction,
    /// The operation is not valid in the current state
    InvalidOperation,

    // Structural Errors
    /// The tree or free list is inconsistent with itself
    IndexCorrupted,
    /// The file header does not describe a compatible index
    FileCorrupted,

    // IO Errors
    /// Generic IO error
    IOError,
    /// The file was not found
    FileNotFound,
    /// Permission denied for file operation
    PermissionDenied,

    // Encoding Errors
    /// An entity could not be serialized or deserialized
    EncodingError,

    // Store Errors
    /// Store has already been closed
    StoreAlreadyClosed,
    /// Error in event processing
    EventError,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "Invalid argument"),
            ErrorKind::InvalidId => write!(f, "Invalid ID"),
            ErrorKind::DuplicateKey => write!(f, "Duplicate key"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::StaleTransaction => write!(f, "Stale transaction"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::IndexCorrupted => write!(f, "Index corrupted"),
            ErrorKind::FileCorrupted => write!(f, "File corrupted"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::FileNotFound => write!(f, "File not found"),
            ErrorKind::PermissionDenied => write!(f, "Permission denied"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::StoreAlreadyClosed => write!(f, "Store already closed"),
            ErrorKind::EventError => write!(f, "Event error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Error type of the entity index.
///
/// `IndexError` carries a message, an [`ErrorKind`], an optional cause and the
/// backtrace captured where it was created.
///
/// # Examples
///
/// ```rust
/// use entity_index::errors::{ErrorKind, IndexError};
///
/// let cause = IndexError::new("short read", ErrorKind::IOError);
/// let err = IndexError::new_with_cause("Failed to read node 3", ErrorKind::IOError, cause);
/// assert!(err.cause().is_some());
/// ```
#[derive(Clone)]
pub struct IndexError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<IndexError>>,
    backtrace: Atomic<Backtrace>,
}

impl IndexError {
    /// Creates a new `IndexError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        IndexError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `IndexError` that wraps the error which caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: IndexError) -> Self {
        IndexError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&IndexError> {
        self.cause.as_deref()
    }
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{} ({})\nCaused by: {:?}", self.message, self.error_kind, cause),
            None => write!(f, "{} ({})\n{:?}", self.message, self.error_kind, self.backtrace.read()),
        }
    }
}

impl Error for IndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// Shorthand for `Result<T, IndexError>`, returned by every fallible operation.
pub type IndexResult<T> = Result<T, IndexError>;

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::UnexpectedEof => ErrorKind::FileCorrupted,
            _ => ErrorKind::IOError,
        };
        IndexError::new(&format!("IO error: {}", err), error_kind)
    }
}
