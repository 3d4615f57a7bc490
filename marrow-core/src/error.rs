use thiserror::Error as ThisError;

/// Application-reserved code identifying the ambiguous-key failure of
/// key-addressed update/delete operations. The value sits far outside the
/// range any backend uses for its own errors so callers can match on it
/// across drivers.
pub const AMBIGUOUS_KEY_CODE: i32 = (1 << 20) + 1;

/// The failure taxonomy of the marshalling engine.
///
/// `Configuration` is raised while a row accessor is being built and is fatal
/// to the row type; everything else is an invocation-time failure that only
/// affects the triggering call.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid member declaration, detected when the accessor is compiled.
    #[error("configuration: {0}")]
    Configuration(String),
    /// The data in the instance cannot be sent, e.g. a string longer than the
    /// declared column size.
    #[error("invalid value in `{column}`: {message}")]
    InvalidValue { column: String, message: String },
    /// A converter rejected an out-of-domain value.
    #[error("conversion: {0}")]
    Conversion(String),
    /// The caller violated a protocol, e.g. pulled rows from a released or
    /// exhausted reader.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// A key-addressed update or delete matched more than one row. The
    /// statement has been rolled back to its savepoint; the surrounding
    /// transaction remains usable.
    #[error("the statement affected {affected} rows instead of 0 or 1")]
    AmbiguousKey { affected: u64 },
    /// The operation is not defined for this column shape, e.g. reading a
    /// structured parameter back into a member.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Opaque failure reported by the backend.
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
    pub fn invalid_value(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            column: column.into(),
            message: message.into(),
        }
    }
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Reserved numeric code of the error, when one is defined.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::AmbiguousKey { .. } => Some(AMBIGUOUS_KEY_CODE),
            _ => None,
        }
    }

    pub fn is_ambiguous_key(&self) -> bool {
        matches!(self, Self::AmbiguousKey { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
