use thiserror::Error;

/// Core error type for colfile operations
#[derive(Error, Debug)]
pub enum ColfileError {
    /// IO errors from the underlying sink or source, propagated verbatim
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow errors from Arrow interop
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Shape, name or type mismatch between caller expectations and data
    #[error("Schema error: {0}")]
    Schema(String),

    /// Declared logical type disagrees with the physical encoding
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Writer-side invariant violations
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Footer marker mismatch, chunk size disagreement, truncated source
    #[error("Corrupt file: {0}")]
    CorruptFile(String),

    /// Operation called outside its legal session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid argument errors (bad options)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An error annotated with the operation that produced it
    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<ColfileError>,
    },
}

/// Classification of a [`ColfileError`], independent of attached context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Arrow,
    Schema,
    TypeMismatch,
    Encoding,
    CorruptFile,
    InvalidState,
    InvalidArgument,
}

/// Result type alias for colfile operations
pub type Result<T> = std::result::Result<T, ColfileError>;

impl ColfileError {
    /// Create a new schema error
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        ColfileError::Schema(msg.into())
    }

    /// Create a new type mismatch error
    pub fn type_mismatch<S: Into<String>>(msg: S) -> Self {
        ColfileError::TypeMismatch(msg.into())
    }

    /// Create a new encoding error
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        ColfileError::Encoding(msg.into())
    }

    /// Create a new corrupt file error
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        ColfileError::CorruptFile(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        ColfileError::InvalidState(msg.into())
    }

    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        ColfileError::InvalidArgument(msg.into())
    }

    /// The kind of this error, looking through any context wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            ColfileError::Io(_) => ErrorKind::Io,
            ColfileError::Arrow(_) => ErrorKind::Arrow,
            ColfileError::Schema(_) => ErrorKind::Schema,
            ColfileError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            ColfileError::Encoding(_) => ErrorKind::Encoding,
            ColfileError::CorruptFile(_) => ErrorKind::CorruptFile,
            ColfileError::InvalidState(_) => ErrorKind::InvalidState,
            ColfileError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ColfileError::Context { source, .. } => source.kind(),
        }
    }
}

/// Extension trait to add context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, ctx: S) -> Result<T>;

    /// Add context with a closure that's only called on error
    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<ColfileError>,
{
    fn context<S: Into<String>>(self, ctx: S) -> Result<T> {
        self.map_err(|e| ColfileError::Context {
            message: ctx.into(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> Result<T> {
        self.map_err(|e| ColfileError::Context {
            message: f().into(),
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ColfileError::schema("Invalid schema");
        assert_eq!(err.to_string(), "Schema error: Invalid schema");

        let err = ColfileError::corrupt("bad magic");
        assert_eq!(err.to_string(), "Corrupt file: bad magic");
        assert_eq!(err.kind(), ErrorKind::CorruptFile);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: ColfileError = io_err.into();
        assert!(err.to_string().contains("IO error"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_context() {
        fn failing_operation() -> Result<()> {
            Err(ColfileError::invalid_argument("bad input"))
        }

        let result = failing_operation().context("During file read");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("During file read"));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_error_with_context() {
        fn failing_operation() -> Result<()> {
            Err(ColfileError::encoding("Invalid data"))
        }

        let filename = "test.clf";
        let result = failing_operation().with_context(|| format!("Processing file: {}", filename));

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Processing file: test.clf"));
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }
}
