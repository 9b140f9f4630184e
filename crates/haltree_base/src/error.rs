use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use tracing_error::{SpanTrace, SpanTraceStatus};

/* 📖 # Why a custom error type and not use anyhow/eyre/thiserror etc?

- Better control over error handling
- Errors must carry an HTTP status across the whole resolution pipeline
- More transparency into error handling logic
 */

/// Error variants that can occur in haltree operations.
/// Each variant represents a specific error category with its associated context.
#[derive(Debug)]
pub enum ErrorKind {
    /// Schema or operation contract validation failed while compiling the tree.
    /// These are fatal at start-up and never produced while serving a request.
    Compile { message: String },

    /// A request-scoped failure carrying an explicit HTTP status
    /// (404 for unresolved paths, 405 for unsupported verbs, 409 for conflicts, ...)
    Http { status: u16, message: String },

    /// A request payload or query value does not match the expected shape
    Decode { message: String },

    /// File system operation failed
    FileError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Catch-all for other errors with a message
    Message { message: String },
}

/* 📖 # Why separate ErrorKind and HaltreeError?
This two-layer design provides a clear separation of concerns:
- ErrorKind: structural variants with specific contexts (status codes, file paths, ...)
- HaltreeError: wraps ErrorKind with context strings, an optional cause and a span trace

Users can pattern match on ErrorKind for specific handling, while HaltreeError
provides ergonomic context attachment for propagation.
*/

/// Comprehensive error type wrapping ErrorKind with optional context.
pub struct HaltreeError {
    kind: ErrorKind,
    context: Vec<String>,
    cause: Option<Box<HaltreeError>>,
    span_trace: SpanTrace,
}

impl HaltreeError {
    /// Creates a new error from an ErrorKind, capturing the current span trace.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: vec![],
            cause: None,
            span_trace: SpanTrace::capture(),
        }
    }

    /// Creates an unclassified error with the given message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Message {
            message: message.into(),
        })
    }

    /// Creates a schema compilation error.
    pub fn compile(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compile {
            message: message.into(),
        })
    }

    /// Creates an error carrying an explicit HTTP status code.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Http {
            status,
            message: message.into(),
        })
    }

    /// 404
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(404, message)
    }

    /// 405
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::http(405, message)
    }

    /// 409
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::http(409, message)
    }

    /// Creates a payload/query decoding error (reported as 400).
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode {
            message: message.into(),
        })
    }

    /// Attaches context to an error.
    /// Context is displayed before the error message.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Attaches context using lazy evaluation.
    /// Useful to avoid expensive string construction for successful paths.
    pub fn with_context<F>(mut self, f: F) -> Self
    where
        F: FnOnce() -> String,
    {
        self.context.push(f());
        self
    }

    /// Records the error that caused this one.
    pub fn caused_by(mut self, cause: impl Into<Box<HaltreeError>>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Returns the attached context strings, oldest first.
    pub fn get_context(&self) -> &[String] {
        &self.context
    }

    /// Returns a reference to the underlying ErrorKind.
    /// Allows pattern matching on specific error variants.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the error that caused this one, if any.
    pub fn cause(&self) -> Option<&HaltreeError> {
        self.cause.as_deref()
    }

    /// The HTTP status this error carries, if it was classified.
    ///
    /// Causes are consulted when the error itself is unclassified, so wrapping
    /// a host-signalled 409 in additional context keeps the 409.
    pub fn status_code(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::Http { status, .. } => Some(*status),
            ErrorKind::Decode { .. } => Some(400),
            ErrorKind::Compile { .. } | ErrorKind::FileError { .. } | ErrorKind::Message { .. } => {
                self.cause.as_ref().and_then(|cause| cause.status_code())
            }
        }
    }

    /// Returns the innermost error in the chain.
    /// Traverses the error source chain to find the root cause.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    fn kind_message(&self) -> String {
        match &self.kind {
            ErrorKind::Compile { message }
            | ErrorKind::Http { message, .. }
            | ErrorKind::Decode { message }
            | ErrorKind::Message { message } => message.clone(),
            ErrorKind::FileError { path, source } => {
                format!("File error at {}: {}", path.display(), source)
            }
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        let items = self.context.len() + usize::from(self.cause.is_some());
        for (i, ctx) in self.context.iter().enumerate() {
            let branch = if i + 1 == items { "└─" } else { "├─" };
            writeln!(f, "{indent}{branch} {ctx}")?;
        }
        if let Some(cause) = &self.cause {
            writeln!(f, "{indent}└─ cause: {}", cause.kind_message())?;
            cause.fmt_tree(f, &format!("{indent}   "))?;
        }
        Ok(())
    }
}

impl From<ErrorKind> for HaltreeError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ErrorKind> for Box<HaltreeError> {
    fn from(kind: ErrorKind) -> Self {
        Box::new(HaltreeError::new(kind))
    }
}

impl StdError for HaltreeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            ErrorKind::FileError { source, .. } => Some(source),
            _ => self
                .cause
                .as_deref()
                .map(|cause| cause as &(dyn StdError + 'static)),
        }
    }
}

impl fmt::Display for HaltreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ctx in &self.context {
            write!(f, "{}: ", ctx)?;
        }
        write!(f, "{}", self.kind_message())
    }
}

/* 📖 # Why a custom Debug implementation?
The derived Debug output of nested errors is hard to read. The tree format shows
the message, each context entry, the cause chain and finally the span trace
(when an ErrorLayer subscriber is installed).
*/
impl fmt::Debug for HaltreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind_message())?;
        self.fmt_tree(f, "")?;
        if self.span_trace.status() == SpanTraceStatus::CAPTURED {
            writeln!(f, "Trace: {}", self.span_trace)?;
        }
        Ok(())
    }
}

/* 📖 # Why use Box<HaltreeError> in the result type?

Boxing the error reduces the size of the result type, making it more efficient to return in the common case.

*/

/// Standard result type for haltree operations.
pub type HaltreeResult<T> = std::result::Result<T, Box<HaltreeError>>;

/// Extension trait for attaching context to Results.
/// Provides ergonomic error context attachment during error propagation.
pub trait ResultExt<T> {
    /// Attaches context to an error, consuming and re-wrapping it.
    /// Eager evaluation: context is evaluated immediately.
    fn context(self, context: impl Into<String>) -> HaltreeResult<T>;

    /// Attaches context using lazy evaluation.
    /// Context is only evaluated if the result is an error.
    fn with_context<F>(self, f: F) -> HaltreeResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for HaltreeResult<T> {
    fn context(self, context: impl Into<String>) -> HaltreeResult<T> {
        self.map_err(|err| Box::new(err.context(context)))
    }

    fn with_context<F>(self, f: F) -> HaltreeResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| Box::new(err.with_context(f)))
    }
}

/// Builds a boxed unclassified [`HaltreeError`] using `format!` syntax.
#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        ::std::boxed::Box::new($crate::error::HaltreeError::message(format!($($arg)*)))
    };
}

/// Returns early with an unclassified [`HaltreeError`] using `format!` syntax.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::err!($($arg)*))
    };
}
