use std::fmt;

/// Failures surfaced by `Renderer::render` and the engine pool.
#[derive(Debug)]
pub enum RenderError {
    /// The render (navigation, readiness wait and rasterization combined)
    /// exceeded `RenderingOptions::timeout_ms`. The engine instance involved
    /// has been discarded, not returned to the pool.
    Timeout { elapsed_ms: u64 },
    NetworkFailure { url: String, cause: String },
    InvalidMarkup { source: String, cause: String },
    ScriptExecutionFailure { cause: String },
    /// The engine pool was shut down while this render was waiting for an
    /// instance.
    PoolClosed,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Timeout { elapsed_ms } => {
                write!(f, "render: timed out after {}ms", elapsed_ms)
            }
            RenderError::NetworkFailure { url, cause } => {
                write!(f, "render: failed to fetch {}: {}", url, cause)
            }
            RenderError::InvalidMarkup { source, cause } => {
                write!(f, "render: invalid markup in {}: {}", source, cause)
            }
            RenderError::ScriptExecutionFailure { cause } => {
                write!(f, "render: script execution failed: {}", cause)
            }
            RenderError::PoolClosed => write!(f, "render: engine pool is closed"),
        }
    }
}

impl std::error::Error for RenderError {}

/// Failures surfaced by the structural edit operations in `manipulate`.
#[derive(Debug, PartialEq, Eq)]
pub enum ManipulationError {
    EmptyInput { operation: &'static str },
    IndexOutOfRange {
        operation: &'static str,
        index: usize,
        page_count: usize,
    },
}

impl fmt::Display for ManipulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManipulationError::EmptyInput { operation } => {
                write!(f, "{}: no input documents provided", operation)
            }
            ManipulationError::IndexOutOfRange {
                operation,
                index,
                page_count,
            } => write!(
                f,
                "{}: page index {} out of range for document with {} pages",
                operation, index, page_count
            ),
        }
    }
}

impl std::error::Error for ManipulationError {}

/// Failures surfaced by the PDF codec. All are fatal to the operation; no
/// partial document is ever produced alongside one of these.
#[derive(Debug)]
pub enum CodecError {
    CorruptInput { context: String, cause: String },
    UnsupportedFeature { feature: String },
    /// The byte stream is encrypted and the supplied password matched neither
    /// the user nor the owner password.
    InvalidPassword,
    /// Refused to serialize a document with zero pages.
    EmptyDocument,
    Io(std::io::Error),
}

impl CodecError {
    pub fn corrupt(context: impl Into<String>, cause: impl Into<String>) -> Self {
        CodecError::CorruptInput {
            context: context.into(),
            cause: cause.into(),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::CorruptInput { context, cause } => {
                write!(f, "codec: corrupt input at {}: {}", context, cause)
            }
            CodecError::UnsupportedFeature { feature } => {
                write!(f, "codec: unsupported feature: {}", feature)
            }
            CodecError::InvalidPassword => write!(f, "codec: incorrect password"),
            CodecError::EmptyDocument => {
                write!(f, "codec: refusing to write a document with no pages")
            }
            CodecError::Io(err) => write!(f, "codec: io error: {}", err),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(value: std::io::Error) -> Self {
        CodecError::Io(value)
    }
}

/// Non-fatal findings from `security::secure`. Logged and returned, never
/// raised as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityWarning {
    /// A password is the empty string while permissions restrict content; the
    /// restrictions are then advisory at best.
    WeakPassword { which: &'static str },
}

impl fmt::Display for SecurityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityWarning::WeakPassword { which } => write!(
                f,
                "secure: empty {} password with restrictive permissions grants open access",
                which
            ),
        }
    }
}

/// Umbrella error for the `Platen` facade.
#[derive(Debug)]
pub enum PlatenError {
    Render(RenderError),
    Manipulation(ManipulationError),
    Codec(CodecError),
    Io(std::io::Error),
}

impl fmt::Display for PlatenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatenError::Render(err) => write!(f, "{}", err),
            PlatenError::Manipulation(err) => write!(f, "{}", err),
            PlatenError::Codec(err) => write!(f, "{}", err),
            PlatenError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for PlatenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlatenError::Render(err) => Some(err),
            PlatenError::Manipulation(err) => Some(err),
            PlatenError::Codec(err) => Some(err),
            PlatenError::Io(err) => Some(err),
        }
    }
}

impl From<RenderError> for PlatenError {
    fn from(value: RenderError) -> Self {
        PlatenError::Render(value)
    }
}

impl From<ManipulationError> for PlatenError {
    fn from(value: ManipulationError) -> Self {
        PlatenError::Manipulation(value)
    }
}

impl From<CodecError> for PlatenError {
    fn from(value: CodecError) -> Self {
        PlatenError::Codec(value)
    }
}

impl From<std::io::Error> for PlatenError {
    fn from(value: std::io::Error) -> Self {
        PlatenError::Io(value)
    }
}
