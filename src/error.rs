use thiserror::Error;

/// Who is to blame for a failure.
///
/// `MalformedExpression` errors are caused by the request and can be relayed
/// to the client as they are. `Internal` errors mean the caller, the parser or
/// a read hook broke a promise the evaluator relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedExpression,
    Internal,
    Configuration,
}

#[derive(Error, Debug)]
pub enum DapError {
    #[error("Malformed expression: {message}")]
    MalformedExpression { message: String },
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Could not read `{variable}': {message}")]
    Read { variable: String, message: String },
    #[error("Dataset error: {0}")]
    Dataset(String),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DapError>;

impl DapError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedExpression { message: message.into() }
    }
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedExpression { .. } | Self::Parse { .. } => ErrorKind::MalformedExpression,
            Self::Invariant(_) | Self::Read { .. } => ErrorKind::Internal,
            Self::Dataset(_) | Self::Config(_) => ErrorKind::Configuration,
        }
    }
    /// True when the message is meant for the client that sent the constraint.
    pub fn is_user_error(&self) -> bool {
        self.kind() == ErrorKind::MalformedExpression
    }
}

// Helper conversions
impl From<config::ConfigError> for DapError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for DapError {
    fn from(e: serde_json::Error) -> Self { Self::Dataset(e.to_string()) }
}
impl From<std::io::Error> for DapError {
    fn from(e: std::io::Error) -> Self { Self::Dataset(e.to_string()) }
}
