/*!
Error types for the graphsnap core engine.
*/

use thiserror::Error;

/// Result type used throughout graphsnap.
pub type Result<T> = std::result::Result<T, GraphSnapError>;

/// Errors that can occur while encoding, decoding or archiving object graphs.
#[derive(Error, Debug)]
pub enum GraphSnapError {
    /// A different factory was registered under an existing name or alias
    #[error("Registry conflict: '{name}' is already bound to a different type")]
    RegistryConflict { name: String },

    /// No factory is registered for a class tag
    #[error("Class not found: '{0}' is not registered")]
    UnknownClass(String),

    /// No factory exists anywhere in a value's parent chain
    #[error("Value of class '{0}' is not serializable")]
    NotSerializable(String),

    /// Envelope or node is missing required fields
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A ref-marker points at a RefId that was never defined
    #[error("Missing reference: no value registered for ref '{0}'")]
    MissingReference(String),

    /// A cycle reached a node whose factory cannot create placeholders
    #[error("Unbreakable cycle: '{class}' (ref '{ref_id}') cannot participate in a cycle")]
    UnbreakableCycle { class: String, ref_id: String },

    /// `to_plain` / `from_plain` produced or received a shape it cannot handle
    #[error("Invalid snapshot for '{class}': {reason}")]
    InvalidSnapshot { class: String, reason: String },

    /// A pending deferred task was passed to the serializer
    #[error("Cannot serialize a deferred task that has not settled")]
    UnsettledTask,

    /// A callable name has no entry in the callable registry
    #[error("Unknown callable: '{0}'")]
    UnknownCallable(String),

    /// The graph nests deeper than the configured limit
    #[error("Depth limit of {0} exceeded")]
    DepthLimitExceeded(usize),

    /// A factory failed while converting a value of the given class
    #[error("Conversion of '{class}' failed: {source}")]
    Conversion {
        class: String,
        #[source]
        source: Box<GraphSnapError>,
    },

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Integrity check failures
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Invalid archive format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl GraphSnapError {
    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a new malformed envelope error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedEnvelope(msg.into())
    }

    /// Create a new invalid snapshot error
    pub fn invalid_snapshot<C: Into<String>, R: Into<String>>(class: C, reason: R) -> Self {
        Self::InvalidSnapshot {
            class: class.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a factory failure with the class it was converting.
    ///
    /// Structural errors raised by the walkers themselves pass through untouched
    /// so callers can still match on them.
    pub(crate) fn in_conversion<C: Into<String>>(self, class: C) -> Self {
        match self {
            Self::Conversion { .. }
            | Self::UnbreakableCycle { .. }
            | Self::MissingReference(_)
            | Self::UnknownClass(_)
            | Self::MalformedEnvelope(_)
            | Self::DepthLimitExceeded(_)
            | Self::UnsettledTask => self,
            other => Self::Conversion {
                class: class.into(),
                source: Box::new(other),
            },
        }
    }

    /// Returns the innermost error of a conversion chain
    pub fn root_cause(&self) -> &GraphSnapError {
        match self {
            Self::Conversion { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
