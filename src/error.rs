/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum FlowgateError {
    /// A constructor received an out-of-range parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A store `get` on a key that does not exist.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The configured store does not execute server-side scripts.
    #[error("scripting not supported by this backend")]
    ScriptUnsupported,

    /// Redis error.
    #[error("redis error: {0}")]
    Backend(#[from] redis::RedisError),

    /// Error from a custom store backend.
    #[error("store error: {0}")]
    Store(String),

    /// The backend answered with a reply the engine cannot interpret.
    #[error("malformed backend reply: {0}")]
    BadReply(String),

    /// A store operation ran past its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl FlowgateError {
    /// Whether this error is a transient backend condition.
    ///
    /// Only transient errors are eligible for the fail-open policy; semantic
    /// errors (bad reply shapes, unsupported scripting) always surface.
    pub fn is_transient(&self) -> bool {
        match self {
            FlowgateError::DeadlineExceeded | FlowgateError::Store(_) => true,
            FlowgateError::Backend(err) => {
                err.is_io_error()
                    || err.is_timeout()
                    || err.is_connection_refusal()
                    || err.is_connection_dropped()
                    || err.is_cluster_error()
            }
            _ => false,
        }
    }

    pub(crate) fn is_noscript(&self) -> bool {
        matches!(self, FlowgateError::Backend(err) if err.kind() == redis::ErrorKind::NoScriptError)
    }
}
