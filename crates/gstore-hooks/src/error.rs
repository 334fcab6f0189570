/// Errors raised by hooks.
///
/// A hook error aborts the rest of the chain it belongs to.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// A hook rejected the operation with a message.
    #[error("hook rejected the operation: {0}")]
    Rejected(String),

    /// A hook failed with an underlying error.
    #[error("hook failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HookError {
    /// Reject the operation with a message.
    pub fn reject(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Wrap any error raised inside a hook.
    pub fn failed(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Failed(Box::new(err))
    }
}

impl PartialEq for HookError {
    fn eq(&self, other: &Self) -> bool {
        // Compare by display representation for test convenience.
        self.to_string() == other.to_string()
    }
}

/// Result alias for hook invocations.
pub type HookResult<T> = Result<T, HookError>;
