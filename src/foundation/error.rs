/// Convenience result type used across Stipple.
pub type StippleResult<T> = Result<T, StippleError>;

/// Top-level error taxonomy used by the paint pipeline.
#[derive(thiserror::Error, Debug)]
pub enum StippleError {
    /// Property tree misuse: cycles, stale handles, alias reads.
    #[error("property tree error: {0}")]
    PropertyTree(String),

    /// An operation was invoked in the wrong paint-cycle state.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// Two cacheable display items shared one id within a single artifact.
    #[error("duplicate display item id: {0}")]
    DuplicateItemId(String),

    /// A cached display item was reused although its content changed.
    #[error("under-invalidation: {0}")]
    UnderInvalidation(String),

    /// Errors when serializing debug or tooling output.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StippleError {
    /// Build a [`StippleError::PropertyTree`] value.
    pub fn tree(msg: impl Into<String>) -> Self {
        Self::PropertyTree(msg.into())
    }

    /// Build a [`StippleError::Lifecycle`] value.
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }

    /// Build a [`StippleError::DuplicateItemId`] value.
    pub fn duplicate_id(msg: impl Into<String>) -> Self {
        Self::DuplicateItemId(msg.into())
    }

    /// Build a [`StippleError::UnderInvalidation`] value.
    pub fn under_invalidation(msg: impl Into<String>) -> Self {
        Self::UnderInvalidation(msg.into())
    }

    /// Build a [`StippleError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for StippleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
