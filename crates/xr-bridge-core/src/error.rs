//! Error types shared across the crate.

use crate::coordinates::CoordinateSystemType;

/// Errors surfaced by sessions, realities, displays and the native bridge.
#[derive(Debug, thiserror::Error)]
pub enum XrError {
    #[error("No display supports the requested session: {0}")]
    CapabilityMismatch(String),

    #[error("Frame of reference not available yet: {0:?}")]
    FrameOfReferenceUnavailable(CoordinateSystemType),

    #[error("Unknown coordinate system type: {0:?}")]
    UnknownCoordinateSystemType(CoordinateSystemType),

    #[error("No transform from {from:?} to {to:?}")]
    TransformUnavailable {
        from: CoordinateSystemType,
        to: CoordinateSystemType,
    },

    #[error("Session has ended")]
    SessionEnded,

    #[error("Anchor not found: {0}")]
    AnchorNotFound(String),

    #[error("Invalid matrix: {0}")]
    InvalidMatrix(String),

    #[error("Invalid frame buffer: {0}")]
    InvalidFrameBuffer(String),

    #[error("Bridge request failed: {0}")]
    Bridge(String),

    #[error("Bridge channel closed before a reply arrived")]
    BridgeClosed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Frame callback failed: {0}")]
    Callback(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl XrError {
    /// Errors that invalidate a session's frame loop rather than one tick.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            XrError::FrameOfReferenceUnavailable(_) | XrError::CapabilityMismatch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, XrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(XrError::FrameOfReferenceUnavailable(CoordinateSystemType::Stage).is_structural());
        assert!(XrError::CapabilityMismatch("exclusive".into()).is_structural());
        assert!(!XrError::Callback("boom".into()).is_structural());
        assert!(!XrError::BridgeClosed.is_structural());
    }
}
