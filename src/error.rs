/// Error taxonomy for the dashboard sync core
///
/// Per-event failures are contained at the router boundary and routed
/// through the three-tier fallback reporter; only lifecycle failures
/// surface to the host.
use thiserror::Error;

/// Errors raised by the sync core
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Handler failure for widget {widget_id}: {reason}")]
    HandlerFailed { widget_id: String, reason: String },

    #[error("Downstream forward failed for widget {widget_id}: {reason}")]
    ForwardFailed { widget_id: String, reason: String },

    #[error("Transport channel closed for connection {0}")]
    TransportClosed(uuid::Uuid),

    #[error("Coordinator is closed")]
    CoordinatorClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Shorthand for a widget handler failure
    pub fn handler(widget_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HandlerFailed {
            widget_id: widget_id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::handler("gauge-1", "bad payload");
        assert!(err.to_string().contains("gauge-1"));
        assert!(err.to_string().contains("bad payload"));
    }
}
