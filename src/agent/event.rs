//! Progress events emitted while a workflow runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One observable update from a running workflow.
///
/// A stream yields any number of [`ProgressEvent::Processing`] events
/// followed by exactly one terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// A workflow step was entered.
    Processing {
        /// Step name (e.g. `"plan"`).
        step: String,
        /// Human-readable description.
        message: String,
        /// Step-specific details.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// The workflow finished with a response.
    Completed {
        /// Final report or simple answer.
        response: String,
    },
    /// The workflow failed.
    Error {
        /// Failure description.
        message: String,
    },
}

impl ProgressEvent {
    /// Whether no further events follow this one.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let event = ProgressEvent::Processing {
            step: "plan".to_string(),
            message: "planning".to_string(),
            data: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap_or_default(),
            json!({"status": "processing", "step": "plan", "message": "planning"})
        );
        assert!(!event.is_terminal());

        let done = ProgressEvent::Completed {
            response: "ok".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&done).unwrap_or_default(),
            json!({"status": "completed", "response": "ok"})
        );
        assert!(done.is_terminal());
    }
}
