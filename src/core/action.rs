//! Dispatched actions.
//!
//! An action is a name from the action table plus a JSON-like payload. The
//! same shape is handed to middlewares (native or scripted) and to error
//! listeners.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named dispatch with its payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl Action {
    /// Create a new action.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.payload)
    }
}
