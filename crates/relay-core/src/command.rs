//! Commands submitted by viewers and their inbound validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RelayError;
use crate::ids::SessionId;

/// Raw `command` payload as received from a submitter: `{action, data?}`.
///
/// Fields are kept loose so that malformed input can be reported as
/// `InvalidCommand` instead of failing deserialization of the whole frame.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub action: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl CommandRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: Some(Value::String(action.into())),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Parse from an arbitrary JSON payload. Anything that is not an object
    /// yields an empty request, which then fails validation.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Validate and stamp the request into an immutable [`Command`].
    pub fn into_command(self, submitter: SessionId, timestamp: i64) -> Result<Command, RelayError> {
        let action = match self.action {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::String(_)) => {
                return Err(RelayError::InvalidCommand("action must not be empty".into()))
            }
            Some(_) => return Err(RelayError::InvalidCommand("action must be a string".into())),
            None => return Err(RelayError::InvalidCommand("missing action".into())),
        };

        let data = match self.data {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(v) => v,
        };

        Ok(Command {
            submitter,
            action,
            data,
            timestamp,
        })
    }
}

/// An accepted command waiting in (or leaving) the queue.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(rename = "submitterId")]
    pub submitter: SessionId,
    pub action: String,
    pub data: Value,
    pub timestamp: i64,
}
