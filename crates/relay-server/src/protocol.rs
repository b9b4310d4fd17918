//! Inbound frame decoding. Every frame is `{"event": "...", "data": ...}`.

use relay_core::CommandRequest;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

/// A decoded message from a session.
#[derive(Debug)]
pub enum ClientMessage {
    RegisterExecutor,
    Command(CommandRequest),
    CommandCompleted(Value),
    Ping,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: RawFrame =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        match frame.event.as_str() {
            // `register_pc` is what existing controller clients send.
            "register_executor" | "register_pc" => Ok(Self::RegisterExecutor),
            "command" => Ok(Self::Command(CommandRequest::from_value(frame.data))),
            "command_completed" => Ok(Self::CommandCompleted(frame.data)),
            "ping" => Ok(Self::Ping),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::SessionId;
    use serde_json::json;

    #[test]
    fn parses_register() {
        let msg = ClientMessage::parse(r#"{"event":"register_executor"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::RegisterExecutor));
        let msg = ClientMessage::parse(r#"{"event":"register_pc","data":null}"#).unwrap();
        assert!(matches!(msg, ClientMessage::RegisterExecutor));
    }

    #[test]
    fn parses_command_with_data() {
        let msg =
            ClientMessage::parse(r#"{"event":"command","data":{"action":"left-click","data":{"x":5}}}"#)
                .unwrap();
        let ClientMessage::Command(req) = msg else {
            panic!("expected command");
        };
        let cmd = req.into_command(SessionId::new(), 0).unwrap();
        assert_eq!(cmd.action, "left-click");
        assert_eq!(cmd.data, json!({"x": 5}));
    }

    #[test]
    fn command_without_data_fails_validation_later() {
        let msg = ClientMessage::parse(r#"{"event":"command"}"#).unwrap();
        let ClientMessage::Command(req) = msg else {
            panic!("expected command");
        };
        assert!(req.into_command(SessionId::new(), 0).is_err());
    }

    #[test]
    fn completion_payload_kept() {
        let msg = ClientMessage::parse(r#"{"event":"command_completed","data":{"ok":true,"n":[1]}}"#)
            .unwrap();
        let ClientMessage::CommandCompleted(data) = msg else {
            panic!("expected completion");
        };
        assert_eq!(data, json!({"ok": true, "n": [1]}));
    }

    #[test]
    fn parses_ping() {
        assert!(matches!(
            ClientMessage::parse(r#"{"event":"ping"}"#).unwrap(),
            ClientMessage::Ping
        ));
    }

    #[test]
    fn unknown_event_rejected() {
        let err = ClientMessage::parse(r#"{"event":"format_disk"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownEvent("format_disk".into()));
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            ClientMessage::parse("not json").unwrap_err(),
            ProtocolError::Malformed(_)
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"data":{}}"#).unwrap_err(),
            ProtocolError::Malformed(_)
        ));
    }
}
