//! Message schema for the line-delimited JSON wire protocol (spec §6.1, §7).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A client→server request. The closed `type` enumeration is expressed as
/// a tagged enum so decoding an unknown or malformed message is a single
/// `serde_json` error rather than a string-keyed dispatch table (§9,
/// "prefer a tagged-variant decode plus exhaustive dispatch").
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    CreateSession {
        framerate: String,
        #[serde(default)]
        initial_timecode: Option<String>,
    },
    JoinSession {
        session_id: String,
    },
    LeaveSession,
    StartTimecode,
    StopTimecode,
    ResetTimecode {
        #[serde(default)]
        timecode: Option<String>,
    },
}

/// A server→client message (§6.1).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        client_id: String,
        supported_framerates: Vec<String>,
    },
    SessionCreated {
        session_id: String,
        framerate: String,
        timecode: String,
    },
    SessionJoined {
        session_id: String,
        framerate: String,
        timecode: String,
        running: bool,
    },
    SessionLeft {
        session_id: String,
    },
    TimecodeStarted {
        timecode: String,
    },
    TimecodeStopped {
        timecode: String,
    },
    TimecodeReset {
        timecode: String,
    },
    TimecodeUpdate {
        timecode: String,
    },
    ServerShutdown,
    Error {
        kind: String,
        message: String,
    },
}

/// Request-level fault (§7). `kind()` is the stable string sent on the
/// wire; `Display` supplies the human-readable `message` field.
#[derive(Debug, Error, Clone)]
pub enum ProtocolError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unsupported framerate {0:?}")]
    UnknownFramerate(String),
    #[error("invalid timecode: {0}")]
    InvalidTimecode(String),
    #[error("no session with id {0:?}")]
    SessionNotFound(String),
    #[error("not a member of any session")]
    NotInSession,
    #[error("message exceeds the maximum line length")]
    MessageTooLarge,
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ProtocolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::BadRequest(_) => "BadRequest",
            ProtocolError::UnknownFramerate(_) => "UnknownFramerate",
            ProtocolError::InvalidTimecode(_) => "InvalidTimecode",
            ProtocolError::SessionNotFound(_) => "SessionNotFound",
            ProtocolError::NotInSession => "NotInSession",
            ProtocolError::MessageTooLarge => "MessageTooLarge",
            ProtocolError::InternalError(_) => "InternalError",
        }
    }
}

impl From<ProtocolError> for ServerMessage {
    fn from(err: ProtocolError) -> Self {
        ServerMessage::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_create_session_with_optional_field_absent() {
        let req: ClientRequest =
            serde_json::from_str(r#"{"type":"create_session","framerate":"24"}"#).unwrap();
        assert!(matches!(
            req,
            ClientRequest::CreateSession { framerate, initial_timecode: None } if framerate == "24"
        ));
    }

    #[test]
    fn decodes_create_session_with_initial_timecode() {
        let req: ClientRequest = serde_json::from_str(
            r#"{"type":"create_session","framerate":"29.97","initial_timecode":"10:00:00:00"}"#,
        )
        .unwrap();
        match req {
            ClientRequest::CreateSession { framerate, initial_timecode } => {
                assert_eq!(framerate, "29.97");
                assert_eq!(initial_timecode.as_deref(), Some("10:00:00:00"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn decodes_no_field_variants() {
        let req: ClientRequest = serde_json::from_str(r#"{"type":"leave_session"}"#).unwrap();
        assert!(matches!(req, ClientRequest::LeaveSession));
        let req: ClientRequest = serde_json::from_str(r#"{"type":"start_timecode"}"#).unwrap();
        assert!(matches!(req, ClientRequest::StartTimecode));
    }

    #[test]
    fn rejects_unknown_type() {
        let result: Result<ClientRequest, _> =
            serde_json::from_str(r#"{"type":"delete_everything"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_type() {
        let result: Result<ClientRequest, _> = serde_json::from_str(r#"{"framerate":"24"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_object_top_level() {
        let result: Result<ClientRequest, _> = serde_json::from_str(r#"["create_session"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn serializes_compact_without_embedded_newlines() {
        let msg = ServerMessage::Welcome {
            client_id: "abc".to_string(),
            supported_framerates: vec!["24".to_string(), "30".to_string()],
        };
        let text = serde_json::to_string(&msg).unwrap();
        assert!(!text.contains('\n'));
        assert!(text.contains("\"type\":\"welcome\""));
    }

    #[test]
    fn error_kind_strings_match_spec() {
        assert_eq!(ProtocolError::NotInSession.kind(), "NotInSession");
        assert_eq!(
            ProtocolError::SessionNotFound("x".into()).kind(),
            "SessionNotFound"
        );
        let msg: ServerMessage = ProtocolError::UnknownFramerate("25".into()).into();
        assert!(matches!(msg, ServerMessage::Error { kind, .. } if kind == "UnknownFramerate"));
    }
}
