use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder text of a frame rejected for its size
pub const TOO_LONG_TEXT: &str = "[Message too long]";

/// Placeholder text of a frame whose payload is not valid UTF-8
pub const UNDECODABLE_TEXT: &str = "[Decoding message data failed]";

/// Kind of an application-level frame problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    MessageTooLong,
    MessageEncodingIllegal,
}

/// Frame problem reported to the protocol layer, with the arguments needed
/// to render a user-facing message (e.g. the offending length).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, args: Vec<String>) -> Self {
        Self { kind, args }
    }

    pub fn too_long(declared_length: u32) -> Self {
        Self::new(ErrorKind::MessageTooLong, vec![declared_length.to_string()])
    }

    pub fn encoding_illegal() -> Self {
        Self::new(ErrorKind::MessageEncodingIllegal, Vec::new())
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if !self.args.is_empty() {
            write!(f, "({})", self.args.join(", "))?;
        }
        Ok(())
    }
}

/// Outcome of reading one frame.
///
/// Only `TooLong` is fatal: its payload was left unread, so the stream is out
/// of sync and the caller has to close the connection. `Undecodable` frames
/// were consumed completely and the connection stays usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameResult {
    Message(String),
    TooLong(ErrorInfo),
    Undecodable(ErrorInfo),
}

impl FrameResult {
    /// Decoded text, or the placeholder for a rejected frame
    pub fn text(&self) -> &str {
        match self {
            FrameResult::Message(text) => text,
            FrameResult::TooLong(_) => TOO_LONG_TEXT,
            FrameResult::Undecodable(_) => UNDECODABLE_TEXT,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            FrameResult::Message(_) => None,
            FrameResult::TooLong(info) | FrameResult::Undecodable(info) => Some(info),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameResult::TooLong(_))
    }

    pub fn into_text(self) -> String {
        match self {
            FrameResult::Message(text) => text,
            other => other.text().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_accessors() {
        let result = FrameResult::Message("check-domain".into());
        assert_eq!(result.text(), "check-domain");
        assert!(result.error().is_none());
        assert!(!result.is_fatal());
    }

    #[test]
    fn test_too_long_is_fatal() {
        let result = FrameResult::TooLong(ErrorInfo::too_long(70000));
        assert!(result.is_fatal());
        assert_eq!(result.text(), TOO_LONG_TEXT);

        let info = result.error().unwrap();
        assert_eq!(info.kind, ErrorKind::MessageTooLong);
        assert_eq!(info.args, vec!["70000".to_string()]);
        assert_eq!(info.to_string(), "MessageTooLong(70000)");
    }

    #[test]
    fn test_undecodable_is_not_fatal() {
        let result = FrameResult::Undecodable(ErrorInfo::encoding_illegal());
        assert!(!result.is_fatal());
        assert_eq!(result.clone().into_text(), UNDECODABLE_TEXT);
        assert_eq!(result.error().unwrap().to_string(), "MessageEncodingIllegal");
    }

    #[test]
    fn test_error_info_serializes() {
        let json = serde_json::to_value(ErrorInfo::too_long(5)).unwrap();
        assert_eq!(json["kind"], "MessageTooLong");
        assert_eq!(json["args"][0], "5");
    }
}
