//! Control messages exchanged between sender and receiver.
//!
//! Every message is one JSON object on its own line, discriminated by `"type"`. The raw
//! bytes of an item follow a `FILE_START` line directly on the same stream and are not
//! part of this module.

use std::fmt::{Display, Formatter};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::failure::FailureKind;
use crate::models::ShareableItem;
use crate::{AppResult, ResultExt};

/// Longest control line accepted from a peer, newline excluded.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;
const SESSION_TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ShareMessage {
    Offer { items: Vec<ShareableItem> },
    Approve { ids: Vec<String> },
    Reject,
    FileStart { id: String, size_bytes: u64 },
    Done,
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Offer,
    Approve,
    Reject,
    FileStart,
    Done,
    Error,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "OFFER",
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
            Self::FileStart => "FILE_START",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl ShareMessage {
    pub fn offer(items: &[ShareableItem]) -> Self {
        Self::Offer {
            items: items.to_vec(),
        }
    }

    pub fn file_start(item: &ShareableItem) -> Self {
        Self::FileStart {
            id: item.id.clone(),
            size_bytes: item.size_bytes,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Offer { .. } => MessageKind::Offer,
            Self::Approve { .. } => MessageKind::Approve,
            Self::Reject => MessageKind::Reject,
            Self::FileStart { .. } => MessageKind::FileStart,
            Self::Done => MessageKind::Done,
            Self::Error { .. } => MessageKind::Error,
        }
    }
}

/// A line that is not a valid control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedMessage {
    pub reason: String,
}

impl Display for MalformedMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed message: {}", self.reason)
    }
}

impl std::error::Error for MalformedMessage {}

/// Serializes a message without the trailing newline.
pub fn encode(message: &ShareMessage) -> AppResult<String> {
    serde_json::to_string(message)
        .with_code(
            FailureKind::ProtocolViolation.code(),
            "Could not encode a control message",
        )
        .with_ctx("messageType", message.kind().as_str())
}

/// Parses one control line. Any JSON or schema problem comes back as
/// [`MalformedMessage`]; the caller decides whether that ends the session.
pub fn decode(line: &str) -> Result<ShareMessage, MalformedMessage> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return Err(MalformedMessage {
            reason: "empty line".to_string(),
        });
    }
    if trimmed.len() > MAX_LINE_BYTES {
        return Err(MalformedMessage {
            reason: format!("line too long: {} bytes", trimmed.len()),
        });
    }

    serde_json::from_str::<ShareMessage>(trimmed).map_err(|error| MalformedMessage {
        reason: error.to_string(),
    })
}

/// Opaque token advertised next to the listening port: 32 lowercase hex characters.
pub fn generate_session_token() -> String {
    let mut value = [0u8; SESSION_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut value);
    let mut output = String::with_capacity(SESSION_TOKEN_BYTES * 2);
    for byte in value {
        output.push_str(format!("{byte:02x}").as_str());
    }
    output
}

#[cfg(test)]
#[path = "../tests/transfer/wire_tests.rs"]
mod tests;
