use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One media file as it is offered to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareableItem {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Address, token and display name of a reachable peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub host: String,
    pub port: u16,
    pub session_token: String,
    pub device_name: String,
}

impl SessionInfo {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The sender's local selection before size and type are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalMediaItem {
    pub id: String,
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionRole {
    Sender,
    Receiver,
}

impl SessionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Receiver => "receiver",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TransferState {
    #[default]
    Idle,
    Connecting,
    Offering {
        items: Vec<ShareableItem>,
    },
    WaitingApproval,
    Transferring {
        item: ShareableItem,
        bytes_transferred: u64,
        total_bytes: u64,
        item_index: usize,
        total_items: usize,
    },
    Done,
    Error {
        message: String,
    },
}

impl TransferState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Offering { .. } => "offering",
            Self::WaitingApproval => "waitingApproval",
            Self::Transferring { .. } => "transferring",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// States a UI renders as an indeterminate spinner.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Offering { .. } | Self::WaitingApproval
        )
    }

    /// Fraction of the current item already moved, when transferring.
    pub fn progress(&self) -> Option<f64> {
        match self {
            Self::Transferring {
                bytes_transferred,
                total_bytes,
                ..
            } => {
                if *total_bytes == 0 {
                    return Some(1.0);
                }
                Some(*bytes_transferred as f64 / *total_bytes as f64)
            }
            _ => None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "../tests/core/models_tests.rs"]
mod tests;
