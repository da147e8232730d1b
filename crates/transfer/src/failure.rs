use crate::AppError;

pub const CONNECTION_FAILED_CODE: &str = "transfer_connection_failed";
pub const PROTOCOL_VIOLATION_CODE: &str = "transfer_protocol_violation";
pub const PEER_DECLINED_CODE: &str = "transfer_peer_declined";
pub const NO_ITEMS_APPROVED_CODE: &str = "transfer_no_items_approved";
pub const IO_FAILED_CODE: &str = "transfer_io_failed";
pub const SESSION_CANCELED_CODE: &str = "transfer_session_canceled";

/// Session-level failure classes. Everything except [`FailureKind::Canceled`] ends a
/// session in `TransferState::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connection,
    ProtocolViolation,
    PeerDeclined,
    NoItemsApproved,
    Io,
    Canceled,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Connection => CONNECTION_FAILED_CODE,
            Self::ProtocolViolation => PROTOCOL_VIOLATION_CODE,
            Self::PeerDeclined => PEER_DECLINED_CODE,
            Self::NoItemsApproved => NO_ITEMS_APPROVED_CODE,
            Self::Io => IO_FAILED_CODE,
            Self::Canceled => SESSION_CANCELED_CODE,
        }
    }

    pub fn of(error: &AppError) -> Option<Self> {
        [
            Self::Connection,
            Self::ProtocolViolation,
            Self::PeerDeclined,
            Self::NoItemsApproved,
            Self::Io,
            Self::Canceled,
        ]
        .into_iter()
        .find(|kind| kind.code() == error.code)
    }

    pub fn error(self, message: impl Into<String>) -> AppError {
        AppError::new(self.code(), message)
    }
}

pub fn is_canceled(error: &AppError) -> bool {
    error.code == SESSION_CANCELED_CODE
}

pub fn canceled() -> AppError {
    FailureKind::Canceled.error("Transfer canceled")
}
