pub mod discovery;
pub mod failure;
pub mod handoff;
pub mod keep_alive;
mod locks;
pub mod media;
pub mod service;
pub mod settings;
pub mod state;
pub mod transport;
pub mod wire;

pub use protocol::models;
pub use protocol::{AppError, AppResult, ResultExt};
pub use service::{TransferCollaborators, TransferService};
