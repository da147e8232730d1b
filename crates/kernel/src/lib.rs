pub mod runtime;

pub use protocol::{AppError, AppResult, ResultExt};
