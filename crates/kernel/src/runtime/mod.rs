pub mod blocking;
pub mod spawner;

pub use blocking::run_blocking;
pub use spawner::{BackgroundTask, NoopTaskSpawner, TaskSpawner, TokioTaskSpawner};
