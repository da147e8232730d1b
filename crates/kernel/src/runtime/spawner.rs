use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinHandle;

use crate::{AppError, AppResult};

pub type BackgroundTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Seam for launching long-lived async tasks (discovery loops and the like) so callers
/// can run without an ambient runtime in tests.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, task_name: &'static str, task: BackgroundTask) -> AppResult<JoinHandle<()>>;
}

fn runtime_unavailable(task_name: &'static str) -> AppError {
    AppError::new("runtime_unavailable", "Async runtime is not available")
        .with_context("task", task_name)
}

/// Spawns on the runtime captured at construction, or the ambient one.
#[derive(Default, Clone)]
pub struct TokioTaskSpawner {
    handle: Option<tokio::runtime::Handle>,
}

impl TokioTaskSpawner {
    pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Captures the current runtime so later spawns work from plain threads too.
    pub fn current() -> AppResult<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| runtime_unavailable("capture_runtime"))?;
        Ok(Self::with_handle(handle))
    }
}

impl TaskSpawner for TokioTaskSpawner {
    fn spawn(&self, task_name: &'static str, task: BackgroundTask) -> AppResult<JoinHandle<()>> {
        let handle = match &self.handle {
            Some(handle) => handle.clone(),
            None => tokio::runtime::Handle::try_current()
                .map_err(|_| runtime_unavailable(task_name))?,
        };
        tracing::debug!(event = "background_task_spawned", task = task_name);
        Ok(handle.spawn(task))
    }
}

#[derive(Default)]
pub struct NoopTaskSpawner;

impl TaskSpawner for NoopTaskSpawner {
    fn spawn(&self, task_name: &'static str, _task: BackgroundTask) -> AppResult<JoinHandle<()>> {
        Err(runtime_unavailable(task_name))
    }
}
