use std::path::{Path, PathBuf};

use mediashare_transfer::models::LocalMediaItem;

use super::{finish, run_session};
use crate::bootstrap::AppContext;

const UNKNOWN_ARTIST: &str = "Unknown artist";

pub(crate) async fn run(
    context: &AppContext,
    paths: Vec<PathBuf>,
    artist: Option<String>,
) -> anyhow::Result<()> {
    let items = local_items(&paths, artist.as_deref())?;
    let service = context.service.clone();
    let session = service.local_session_info();
    println!(
        "Sharing {} item(s) from \"{}\" at {}. Waiting for a receiver...",
        items.len(),
        session.device_name,
        session.host
    );

    let worker = service.clone();
    let state = run_session(&service, "send", async move {
        worker.start_sender(items, session).await;
    })
    .await?;
    finish(&state)
}

/// One shareable item per regular file, titled after the file stem.
pub(crate) fn local_items(
    paths: &[PathBuf],
    artist: Option<&str>,
) -> anyhow::Result<Vec<LocalMediaItem>> {
    paths
        .iter()
        .map(|path| {
            if !path.is_file() {
                anyhow::bail!("Not a file: {}", path.display());
            }
            Ok(LocalMediaItem {
                id: uuid::Uuid::new_v4().simple().to_string(),
                path: path.clone(),
                title: title_for(path),
                artist: artist.unwrap_or(UNKNOWN_ARTIST).to_string(),
                album: None,
            })
        })
        .collect()
}

fn title_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().trim().to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

#[cfg(test)]
#[path = "../../tests/commands/send_tests.rs"]
mod tests;
