//! Media library collaborators: where outgoing bytes come from and where incoming
//! files go.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use regex::Regex;

use crate::failure::FailureKind;
use crate::models::{LocalMediaItem, ShareableItem};
use crate::settings::TransferSettings;
use crate::{AppResult, ResultExt};

const ID_SUFFIX_LEN: usize = 8;
const MAX_TITLE_CHARS: usize = 80;
const FALLBACK_TITLE: &str = "track";
const FALLBACK_MIME: &str = "application/octet-stream";

const MIME_BY_EXTENSION: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("flac", "audio/flac"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("opus", "audio/opus"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("wav", "audio/wav"),
    ("aiff", "audio/aiff"),
    ("wma", "audio/x-ms-wma"),
    ("mp4", "video/mp4"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
];

/// Sender side: resolves a local selection and opens it for streaming.
pub trait MediaSource: Send + Sync {
    fn describe(&self, item: &LocalMediaItem) -> AppResult<ShareableItem>;

    fn open(&self, item: &LocalMediaItem) -> AppResult<Box<dyn Read + Send>>;
}

/// Receiver side: picks a destination for each incoming item.
pub trait MediaSink: Send + Sync {
    /// Returns a path that does not exist yet, inside a directory that does.
    fn prepare_destination(
        &self,
        item: &ShareableItem,
        settings: &TransferSettings,
    ) -> AppResult<PathBuf>;

    /// Called once per fully written item.
    fn item_received(&self, _item: &ShareableItem, _path: &Path) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsMediaLibrary;

impl MediaSource for FsMediaLibrary {
    fn describe(&self, item: &LocalMediaItem) -> AppResult<ShareableItem> {
        let metadata = fs::metadata(&item.path)
            .with_context(|| format!("read metadata of {}", item.path.display()))
            .with_code(FailureKind::Io.code(), "Could not read the media file")
            .with_ctx("itemId", item.id.clone())?;
        if !metadata.is_file() {
            return Err(FailureKind::Io
                .error("Only regular files can be shared")
                .with_context("itemId", item.id.clone()));
        }

        Ok(ShareableItem {
            id: item.id.clone(),
            title: item.title.clone(),
            artist: item.artist.clone(),
            album: item.album.clone(),
            size_bytes: metadata.len(),
            mime_type: mime_for_path(&item.path).to_string(),
        })
    }

    fn open(&self, item: &LocalMediaItem) -> AppResult<Box<dyn Read + Send>> {
        let file = File::open(&item.path)
            .with_context(|| format!("open {}", item.path.display()))
            .with_code(FailureKind::Io.code(), "Could not read the media file")
            .with_ctx("itemId", item.id.clone())?;
        Ok(Box::new(file))
    }
}

impl MediaSink for FsMediaLibrary {
    fn prepare_destination(
        &self,
        item: &ShareableItem,
        settings: &TransferSettings,
    ) -> AppResult<PathBuf> {
        let dir = destination_dir(settings)?;
        Ok(resolve_conflict_path(&dir.join(destination_file_name(item))))
    }

    fn item_received(&self, item: &ShareableItem, path: &Path) {
        tracing::info!(
            event = "transfer_item_saved",
            item_id = item.id.as_str(),
            size_bytes = item.size_bytes,
            path = %path.display()
        );
    }
}

/// The configured media directory, or private storage when it is unset or unusable.
pub fn destination_dir(settings: &TransferSettings) -> AppResult<PathBuf> {
    if let Some(media_dir) = settings.media_dir.as_ref() {
        match fs::create_dir_all(media_dir) {
            Ok(()) => return Ok(media_dir.clone()),
            Err(error) => {
                tracing::warn!(
                    event = "transfer_media_dir_unavailable",
                    media_dir = %media_dir.display(),
                    error = error.to_string()
                );
            }
        }
    }

    fs::create_dir_all(&settings.private_dir)
        .with_context(|| format!("create {}", settings.private_dir.display()))
        .with_code(FailureKind::Io.code(), "Could not prepare storage for received files")
        .with_ctx("privateDir", settings.private_dir.display().to_string())?;
    Ok(settings.private_dir.clone())
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|value| value.to_str()) else {
        return FALLBACK_MIME;
    };
    let extension = extension.to_ascii_lowercase();
    MIME_BY_EXTENSION
        .iter()
        .find(|(candidate, _)| *candidate == extension)
        .map(|(_, mime)| *mime)
        .unwrap_or(FALLBACK_MIME)
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    match mime_type.as_str() {
        "audio/x-wav" | "audio/wave" => "wav",
        "audio/x-flac" => "flac",
        "audio/mp3" => "mp3",
        "audio/x-m4a" => "m4a",
        _ => MIME_BY_EXTENSION
            .iter()
            .find(|(_, mime)| *mime == mime_type)
            .map(|(extension, _)| *extension)
            .unwrap_or("bin"),
    }
}

fn unsafe_chars() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]+"#).ok())
        .as_ref()
}

pub fn sanitize_title(title: &str) -> String {
    let replaced = match unsafe_chars() {
        Some(pattern) => pattern.replace_all(title, "_").into_owned(),
        None => title
            .chars()
            .map(|value| if value.is_alphanumeric() || value == ' ' { value } else { '_' })
            .collect(),
    };
    let trimmed: String = replaced
        .trim()
        .trim_matches('.')
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<sanitized title>_<first 8 id chars>.<extension>`.
pub fn destination_file_name(item: &ShareableItem) -> String {
    let id_suffix: String = item
        .id
        .chars()
        .filter(|value| value.is_ascii_alphanumeric() || *value == '-')
        .take(ID_SUFFIX_LEN)
        .collect();
    let title = sanitize_title(&item.title);
    let extension = extension_for_mime(&item.mime_type);
    if id_suffix.is_empty() {
        format!("{title}.{extension}")
    } else {
        format!("{title}_{id_suffix}.{extension}")
    }
}

/// First of `name.ext`, `name (1).ext`, `name (2).ext`, ... that does not exist.
pub fn resolve_conflict_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());
    let extension = path
        .extension()
        .map(|value| value.to_string_lossy().to_string());
    let parent = path
        .parent()
        .map(|value| value.to_path_buf())
        .unwrap_or_default();

    for index in 1..10_000 {
        let name = match extension.as_deref() {
            Some(ext) => format!("{stem} ({index}).{ext}"),
            None => format!("{stem} ({index})"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }

    path.to_path_buf()
}

#[cfg(test)]
#[path = "../tests/transfer/media_tests.rs"]
mod tests;
