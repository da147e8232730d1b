use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::transport::DEFAULT_CHUNK_SIZE;
use crate::{AppError, AppResult, ResultExt};

pub const DEVICE_NAME_ENV: &str = "MEDIASHARE_DEVICE_NAME";
pub const MEDIA_DIR_ENV: &str = "MEDIASHARE_MEDIA_DIR";
pub const DISCOVERY_PORT_ENV: &str = "MEDIASHARE_DISCOVERY_PORT";

pub const DEFAULT_DISCOVERY_PORT: u16 = 38475;
const FALLBACK_DEVICE_NAME: &str = "mediashare-device";
const MIN_CHUNK_SIZE_BYTES: u32 = 1024;
const MAX_CHUNK_SIZE_BYTES: u32 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSettings {
    pub device_name: String,
    /// Where received media lands. `None` stores everything in `private_dir`.
    pub media_dir: Option<PathBuf>,
    pub private_dir: PathBuf,
    pub chunk_size_bytes: u32,
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
    pub approval_timeout_ms: u64,
    pub accept_timeout_ms: u64,
    pub discovery_port: u16,
    pub discovery_interval_ms: u64,
}

/// Partial settings. Used both for runtime updates and as the on-disk file schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferUpdateSettingsInput {
    pub device_name: Option<String>,
    /// An empty string clears the media directory.
    pub media_dir: Option<String>,
    pub private_dir: Option<String>,
    pub chunk_size_bytes: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub io_timeout_ms: Option<u64>,
    pub approval_timeout_ms: Option<u64>,
    pub accept_timeout_ms: Option<u64>,
    pub discovery_port: Option<u16>,
    pub discovery_interval_ms: Option<u64>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::defaults_for(&default_data_dir())
    }
}

impl TransferSettings {
    pub fn defaults_for(data_dir: &Path) -> Self {
        Self {
            device_name: resolve_device_name(),
            media_dir: dirs_home().map(|home| home.join("Music").join("Mediashare")),
            private_dir: data_dir.join("received"),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE as u32,
            connect_timeout_ms: 10_000,
            io_timeout_ms: 30_000,
            approval_timeout_ms: 300_000,
            accept_timeout_ms: 600_000,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            discovery_interval_ms: 1_500,
        }
    }

    /// Returns a copy with `input` applied and every numeric field clamped.
    pub fn with_update(&self, input: TransferUpdateSettingsInput) -> AppResult<Self> {
        let mut next = self.clone();

        if let Some(value) = input.device_name {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(AppError::new(
                    "transfer_setting_device_name_invalid",
                    "Device name must not be empty",
                ));
            }
            next.device_name = trimmed.to_string();
        }
        if let Some(value) = input.media_dir {
            let trimmed = value.trim();
            next.media_dir = (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
        }
        if let Some(value) = input.private_dir {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(AppError::new(
                    "transfer_setting_private_dir_invalid",
                    "Private storage directory must not be empty",
                ));
            }
            next.private_dir = PathBuf::from(trimmed);
        }
        if let Some(value) = input.chunk_size_bytes {
            next.chunk_size_bytes = value;
        }
        if let Some(value) = input.connect_timeout_ms {
            next.connect_timeout_ms = value;
        }
        if let Some(value) = input.io_timeout_ms {
            next.io_timeout_ms = value;
        }
        if let Some(value) = input.approval_timeout_ms {
            next.approval_timeout_ms = value;
        }
        if let Some(value) = input.accept_timeout_ms {
            next.accept_timeout_ms = value;
        }
        if let Some(value) = input.discovery_port {
            next.discovery_port = value;
        }
        if let Some(value) = input.discovery_interval_ms {
            next.discovery_interval_ms = value;
        }

        Ok(next.clamped())
    }

    pub fn clamped(mut self) -> Self {
        self.chunk_size_bytes = self
            .chunk_size_bytes
            .clamp(MIN_CHUNK_SIZE_BYTES, MAX_CHUNK_SIZE_BYTES);
        self.connect_timeout_ms = self.connect_timeout_ms.clamp(500, 120_000);
        self.io_timeout_ms = self.io_timeout_ms.clamp(1_000, 600_000);
        self.approval_timeout_ms = self.approval_timeout_ms.clamp(5_000, 3_600_000);
        self.accept_timeout_ms = self.accept_timeout_ms.clamp(5_000, 86_400_000);
        self.discovery_port = self.discovery_port.clamp(1024, u16::MAX);
        self.discovery_interval_ms = self.discovery_interval_ms.clamp(250, 60_000);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size_bytes as usize
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_millis(self.approval_timeout_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }
}

/// Defaults, then the optional JSON file, then environment overrides.
pub fn load_settings(path: Option<&Path>, data_dir: &Path) -> AppResult<TransferSettings> {
    let mut settings = TransferSettings::defaults_for(data_dir);

    if let Some(path) = path.filter(|value| value.exists()) {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read settings file {}", path.display()))
            .with_code("settings_read_failed", "Could not read the settings file")
            .with_ctx("settingsPath", path.display().to_string())?;
        let input = serde_json::from_str::<TransferUpdateSettingsInput>(&raw)
            .with_context(|| format!("parse settings file {}", path.display()))
            .with_code("settings_parse_failed", "The settings file is not valid")
            .with_ctx("settingsPath", path.display().to_string())?;
        settings = settings.with_update(input)?;
    }

    apply_env_overrides(settings, |key| std::env::var(key).ok())
}

/// Writes `settings` as the JSON file [`load_settings`] reads. The file is replaced through
/// a sibling temp file so a crash never leaves half a document behind.
pub fn save_settings(path: &Path, settings: &TransferSettings) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|value| !value.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create settings dir {}", parent.display()))
            .with_code("settings_write_failed", "Could not save the settings file")
            .with_ctx("settingsPath", path.display().to_string())?;
    }

    let raw = serde_json::to_string_pretty(settings)
        .context("serialize settings")
        .with_code("settings_write_failed", "Could not save the settings file")?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, raw)
        .and_then(|_| fs::rename(&staging, path))
        .with_context(|| format!("write settings file {}", path.display()))
        .with_code("settings_write_failed", "Could not save the settings file")
        .with_ctx("settingsPath", path.display().to_string())?;

    tracing::info!(event = "settings_saved", settings_path = %path.display());
    Ok(())
}

pub(crate) fn apply_env_overrides<F>(
    settings: TransferSettings,
    lookup: F,
) -> AppResult<TransferSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut input = TransferUpdateSettingsInput {
        device_name: lookup(DEVICE_NAME_ENV).filter(|value| !value.trim().is_empty()),
        media_dir: lookup(MEDIA_DIR_ENV),
        ..Default::default()
    };

    if let Some(raw) = lookup(DISCOVERY_PORT_ENV) {
        match raw.trim().parse::<u16>() {
            Ok(port) => input.discovery_port = Some(port),
            Err(_) => tracing::warn!(
                event = "settings_env_override_ignored",
                key = DISCOVERY_PORT_ENV,
                value = raw.as_str()
            ),
        }
    }

    settings.with_update(input)
}

pub fn default_data_dir() -> PathBuf {
    dirs_home()
        .map(|home| home.join(".mediashare"))
        .unwrap_or_else(|| std::env::temp_dir().join("mediashare"))
}

pub fn resolve_device_name() -> String {
    for key in ["HOSTNAME", "COMPUTERNAME"] {
        if let Ok(value) = std::env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    FALLBACK_DEVICE_NAME.to_string()
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
}

#[cfg(test)]
#[path = "../tests/transfer/settings_tests.rs"]
mod tests;
