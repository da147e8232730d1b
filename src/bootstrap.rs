use std::path::{Path, PathBuf};
use std::sync::Arc;

use mediashare_kernel::runtime::TokioTaskSpawner;
use mediashare_logging::{LoggingGuard, init_logging};
use mediashare_transfer::discovery::LanDiscovery;
use mediashare_transfer::handoff::UnsupportedTapHandoff;
use mediashare_transfer::keep_alive::LoggingKeepAlive;
use mediashare_transfer::media::FsMediaLibrary;
use mediashare_transfer::settings::{default_data_dir, load_settings};
use mediashare_transfer::{AppResult, TransferCollaborators, TransferService};

use crate::cli::GlobalArgs;

const SETTINGS_FILE_NAME: &str = "settings.json";

/// Everything a command needs, wired once per process.
pub(crate) struct AppContext {
    pub(crate) service: TransferService,
    pub(crate) settings_path: PathBuf,
    logging: LoggingGuard,
}

impl AppContext {
    pub(crate) fn init(args: &GlobalArgs) -> AppResult<Self> {
        let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
        let logging = init_logging(&data_dir)?;

        let settings_path = args
            .config
            .clone()
            .unwrap_or_else(|| settings_path_in(&data_dir));
        let settings = load_settings(Some(&settings_path), &data_dir)?;
        tracing::info!(
            event = "settings_loaded",
            settings_path = %settings_path.display(),
            device_name = settings.device_name.as_str(),
            discovery_port = settings.discovery_port
        );

        let spawner = TokioTaskSpawner::current()?;
        let discovery = LanDiscovery::new(
            Arc::new(spawner),
            settings.discovery_port,
            settings.discovery_interval(),
        );
        let service = TransferService::new(
            settings,
            TransferCollaborators {
                discovery: Arc::new(discovery),
                keep_alive: Arc::new(LoggingKeepAlive::new()),
                media_source: Arc::new(FsMediaLibrary),
                media_sink: Arc::new(FsMediaLibrary),
                tap_handoff: Arc::new(UnsupportedTapHandoff),
            },
        );

        Ok(Self {
            service,
            settings_path,
            logging,
        })
    }

    pub(crate) fn log_dir(&self) -> &Path {
        self.logging.log_dir()
    }
}

pub(crate) fn settings_path_in(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE_NAME)
}
