use anyhow::Context;
use mediashare_transfer::settings::{TransferUpdateSettingsInput, save_settings};

use crate::bootstrap::AppContext;

pub(crate) fn run(
    context: &AppContext,
    device_name: Option<String>,
    media_dir: Option<String>,
    chunk_size_bytes: Option<u32>,
) -> anyhow::Result<()> {
    let input = TransferUpdateSettingsInput {
        device_name,
        media_dir,
        chunk_size_bytes,
        ..Default::default()
    };

    let settings = if input == TransferUpdateSettingsInput::default() {
        context.service.settings()
    } else {
        let updated = context.service.update_settings(input)?;
        save_settings(&context.settings_path, &updated)?;
        println!("Saved {}", context.settings_path.display());
        updated
    };

    let rendered = serde_json::to_string_pretty(&settings).context("render settings")?;
    println!("{rendered}");
    Ok(())
}
