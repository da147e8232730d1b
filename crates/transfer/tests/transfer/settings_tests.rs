use super::*;
use std::collections::HashMap;

fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mediashare-{label}-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_should_use_documented_values() {
    let data_dir = PathBuf::from("/var/lib/mediashare");
    let settings = TransferSettings::defaults_for(&data_dir);

    assert_eq!(settings.private_dir, data_dir.join("received"));
    assert_eq!(settings.chunk_size(), 8192);
    assert_eq!(settings.connect_timeout(), Duration::from_secs(10));
    assert_eq!(settings.io_timeout(), Duration::from_secs(30));
    assert_eq!(settings.approval_timeout(), Duration::from_secs(300));
    assert_eq!(settings.accept_timeout(), Duration::from_secs(600));
    assert_eq!(settings.discovery_port, DEFAULT_DISCOVERY_PORT);
    assert_eq!(settings.discovery_interval(), Duration::from_millis(1500));
    assert!(!settings.device_name.trim().is_empty());
}

#[test]
fn with_update_should_clamp_numeric_fields() {
    let base = TransferSettings::defaults_for(Path::new("/tmp/data"));
    let next = base
        .with_update(TransferUpdateSettingsInput {
            chunk_size_bytes: Some(16),
            connect_timeout_ms: Some(1),
            io_timeout_ms: Some(u64::MAX),
            approval_timeout_ms: Some(0),
            accept_timeout_ms: Some(u64::MAX),
            discovery_port: Some(80),
            discovery_interval_ms: Some(10),
            ..Default::default()
        })
        .expect("apply update");

    assert_eq!(next.chunk_size_bytes, 1024);
    assert_eq!(next.connect_timeout_ms, 500);
    assert_eq!(next.io_timeout_ms, 600_000);
    assert_eq!(next.approval_timeout_ms, 5_000);
    assert_eq!(next.accept_timeout_ms, 86_400_000);
    assert_eq!(next.discovery_port, 1024);
    assert_eq!(next.discovery_interval_ms, 250);
}

#[test]
fn with_update_should_reject_blank_device_name() {
    let base = TransferSettings::defaults_for(Path::new("/tmp/data"));
    let error = base
        .with_update(TransferUpdateSettingsInput {
            device_name: Some("   ".to_string()),
            ..Default::default()
        })
        .expect_err("blank name must fail");
    assert_eq!(error.code, "transfer_setting_device_name_invalid");
}

#[test]
fn empty_media_dir_should_fall_back_to_private_storage() {
    let base = TransferSettings::defaults_for(Path::new("/tmp/data"));
    let next = base
        .with_update(TransferUpdateSettingsInput {
            media_dir: Some(String::new()),
            ..Default::default()
        })
        .expect("apply update");
    assert_eq!(next.media_dir, None);
}

#[test]
fn load_settings_should_merge_file_over_defaults() {
    let data_dir = temp_dir("settings-file");
    let path = data_dir.join("settings.json");
    fs::write(
        &path,
        r#"{"deviceName":"Living Room","chunkSizeBytes":65536,"mediaDir":"/srv/music"}"#,
    )
    .expect("write settings file");

    let settings = load_settings(Some(&path), &data_dir).expect("load settings");
    assert_eq!(settings.chunk_size_bytes, 65536);
    assert_eq!(settings.media_dir, Some(PathBuf::from("/srv/music")));
    assert_eq!(settings.io_timeout_ms, 30_000);

    let _ = fs::remove_dir_all(data_dir);
}

#[test]
fn load_settings_should_fail_on_invalid_json() {
    let data_dir = temp_dir("settings-invalid");
    let path = data_dir.join("settings.json");
    fs::write(&path, "{ not json").expect("write settings file");

    let error = load_settings(Some(&path), &data_dir).expect_err("invalid json must fail");
    assert_eq!(error.code, "settings_parse_failed");
    assert!(error.context_value("settingsPath").is_some());

    let _ = fs::remove_dir_all(data_dir);
}

#[test]
fn load_settings_should_ignore_missing_file() {
    let data_dir = temp_dir("settings-missing");
    let settings =
        load_settings(Some(&data_dir.join("absent.json")), &data_dir).expect("load settings");
    assert_eq!(settings.private_dir, data_dir.join("received"));

    let _ = fs::remove_dir_all(data_dir);
}

#[test]
fn env_overrides_should_replace_file_values() {
    let base = TransferSettings::defaults_for(Path::new("/tmp/data"));
    let settings = apply_env_overrides(
        base,
        lookup_from(&[
            (DEVICE_NAME_ENV, "Kitchen"),
            (MEDIA_DIR_ENV, "/mnt/media"),
            (DISCOVERY_PORT_ENV, "40000"),
        ]),
    )
    .expect("apply env");

    assert_eq!(settings.device_name, "Kitchen");
    assert_eq!(settings.media_dir, Some(PathBuf::from("/mnt/media")));
    assert_eq!(settings.discovery_port, 40000);
}

#[test]
fn env_overrides_should_skip_unparsable_port() {
    let base = TransferSettings::defaults_for(Path::new("/tmp/data"));
    let settings = apply_env_overrides(base, lookup_from(&[(DISCOVERY_PORT_ENV, "http")]))
        .expect("apply env");
    assert_eq!(settings.discovery_port, DEFAULT_DISCOVERY_PORT);
}

#[test]
fn saved_settings_should_load_back_unchanged() {
    let data_dir = temp_dir("settings-save");
    let path = data_dir.join("nested").join("settings.json");
    let mut settings = TransferSettings::defaults_for(&data_dir);
    settings.device_name = "Kitchen".to_string();
    settings.media_dir = Some(data_dir.join("music"));
    settings.chunk_size_bytes = 4096;

    save_settings(&path, &settings).expect("save settings");
    let loaded = load_settings(Some(&path), &data_dir).expect("load settings");

    assert_eq!(loaded, settings);
    assert!(!path.with_extension("json.tmp").exists());
}
