pub(super) const LOG_LEVEL_ENV: &str = "MEDIASHARE_LOG_LEVEL";

pub(super) fn normalize_level(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

pub(super) fn level_from_env_value(value: Option<&str>) -> String {
    if let Some(level) = value.and_then(normalize_level) {
        return level.to_string();
    }

    if cfg!(debug_assertions) {
        "debug".to_string()
    } else {
        "info".to_string()
    }
}

pub(super) fn resolve_log_level() -> String {
    let env_level = std::env::var(LOG_LEVEL_ENV).ok();
    level_from_env_value(env_level.as_deref())
}
