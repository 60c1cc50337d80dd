use std::path::PathBuf;

/// Symbolic name for the playback data directory
pub const DATA_DIR_ALIAS: &str = "@data";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "CSV_PLAYBACK_DATA";

/// Root of the playback data directory
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("csv-playback")
        .join("data")
}

/// Resolve a configured directory: the `@data` alias, `~`, or a literal path
pub fn resolve_directory(configured: &str) -> PathBuf {
    let configured = configured.trim();
    if configured.is_empty() {
        return data_dir();
    }
    if let Some(rest) = configured.strip_prefix(DATA_DIR_ALIAS) {
        if rest.is_empty() {
            return data_dir();
        }
        if let Some(rest) = rest.strip_prefix('/') {
            return data_dir().join(rest);
        }
    }
    if configured == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = configured.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(configured)
}
