use std::path::{Path, PathBuf};

pub const GAMES_STORE_FILE: &str = "games.json";
pub const FIRMWARE_STORE_FILE: &str = "firmware.json";

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

fn env_dir(key: &str) -> Option<PathBuf> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    ensure_dir(&PathBuf::from(trimmed))
}

/// Root directory holding the persisted stores. `HOSHI_ROOT_DIR` overrides;
/// otherwise a `data` directory next to the executable, falling back to the
/// working directory.
pub fn resolve_root_dir() -> PathBuf {
    if let Some(dir) = env_dir("HOSHI_ROOT_DIR") {
        return dir;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("data");
            if let Some(found) = ensure_dir(&candidate) {
                return found;
            }
        }
    }

    PathBuf::from(".")
}

pub fn resolve_log_dir() -> PathBuf {
    if let Some(dir) = env_dir("HOSHI_LOG_DIR") {
        return dir;
    }

    let candidate = resolve_root_dir().join("logs");
    ensure_dir(&candidate).unwrap_or(candidate)
}

pub fn games_store_path(root: &Path) -> PathBuf {
    root.join(GAMES_STORE_FILE)
}

pub fn firmware_store_path(root: &Path) -> PathBuf {
    root.join(FIRMWARE_STORE_FILE)
}
