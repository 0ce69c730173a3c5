use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(test)]
pub fn test_env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

pub const DEFAULT_VALIDATION_BASE_URL: &str = "http://localhost:5173/validate";
pub const DEFAULT_QR_SIZE_PX: u32 = 200;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Holds `requests.sqlite` and the `blobs/` directory.
    pub data_dir: PathBuf,
    /// QR codes point at `<validation_base_url>/<token>`.
    pub validation_base_url: String,
    pub qr_size_px: u32,
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: preferred_data_dir(),
            validation_base_url: DEFAULT_VALIDATION_BASE_URL.to_string(),
            qr_size_px: DEFAULT_QR_SIZE_PX,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Ok(url) = std::env::var("SIGNME_VALIDATION_BASE_URL") {
            if !url.trim().is_empty() {
                config.validation_base_url = url.trim().to_string();
            }
        }
        if let Some(secs) = std::env::var("SIGNME_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.fetch_timeout_secs = secs;
        }
        config
    }

    /// Overrides sent by the host with the `init` command.
    pub fn apply_bindings(mut self, bindings: &HashMap<String, String>) -> Self {
        if let Some(dir) = bindings.get("data_dir").filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir.trim());
        }
        if let Some(url) = bindings
            .get("validation_base_url")
            .filter(|u| !u.trim().is_empty())
        {
            self.validation_base_url = url.trim().to_string();
        }
        if let Some(size) = bindings
            .get("qr_size_px")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|s| *s > 0)
        {
            self.qr_size_px = size;
        }
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("requests.sqlite")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

pub fn parse_file_uri_path(uri: &str) -> Option<PathBuf> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    if uri.starts_with('/') {
        return Some(PathBuf::from(uri));
    }
    None
}

/// An explicit `SIGNME_DATA_DIR` wins even if it does not exist yet; the
/// workflow creates it on open. The other candidates must already exist.
pub fn preferred_data_dir() -> PathBuf {
    if let Ok(custom) = std::env::var("SIGNME_DATA_DIR") {
        if !custom.trim().is_empty() {
            return PathBuf::from(custom.trim());
        }
    }
    let mut candidates: Vec<PathBuf> = Vec::new();
    candidates.push(PathBuf::from("/data/user/0/app.signme/files"));
    candidates.push(PathBuf::from("/data/data/app.signme/files"));
    if let Ok(tmpdir) = std::env::var("TMPDIR") {
        candidates.push(PathBuf::from(tmpdir).join("signme"));
    }

    for dir in candidates {
        if let Ok(meta) = std::fs::metadata(&dir) {
            if meta.is_dir() {
                return dir;
            }
        }
    }
    std::env::temp_dir().join("signme")
}
