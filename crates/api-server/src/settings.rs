//! Server settings

use std::path::PathBuf;

pub const ADDR_ENV: &str = "API_SERVER_ADDR";
pub const UPLOAD_DIR_ENV: &str = "EMOTION_UPLOAD_DIR";

/// Video container extensions accepted for upload
pub const DEFAULT_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "webm"];

/// Upload size limit (512 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Bind address
    pub addr: String,
    /// Uploaded videos are stored here and resolved from here
    pub upload_dir: PathBuf,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5001".to_string(),
            upload_dir: PathBuf::from("temp_uploads"),
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerSettings {
    /// Defaults overridden by `API_SERVER_ADDR` and `EMOTION_UPLOAD_DIR`
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(addr) = std::env::var(ADDR_ENV) {
            settings.addr = addr;
        }
        if let Ok(dir) = std::env::var(UPLOAD_DIR_ENV) {
            settings.upload_dir = PathBuf::from(dir);
        }
        settings
    }

    /// Lowercased extension of `filename` if it is an allowed video type
    #[must_use]
    pub fn allowed_extension(&self, filename: &str) -> Option<String> {
        let (stem, ext) = filename.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .any(|allowed| *allowed == ext)
            .then_some(ext)
    }
}

/// Reduce a client-supplied name to a safe file name inside the upload dir.
///
/// Keeps the last path component and only ASCII alphanumerics, `.`, `-` and
/// `_`; leading dots are dropped. Returns `None` if nothing usable is left.
#[must_use]
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    (!cleaned.is_empty()).then(|| cleaned.to_string())
}
