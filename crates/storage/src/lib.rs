use directories::ProjectDirs;
use pdf_render_scheduler::{PreferenceStore, Preferences, StoreError, PREFERENCES_KEY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported store schema version {0}")]
    UnsupportedVersion(u32),
}

/// Preference store keeping one JSON file per key under a root directory
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ValueEnvelope {
    version: u32,
    value: String,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "PdfRender", "pdf-render")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw value for `key`, `None` when never written
    pub fn read_value(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.value_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(path)?;
        let envelope: ValueEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > STORE_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion(envelope.version));
        }

        Ok(Some(envelope.value))
    }

    pub fn write_value(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope = ValueEnvelope { version: STORE_SCHEMA_VERSION, value: value.to_string() };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.value_path(key), bytes)?;
        Ok(())
    }

    pub fn load_preferences(&self) -> Result<Preferences, StorageError> {
        match self.read_value(PREFERENCES_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Preferences::default()),
        }
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> Result<(), StorageError> {
        let raw = serde_json::to_string(preferences)?;
        self.write_value(PREFERENCES_KEY, &raw)
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(key)))
    }
}

/// Key mapped onto a portable file name
///
/// ASCII letters, digits and `-` pass through; every other byte, `_`
/// included, becomes `_XX` in hex. Distinct keys never share a file.
fn file_stem(key: &str) -> String {
    if key.is_empty() {
        return "_".to_string();
    }

    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{byte:02x}"));
        }
    }
    stem
}

impl PreferenceStore for Storage {
    fn get(&self, key: &str) -> Option<String> {
        match self.read_value(key) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key, %error, root = %self.root.display(), "unreadable preference");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write_value(key, value)?;
        tracing::debug!(key, root = %self.root.display(), "preference written");
        Ok(())
    }
}
