use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("session data is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}

/// On-disk envelope. Files written by older releases carry an extra `mux`
/// field, which is ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SessionEnvelope {
    #[serde(default)]
    data: Option<String>,
}

/// Persists the opaque client session blob to a single JSON file.
///
/// Loads share the lock; a store excludes loads and other stores.
pub struct SessionStore {
    path: PathBuf,
    state: RwLock<SessionEnvelope>,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: RwLock::new(SessionEnvelope::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored blob, or [`SessionError::NotFound`] when the file
    /// is missing or holds no data. A missing file is created as `{}`.
    pub fn load(&self) -> Result<Vec<u8>, SessionError> {
        let _guard = self.state.read().unwrap_or_else(PoisonError::into_inner);

        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                create_empty(&self.path)?;
                tracing::info!(path = %self.path.display(), "created empty session file");
                return Err(SessionError::NotFound);
            }
            Err(err) => return Err(SessionError::Io(err)),
        };

        let envelope: SessionEnvelope = serde_json::from_slice(&contents)?;
        let data = match envelope.data.as_deref() {
            Some(encoded) if !encoded.is_empty() => STANDARD.decode(encoded)?,
            _ => return Err(SessionError::NotFound),
        };
        if data.is_empty() {
            return Err(SessionError::NotFound);
        }
        Ok(data)
    }

    /// Replaces the stored blob and rewrites the whole file.
    pub fn store(&self, data: &[u8]) -> Result<(), SessionError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.data = Some(STANDARD.encode(data));

        let payload = to_json_one_space(&*state)?;
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        fs::write(&self.path, payload)?;
        set_file_permissions(&self.path, 0o600)?;
        tracing::debug!(path = %self.path.display(), bytes = data.len(), "stored session");
        Ok(())
    }
}

fn to_json_one_space<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut payload = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut payload, formatter);
    value.serialize(&mut serializer)?;
    Ok(payload)
}

fn create_empty(path: &Path) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(b"{}")?;
            set_file_permissions(path, 0o600)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err),
    }
}

fn ensure_dir(path: &Path) -> Result<(), io::Error> {
    if path.as_os_str().is_empty() || path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)?;
    set_dir_permissions(path, 0o700)?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm)
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}
