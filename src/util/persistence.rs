use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde_json::Error as SerdeError;
use tracing::{debug, warn};

use crate::domain::app_state::PersistedState;

const APP_QUALIFIER: &str = "com";
const APP_ORG: &str = "ParcelQuote";
const APP_NAME: &str = "ParcelQuote";

pub fn data_file() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.config_dir().join("state.json"))
}

pub fn load_persisted_state() -> Option<PersistedState> {
    load_persisted_state_from(&data_file()?)
}

pub fn save_persisted_state(state: &PersistedState) -> Result<(), PersistSaveError> {
    let path = data_file().ok_or(PersistSaveError::StorageUnavailable)?;
    save_persisted_state_to(&path, state)
}

/// Missing, unreadable or malformed files all read as "nothing saved".
pub fn load_persisted_state_from(path: &Path) -> Option<PersistedState> {
    let data = fs::read_to_string(path)
        .map_err(|err| debug!(path = %path.display(), %err, "no saved state"))
        .ok()?;
    serde_json::from_str(&data)
        .map_err(|err| warn!(path = %path.display(), %err, "ignoring malformed saved state"))
        .ok()
}

pub fn save_persisted_state_to(path: &Path, state: &PersistedState) -> Result<(), PersistSaveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json)?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PersistSaveError {
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] SerdeError),
}
