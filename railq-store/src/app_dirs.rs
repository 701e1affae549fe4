//! Resolve the data directory used by the file-backed session store.
//!
//! An environment override wins; otherwise the platform location from the
//! `directories` crate is used.

use std::env;
use std::path::PathBuf;

use directories::ProjectDirs;
use railq_core::StoreError;

const QUALIFIER: &str = "io";
const ORGANIZATION: &str = "railq";
const APPLICATION: &str = "railq";

const DATA_DIR_ENV: &str = "RAILQ_DATA_DIR";

/// File name of the session store inside the data directory.
pub const SESSION_FILE: &str = "session.json";

fn project_dirs() -> Result<ProjectDirs, StoreError> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .ok_or_else(|| StoreError::Backend("unable to determine project directories".into()))
}

/// An empty variable counts as unset.
fn dir_from_env(name: &str) -> Option<PathBuf> {
    let value = env::var_os(name)?;
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

pub fn get_data_dir() -> Result<PathBuf, StoreError> {
    if let Some(dir) = dir_from_env(DATA_DIR_ENV) {
        return Ok(dir);
    }

    Ok(project_dirs()?.data_local_dir().to_path_buf())
}

/// Default location of the session store file.
pub fn default_session_file() -> Result<PathBuf, StoreError> {
    Ok(get_data_dir()?.join(SESSION_FILE))
}
