// # State Store Implementations
//
// This module provides implementations of the StateStore and SettingsStore
// traits, plus the atomic file write they share.

pub mod file;
pub mod memory;
pub mod settings;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use settings::JsonSettingsStore;

use crate::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Temporary sibling used for write-then-rename (`<name>.tmp`)
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `contents` atomically
///
/// The data goes to a temporary file in the same directory that is created
/// with `mode` (Unix only), is flushed, has `mode` reapplied past the umask,
/// and is then renamed over `path`. On any
/// error the temporary file is removed and `path` is left untouched.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<(), Error> {
    let temp = temp_path(path);

    let result = write_temp(&temp, contents, mode).await;
    let result = match result {
        Ok(()) => fs::rename(&temp, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp.display(),
                path.display(),
                e
            ))
        }),
        Err(e) => Err(e),
    };

    if result.is_err() {
        let _ = fs::remove_file(&temp).await;
    }
    result
}

/// Options for a fresh temp file, created with `mode` on Unix
fn temp_options(mode: u32) -> fs::OpenOptions {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    options
}

async fn write_temp(temp: &Path, contents: &[u8], mode: u32) -> Result<(), Error> {
    // A stale temp file keeps its old mode, so start from a fresh one.
    let _ = fs::remove_file(temp).await;

    let mut file = temp_options(mode).open(temp).await.map_err(|e| {
        Error::state_store(format!(
            "Failed to create temp file {}: {}",
            temp.display(),
            e
        ))
    })?;

    file.write_all(contents).await.map_err(|e| {
        Error::state_store(format!(
            "Failed to write to temp file {}: {}",
            temp.display(),
            e
        ))
    })?;

    file.sync_all().await.map_err(|e| {
        Error::state_store(format!(
            "Failed to flush temp file {}: {}",
            temp.display(),
            e
        ))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| {
                Error::state_store(format!(
                    "Failed to set permissions on {}: {}",
                    temp.display(),
                    e
                ))
            })?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}
