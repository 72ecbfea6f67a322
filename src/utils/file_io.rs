use std::fs;
use std::fs::File;
use std::path::Path;

use tracing::error;

use crate::Result;
use crate::SystemError;

/// Creates parent directories for the given path.
/// e.g. path = "/tmp/a/b/x.txt", "/tmp/a/b" will be created
pub fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    let dir_to_create = path.parent().unwrap_or(path);

    if !dir_to_create.exists() {
        if let Err(e) = fs::create_dir_all(dir_to_create) {
            error!(?e, "create_parent_dir_if_not_exist failed.");
            return Err(SystemError::Path {
                path: path.to_path_buf(),
                source: e,
            }
            .into());
        }
    }

    Ok(())
}

/// Writes data into a freshly created file, creating parent directories
/// as needed.
pub fn dump_data(
    path: &Path,
    data: &[u8],
) -> Result<()> {
    create_parent_dir_if_not_exist(path)?;
    fs::write(path, data).map_err(|e| {
        SystemError::Path {
            path: path.to_path_buf(),
            source: e,
        }
        .into()
    })
}

/// Opens (creating if needed) a file for appending, for the log file
/// sink.
pub fn open_file_for_append(path: &Path) -> Result<File> {
    create_parent_dir_if_not_exist(path)?;
    fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| {
            SystemError::Path {
                path: path.to_path_buf(),
                source: e,
            }
            .into()
        })
}

/// Creates an empty file that a hook process can write its result into.
pub fn create_empty_writable_file(path: &Path) -> Result<()> {
    create_parent_dir_if_not_exist(path)?;
    File::create(path).map_err(|e| SystemError::Path {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Removes a tempfile, logging instead of failing: cleanup must not mask
/// the original task result.
pub fn remove_file_logged(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            error!(path = %path.display(), ?e, "remove tmp file failed");
        }
    }
}

/// A file counts as executable when any execute bit is set.
#[cfg(unix)]
pub fn is_file_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}
