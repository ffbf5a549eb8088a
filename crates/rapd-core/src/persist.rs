//! Command files: the hand-off between a launcher and the process that executes a job.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

/// Suffix of every persisted command file.
pub const COMMAND_SUFFIX: &str = ".rapd";

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Write `payload` to a fresh file `<tag>_<random>.rapd` inside `dir` and return its absolute path.
///
/// The file is created exclusively, so concurrent launches never share a name. It is flushed
/// and closed before this returns, and it is never removed here: the consumer owns it.
pub fn write_command_file(dir: &Path, tag: &str, payload: &[u8]) -> Result<PathBuf, PersistError> {
    fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let write_err = |source| PersistError::Write {
        path: dir.to_path_buf(),
        source,
    };

    let prefix = format!("{}_", file_safe(tag));
    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(COMMAND_SUFFIX)
        .tempfile_in(dir)
        .map_err(write_err)?;

    file.write_all(payload).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;

    let (_, path) = file.keep().map_err(|e| write_err(e.error))?;
    let path = std::path::absolute(&path).map_err(write_err)?;
    trace!(target: "rapd.core.persist", path = %path.display(), bytes = payload.len(), "command file written");
    Ok(path)
}

/// Write an executable wrapper script that runs `command_line` under `shell`.
pub fn write_command_script(path: &Path, command_line: &str, shell: &str) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| PersistError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let write_err = |source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    };

    fs::write(path, format!("#!{shell}\n{command_line}\n")).map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(write_err)?;
    }
    Ok(())
}

fn file_safe(tag: &str) -> String {
    let tag: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    if tag.is_empty() { "job".to_string() } else { tag }
}
