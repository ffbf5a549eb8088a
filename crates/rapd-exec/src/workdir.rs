use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use rapd_core::PersistError;

const MAX_SUFFIX: u32 = 1000;

/// Resolve a job's working directory under `launch_dir` and create it.
///
/// An existing directory is never reused: the first free `<dir>_<n>` is taken instead. When all
/// suffixes are taken the plain directory is shared.
pub fn fix_work_dir(launch_dir: &Path, work: Option<&Path>) -> Result<PathBuf, PersistError> {
    let candidate = match work {
        Some(work) => launch_dir.join(work),
        None => launch_dir.to_path_buf(),
    };

    let dir = if work.is_some() && candidate.exists() {
        (1..MAX_SUFFIX)
            .map(|n| {
                let mut name = OsString::from(candidate.as_os_str());
                name.push(format!("_{n}"));
                PathBuf::from(name)
            })
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    } else {
        candidate
    };

    fs::create_dir_all(&dir).map_err(|source| PersistError::CreateDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}
