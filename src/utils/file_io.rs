use std::fs::create_dir_all;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::error;

use crate::LaunchError;
use crate::Result;

pub fn create_parent_dir_if_not_exist(path: &Path) -> io::Result<()> {
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            create_dir_all(parent_dir)?;
        }
    }
    Ok(())
}

/// Opens a fresh log file, truncating output of an earlier run with the same name.
pub fn open_log_file(path: &Path) -> Result<File> {
    let open = || {
        create_parent_dir_if_not_exist(path)?;
        OpenOptions::new().write(true).create(true).truncate(true).open(path)
    };
    open().map_err(|source| {
        error!("Failed to open log file {:?}: {:?}", path, source);
        LaunchError::LogFile {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Recursively copies `src` into `dst`, creating `dst` if needed.
pub fn copy_dir_all(
    src: &Path,
    dst: &Path,
) -> io::Result<()> {
    create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Creates `<base>/peer{n}` and copies the configuration template into it.
///
/// The template lands under its own directory name, so a `config` template
/// becomes `<base>/peer{n}/config`.
pub fn make_peer_dir(
    base: &Path,
    peer_number: usize,
    template: Option<&Path>,
) -> Result<PathBuf> {
    let peer_dir = base.join(format!("peer{peer_number}"));
    let working_dir_error = |source| LaunchError::WorkingDir {
        path: peer_dir.clone(),
        source,
    };

    create_dir_all(&peer_dir).map_err(working_dir_error)?;

    if let Some(template) = template {
        let name = template.file_name().unwrap_or(template.as_os_str());
        copy_dir_all(template, &peer_dir.join(name)).map_err(working_dir_error)?;
    }

    debug!(?peer_dir, "peer directory ready");
    Ok(peer_dir)
}

/// Creates the log folder of one test, `<log_root>/<test_name>`.
pub fn init_test_log_dir(
    log_root: &Path,
    test_name: &str,
) -> Result<PathBuf> {
    let log_dir = log_root.join(test_name);
    create_dir_all(&log_dir).map_err(|source| LaunchError::WorkingDir {
        path: log_dir.clone(),
        source,
    })?;
    Ok(log_dir)
}

/// Name of the running test, taken from the libtest thread name.
///
/// `checks::tests::wait_for_leader` yields `wait_for_leader`; threads that
/// carry no test name (e.g. `main`) get a random run id instead.
pub fn current_test_name() -> String {
    std::thread::current()
        .name()
        .filter(|name| *name != "main")
        .and_then(|name| name.rsplit("::").next())
        .filter(|name| !name.is_empty())
        .map(sanitize_dir_name)
        .unwrap_or_else(|| format!("run-{}", nanoid::nanoid!(8)))
}

fn sanitize_dir_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
