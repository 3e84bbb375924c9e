use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};

use crate::types::SurgeResult;

/// Environment variable to override the path to the worker binary.
pub const SURGE_WORKER_PATH_ENV: &str = "SURGE_WORKER_PATH";

const WORKER_BIN_NAME: &str = "surge-worker";

/// Get the path to the worker binary.
///
/// If [SURGE_WORKER_PATH_ENV] is set then its value is used. Otherwise a `surge-worker` binary
/// installed next to the running executable is preferred, falling back to the user's `PATH`.
pub fn worker_path() -> SurgeResult<PathBuf> {
    match env::var(SURGE_WORKER_PATH_ENV).ok().as_deref() {
        Some("") => {
            bail!("'{SURGE_WORKER_PATH_ENV}' set to empty string");
        }
        Some(path) => {
            let worker_path = PathBuf::from(path);
            if !worker_path.exists() {
                bail!(
                    "Path to the worker binary overwritten with '{SURGE_WORKER_PATH_ENV}={path}' but that path doesn't exist",
                    path = worker_path.display()
                );
            }
            Ok(worker_path)
        }
        None => {
            if let Some(sibling) = sibling_worker_path() {
                return Ok(sibling);
            }

            log::debug!("No '{WORKER_BIN_NAME}' next to the current executable, looking in 'PATH'");
            which::which(WORKER_BIN_NAME).with_context(|| {
                format!(
                    "Worker binary not found in PATH. Please install '{WORKER_BIN_NAME}' or set '{SURGE_WORKER_PATH_ENV}' to the correct path."
                )
            })
        }
    }
}

fn sibling_worker_path() -> Option<PathBuf> {
    let current_exe = env::current_exe().ok()?;
    let sibling = current_exe.with_file_name(format!("{WORKER_BIN_NAME}{}", env::consts::EXE_SUFFIX));
    sibling.is_file().then_some(sibling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    // Both cases share one test because they modify the same environment variable.
    #[test]
    fn worker_path_from_env() {
        env::set_var(SURGE_WORKER_PATH_ENV, "/non/existent/path/to/surge-worker");
        assert!(worker_path().is_err());

        env::set_var(SURGE_WORKER_PATH_ENV, "");
        assert!(worker_path().is_err());

        let temp = NamedTempFile::new().expect("failed to create temp file");
        let test_path = temp.path().to_str().expect("failed to get temp file path");
        env::set_var(SURGE_WORKER_PATH_ENV, test_path);
        let result = worker_path().expect("failed to get worker path");
        assert_eq!(PathBuf::from(test_path), result);

        env::remove_var(SURGE_WORKER_PATH_ENV);
    }
}
