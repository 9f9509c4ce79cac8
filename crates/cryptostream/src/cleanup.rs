//! Best-effort removal of extracted libraries when the process exits.
//!
//! On unix the queue is drained by an `atexit` hook. Other platforms cannot
//! remove a library that is still mapped, so files are left for the OS temp
//! directory cleanup.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, Once, PoisonError},
};

use tracing::debug;

static PENDING: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
static HOOK: Once = Once::new();

/// Queues `path` for deletion at process exit.
pub(crate) fn delete_on_exit(path: &Path) {
    HOOK.call_once(register_exit_hook);
    PENDING
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(path.to_path_buf());
}

/// Removes every queued file.
#[cfg(unix)]
fn purge() {
    let paths = std::mem::take(&mut *PENDING.lock().unwrap_or_else(PoisonError::into_inner));
    remove_all(&paths);
}

/// Removes `paths`, ignoring failures. Returns how many were removed.
#[cfg(any(unix, test))]
fn remove_all(paths: &[PathBuf]) -> usize {
    paths
        .iter()
        .filter(|path| fs::remove_file(path).is_ok())
        .count()
}

#[cfg(unix)]
fn register_exit_hook() {
    extern "C" fn run_at_exit() {
        purge();
    }

    // SAFETY: `run_at_exit` is a plain `extern "C"` function with no
    // captured state; it only touches the `PENDING` static.
    let rc = unsafe { libc::atexit(run_at_exit) };
    if rc != 0 {
        debug!(rc, "Could not register exit hook; extracted libraries will be left behind");
    }
}

#[cfg(not(unix))]
fn register_exit_hook() {
    debug!("No exit hook on this platform; extracted libraries will be left behind");
}
