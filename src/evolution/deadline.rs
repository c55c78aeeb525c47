//! Deadline enforcement for calls into external collaborators.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Why a bounded call produced no value.
#[derive(Debug, thiserror::Error)]
pub enum DeadlineError {
    #[error("call did not finish within {0:?}")]
    Elapsed(Duration),
    #[error("call panicked")]
    Panicked,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Run `task` on a worker thread and wait at most `timeout` for its result.
///
/// On timeout the worker is detached; its eventual result is discarded.
pub fn run_with_deadline<T, F>(name: &str, timeout: Duration, task: F) -> Result<T, DeadlineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _ = tx.send(task());
        })?;

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => Err(DeadlineError::Elapsed(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(DeadlineError::Panicked),
    }
}
