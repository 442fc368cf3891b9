//! Config-file watcher that turns edits into reload requests.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ReloadHandle;
use crate::config::Settings;
use crate::error::{Error, Result};

/// Quiet period before a burst of file events is handled.
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Watches one config file for the lifetime of a generation.
///
/// The parent directory is watched rather than the file itself, so editors
/// that replace the file on save are still noticed. Dropping the watcher
/// stops it.
pub struct ConfigWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    pub fn spawn(path: &Path, reload: ReloadHandle, cancel: CancellationToken) -> Result<Self> {
        let file_name: OsString = path
            .file_name()
            .ok_or_else(|| Error::config(format!("{} is not a file path", path.display())))?
            .to_owned();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();
        let mut debouncer = new_debouncer(DEBOUNCE, move |result: DebounceEventResult| {
            let _ = tx.send(result);
        })
        .map_err(|e| Error::config(format!("failed to create config watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::config(format!("failed to watch {}: {e}", dir.display())))?;

        let path = path.to_path_buf();
        let task = tokio::spawn(async move {
            info!("Watching {} for changes", path.display());
            loop {
                let events = tokio::select! {
                    _ = cancel.cancelled() => break,
                    events = rx.recv() => events,
                };
                match events {
                    None => break,
                    Some(Ok(events)) => {
                        if events
                            .iter()
                            .any(|e| e.path.file_name() == Some(file_name.as_os_str()))
                        {
                            handle_change(&path, &reload).await;
                        }
                    }
                    Some(Err(e)) => warn!("Config watcher error: {}", e),
                }
            }
            debug!("Stopped watching {}", path.display());
        });

        Ok(Self {
            _debouncer: debouncer,
            task,
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_change(path: &Path, reload: &ReloadHandle) {
    info!("Config file {} changed", path.display());
    let result = load_off_runtime(path.to_path_buf())
        .await
        .and_then(|settings| reload.request(settings));
    if let Err(e) = result {
        error!("Ignoring config change: {}", e);
    }
}

/// Read and parse the file on the blocking pool.
async fn load_off_runtime(path: PathBuf) -> Result<Settings> {
    tokio::task::spawn_blocking(move || Settings::load(&path))
        .await
        .map_err(|e| Error::Other(format!("config load task failed: {e}")))?
}
