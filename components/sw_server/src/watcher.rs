//! Hot reload on worker file changes

use lifecycle::LifecycleManager;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ServerError, ServerResult};

/// Quiet period after the last change before reloading
pub const DEBOUNCE: Duration = Duration::from_millis(150);

/// Running watch on the worker file. Dropping it stops watching.
pub struct WorkerWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WorkerWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch `path` and reload `lifecycle` whenever its content changes.
///
/// Editors often replace a file instead of writing it in place, so the
/// parent directory is watched and events are filtered down to `path`.
pub fn watch(path: &Path, lifecycle: Arc<LifecycleManager>) -> ServerResult<WorkerWatcher> {
    let watch_error = |source| ServerError::Watch {
        path: path.to_path_buf(),
        source,
    };
    let file_name = path.file_name().map(|name| name.to_os_string());
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let (tx, mut rx) = mpsc::channel(64);
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        let _ = tx.blocking_send(res);
    })
    .map_err(watch_error)?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(watch_error)?;
    info!(path = %path.display(), "watching worker file");

    let path = path.to_path_buf();
    let task = tokio::spawn(async move {
        let mut debounce: Option<Pin<Box<tokio::time::Sleep>>> = None;
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(Ok(event)) => {
                        let relevant = (event.kind.is_modify() || event.kind.is_create())
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                        if relevant {
                            debounce = Some(Box::pin(tokio::time::sleep(DEBOUNCE)));
                        }
                    }
                    Some(Err(err)) => error!(error = %err, "watch error"),
                    None => break,
                },
                _ = async {
                    match debounce.as_mut() {
                        Some(timer) => timer.await,
                        None => std::future::pending().await,
                    }
                } => {
                    debounce = None;
                    reload_from(&lifecycle, &path).await;
                }
            }
        }
        debug!("worker watcher stopped");
    });

    Ok(WorkerWatcher {
        _watcher: watcher,
        task,
    })
}

async fn reload_from(lifecycle: &LifecycleManager, path: &Path) {
    match tokio::fs::read_to_string(path).await {
        Ok(source) => {
            info!(path = %path.display(), "worker file changed");
            // Load errors are logged by the manager; the serving worker stays.
            let _ = lifecycle.reload(&source);
        }
        Err(err) => warn!(path = %path.display(), error = %err, "failed to read worker file"),
    }
}
