//! Config change notifier
//!
//! Watches the config store path and emits unit ticks when YAML files are
//! created, modified or removed. Tick content is intentionally empty: the
//! reload controller re-pulls the store on every tick.

use crate::error::{GatewayError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// File watcher handle; dropping it stops the watch
pub struct ConfigNotifier {
    _watcher: RecommendedWatcher,
}

impl ConfigNotifier {
    /// Start watching a path; returns the notifier handle and the tick
    /// receiver
    pub fn start(path: &Path) -> Result<(Self, mpsc::Receiver<()>)> {
        let (tx, rx) = mpsc::channel(8);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_relevant(&event) {
                        // A full channel already has a pending tick; the
                        // reload it triggers will pick this change up too.
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => error!("Config watch error: {}", e),
            },
            notify::Config::default(),
        )
        .map_err(|e| GatewayError::config(format!("failed to create config watcher: {}", e)))?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| {
                GatewayError::config(format!("failed to watch {}: {}", path.display(), e))
            })?;

        Ok((Self { _watcher: watcher }, rx))
    }
}

fn is_relevant(event: &Event) -> bool {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
            event.paths.iter().any(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
        }
        _ => false,
    }
}

/// Log-and-continue helper for a disabled notifier
pub fn disabled_notifier() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    // Keep the sender alive forever so the receiver never closes.
    std::mem::forget(tx);
    warn!("Config change notifications disabled; reload via SIGHUP or /_reload only");
    rx
}
