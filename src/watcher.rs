//! barman configuration directory watcher.
//!
//! A non-recursive `notify` watch feeds filesystem events into a bounded
//! channel. One consumer task drains it; on a structural change (file added,
//! removed, written or renamed) it resets the metrics registry and runs an
//! immediate check cycle so servers removed from the configuration disappear
//! from `/metrics`.

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::poller::{Poller, Trigger};
use crate::runner::CommandRunner;

/// Item delivered by the filesystem watcher.
pub type WatchEvent = notify::Result<Event>;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to create filesystem watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Whether an event changes the set or content of config files.
///
/// Metadata-only changes (permissions, ownership, timestamps) and plain
/// accesses are ignored.
pub fn is_structural_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_) | ModifyKind::Other) => false,
        EventKind::Modify(_) => true,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => false,
    }
}

/// Refresh request that did not fit into the queue.
#[derive(Default)]
struct Overflow {
    pending: AtomicBool,
    notify: Notify,
}

/// Sending half of the event queue, used from the notify callback.
pub struct EventSender {
    tx: mpsc::Sender<WatchEvent>,
    overflow: Arc<Overflow>,
}

/// Receiving half of the event queue.
pub struct EventQueue {
    events: mpsc::Receiver<WatchEvent>,
    overflow: Arc<Overflow>,
}

/// Creates a bounded event queue holding at most `size` events.
pub fn event_queue(size: usize) -> (EventSender, EventQueue) {
    let (tx, events) = mpsc::channel(size.max(1));
    let overflow = Arc::new(Overflow::default());
    (
        EventSender {
            tx,
            overflow: overflow.clone(),
        },
        EventQueue { events, overflow },
    )
}

impl EventSender {
    /// Queues structural changes and errors; other events are dropped here.
    ///
    /// Never blocks. When the queue is full a refresh is still guaranteed:
    /// the consumer is woken and sees the pending flag after draining.
    pub fn forward(&self, res: WatchEvent) {
        if let Ok(event) = &res {
            if !is_structural_change(&event.kind) {
                debug!("fsnotify event ignored: {:?} {:?}", event.kind, event.paths);
                return;
            }
        }

        match self.tx.try_send(res) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("fsnotify queue full, refresh marked pending");
                self.overflow.pending.store(true, Ordering::SeqCst);
                self.overflow.notify.notify_one();
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Watches one directory and owns the receiving end of its event queue.
pub struct ConfigWatcher {
    // Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
    queue: EventQueue,
    dir: PathBuf,
}

impl ConfigWatcher {
    /// Starts watching `dir`. Fails if the directory cannot be watched.
    pub fn new(dir: &Path, queue_size: usize) -> Result<Self, WatchError> {
        let (sender, queue) = event_queue(queue_size);

        let mut watcher = notify::recommended_watcher(move |res: WatchEvent| sender.forward(res))
            .map_err(WatchError::Create)?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: dir.to_path_buf(),
                source,
            })?;

        info!("watching config directory {}", dir.display());

        Ok(Self {
            _watcher: watcher,
            queue,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Consumes events until `cancel` fires.
    pub async fn run<R: CommandRunner>(self, poller: Arc<Poller<R>>, cancel: CancellationToken) {
        let ConfigWatcher {
            _watcher: watcher,
            queue,
            ..
        } = self;
        run_event_loop(queue, poller, cancel).await;
        drop(watcher);
    }
}

/// Returns true if the event asks for a refresh. Errors are logged.
fn wants_refresh(event: WatchEvent) -> bool {
    match event {
        Ok(event) => {
            debug!("fsnotify event: {:?} {:?}", event.kind, event.paths);
            is_structural_change(&event.kind)
        }
        Err(e) => {
            warn!("fsnotify error: {}", e);
            false
        }
    }
}

/// Drains `queue`, resetting metrics and refreshing them on structural changes.
///
/// Events that queued up while a refresh ran are coalesced into one refresh.
/// Returns once `cancel` fires or every sender is gone.
pub async fn run_event_loop<R: CommandRunner>(
    mut queue: EventQueue,
    poller: Arc<Poller<R>>,
    cancel: CancellationToken,
) {
    let mut closed = false;

    while !closed {
        let mut refresh = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = queue.overflow.notify.notified() => false,
            event = queue.events.recv() => match event {
                Some(event) => wants_refresh(event),
                None => {
                    closed = true;
                    false
                }
            },
        };

        while let Ok(pending) = queue.events.try_recv() {
            refresh |= wants_refresh(pending);
        }
        refresh |= queue.overflow.pending.swap(false, Ordering::SeqCst);

        if !refresh {
            continue;
        }

        info!("reset metrics started");
        poller.registry().reset();

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = poller.run_cycle(Trigger::ConfigChange) => {}
        }

        info!("reset metrics completed");
    }

    debug!("config watcher stopped");
}
