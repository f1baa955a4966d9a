/// Event Broadcast Hub
/// Fans job/session/file events out to every attached observer.
/// Observers attach and detach at any time; producers never block on delivery
/// and events emitted with no observers attached are dropped.

use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::models::{FileChangeKind, ProgressEvent};

/// Everything the orchestration layer can tell an observer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    JobProgress(ProgressEvent),
    JobStdout { line: String },
    JobStderr { chunk: String },
    JobCompleted { success: bool, exit_code: i32 },
    JobError { message: String },
    SessionData { id: String, bytes: Vec<u8> },
    SessionExit { id: String, exit_code: i32 },
    FileChange { kind: FileChangeKind, path: PathBuf },
}

#[derive(Clone)]
struct Observer {
    id: u64,
    tx: Sender<Event>,
}

/// Publish/subscribe channel decoupled from any particular UI surface.
pub struct EventHub {
    observers: Mutex<Vec<Observer>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        EventHub {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an observer. Only events emitted after this call are
    /// delivered; there is no replay of past events.
    pub fn attach(&self) -> (u64, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push(Observer { id, tx });
        (id, rx)
    }

    /// Remove an observer. Unknown ids are ignored.
    pub fn detach(&self, id: u64) {
        self.observers.lock().retain(|o| o.id != id);
    }

    /// Deliver an event to every observer attached at this moment.
    ///
    /// The observer set is snapshotted under the lock and delivery happens
    /// outside it, so attach/detach calls never race with a send and a slow
    /// consumer cannot stall the producing drain loop.
    pub fn emit(&self, event: Event) {
        let targets = self.observers.lock().clone();
        let mut dead = Vec::new();
        for observer in &targets {
            if observer.tx.send(event.clone()).is_err() {
                dead.push(observer.id);
            }
        }
        if !dead.is_empty() {
            self.observers.lock().retain(|o| !dead.contains(&o.id));
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
