/// Comprehend Cockpit
/// Host-side orchestration for a desktop control surface around the
/// yt-comprehend video transcript extractor: one batch extraction job,
/// any number of interactive shell sessions, and the output file tree,
/// multiplexed to attached observers through a broadcast hub.
///
/// Module structure:
/// - commands: synchronous request boundary for the UI layer
/// - services: job, session, environment, file, and event mechanisms
/// - models: shared data types crossing the boundary

pub mod commands;
pub mod models;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use services::files::FileWatcher;
use services::hub::{Event, EventHub};
use services::job::JobRunner;
use services::session::SessionRegistry;

/// Name of the extractor's output directory under the project root.
const OUTPUT_DIR: &str = "output";

/// Owns every orchestration service and wires them to one broadcast hub.
pub struct Cockpit {
    project_root: PathBuf,
    hub: Arc<EventHub>,
    jobs: JobRunner,
    sessions: SessionRegistry,
    watcher: FileWatcher,
}

impl Cockpit {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let hub = Arc::new(EventHub::new());
        Cockpit {
            jobs: JobRunner::new(Arc::clone(&hub), project_root.clone()),
            sessions: SessionRegistry::new(Arc::clone(&hub), project_root.clone()),
            watcher: FileWatcher::new(Arc::clone(&hub)),
            hub,
            project_root,
        }
    }

    /// Register an observer of job/session/file events. Multiple observers
    /// may be attached at once; each sees every event emitted while it is
    /// attached.
    pub fn attach(&self) -> (u64, Receiver<Event>) {
        self.hub.attach()
    }

    pub fn detach(&self, observer: u64) {
        self.hub.detach(observer);
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn output_dir(&self) -> PathBuf {
        self.project_root.join(OUTPUT_DIR)
    }

    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn watcher(&self) -> &FileWatcher {
        &self.watcher
    }

    /// Terminate everything this layer owns: the active job, every session,
    /// and the file watch. Failures are logged and swallowed so shutdown
    /// always completes.
    pub fn shutdown(&self) {
        log::info!("Shutting down - cleaning up job and session processes");
        self.watcher.unwatch();
        if self.jobs.is_active() {
            if let Err(e) = self.jobs.kill() {
                log::warn!("Failed to kill extraction job during shutdown: {}", e);
            }
        }
        self.sessions.shutdown();
    }
}
