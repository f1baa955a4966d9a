/// File Tree Snapshotter/Watcher
/// Filtered, sorted snapshots of the extractor's output tree plus change
/// notifications forwarded through the broadcast hub.

use notify::{recommended_watcher, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{FileChangeKind, FileNode};
use crate::services::hub::{Event, EventHub};

/// File extensions surfaced in the browser tree.
const ALLOWED_EXTENSIONS: &[&str] = &["md", "txt", "json"];

/// Watch events deeper than this below the watch root are ignored.
const MAX_WATCH_DEPTH: usize = 4;

/// Recursively list `dir`, folders before files, names case-insensitively
/// ordered within each group. A missing directory yields an empty tree: the
/// output directory does not exist until the first extraction finishes.
pub fn snapshot(dir: &Path) -> Vec<FileNode> {
    if !dir.is_dir() {
        return Vec::new();
    }
    read_tree(dir)
}

fn read_tree(dir: &Path) -> Vec<FileNode> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Failed to read {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut nodes = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            nodes.push(FileNode {
                id: path.to_string_lossy().into_owned(),
                name,
                path: path.clone(),
                is_folder: true,
                children: Some(read_tree(&path)),
            });
        } else if has_allowed_extension(&path) {
            nodes.push(FileNode {
                id: path.to_string_lossy().into_owned(),
                name,
                path,
                is_folder: false,
                children: None,
            });
        }
    }

    nodes.sort_by(|a, b| {
        b.is_folder
            .cmp(&a.is_folder)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    nodes
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Monitors one directory tree at a time and forwards raw change events to
/// the hub. Starting a new watch replaces the previous one.
pub struct FileWatcher {
    hub: Arc<EventHub>,
    active: Mutex<Option<(RecommendedWatcher, PathBuf)>>,
}

impl FileWatcher {
    pub fn new(hub: Arc<EventHub>) -> Self {
        FileWatcher {
            hub,
            active: Mutex::new(None),
        }
    }

    pub fn watch(&self, dir: &Path) -> Result<(), String> {
        self.unwatch();

        let hub = Arc::clone(&self.hub);
        let root = dir.to_path_buf();
        let callback_root = root.clone();
        let mut watcher = recommended_watcher(move |result: notify::Result<notify::Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("Watcher error: {}", e);
                    return;
                }
            };
            let Some(kind) = map_kind(&event) else { return };
            for path in &event.paths {
                if depth_below(&callback_root, path) > MAX_WATCH_DEPTH {
                    continue;
                }
                hub.emit(Event::FileChange {
                    kind,
                    path: path.clone(),
                });
            }
        })
        .map_err(|e| format!("Failed to create watcher: {}", e))?;

        watcher
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|e| format!("Failed to watch {}: {}", dir.display(), e))?;

        log::info!("Watching {}", dir.display());
        *self.active.lock() = Some((watcher, root));
        Ok(())
    }

    /// Stop monitoring. Idempotent: a no-op when nothing is watched.
    pub fn unwatch(&self) {
        if let Some((watcher, root)) = self.active.lock().take() {
            drop(watcher);
            log::info!("Stopped watching {}", root.display());
        }
    }

    pub fn is_watching(&self) -> bool {
        self.active.lock().is_some()
    }
}

fn map_kind(event: &notify::Event) -> Option<FileChangeKind> {
    use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind};
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Some(FileChangeKind::AddDir),
        EventKind::Create(_) => Some(FileChangeKind::Add),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FileChangeKind::Change),
        EventKind::Remove(RemoveKind::Folder) => Some(FileChangeKind::RemoveDir),
        EventKind::Remove(_) => Some(FileChangeKind::Remove),
        _ => None,
    }
}

fn depth_below(root: &Path, path: &Path) -> usize {
    path.strip_prefix(root)
        .map(|rel| rel.components().count())
        .unwrap_or(0)
}
