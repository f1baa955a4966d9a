/// File commands
/// Browse and monitor the extractor's output tree. Both operations default
/// to the output directory under the project root.

use std::path::PathBuf;

use crate::models::FileNode;
use crate::services::files;
use crate::Cockpit;

/// Filtered, sorted snapshot of a directory tree.
pub fn snapshot(cockpit: &Cockpit, dir: Option<PathBuf>) -> Vec<FileNode> {
    let dir = dir.unwrap_or_else(|| cockpit.output_dir());
    files::snapshot(&dir)
}

/// Start monitoring a directory, replacing any active watch.
pub fn watch(cockpit: &Cockpit, dir: Option<PathBuf>) -> Result<(), String> {
    let dir = dir.unwrap_or_else(|| cockpit.output_dir());
    cockpit.watcher().watch(&dir)
}

/// Stop monitoring. Idempotent.
pub fn unwatch(cockpit: &Cockpit) {
    cockpit.watcher().unwatch();
}
