/// Models module
/// Shared data types between the UI layer and the orchestration backend
/// All types here should be serializable/deserializable for IPC

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

/// Sentinel progress value meaning "indeterminate".
pub const INDETERMINATE: i32 = -1;

/// Lifecycle state of the extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
    Killed,
}

/// Launch request for an extraction run.
///
/// Mirrors the CLI surface of the external extractor: the target URL or
/// video id plus the mode flags forwarded on the command line.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSpec {
    pub url: String,
    /// Force a specific analysis tier (1=captions, 2=audio, 3=visual).
    pub tier: Option<u8>,
    /// Whisper model for audio transcription.
    pub model: Option<String>,
    /// Inference device (auto, cpu, cuda).
    pub device: Option<String>,
    /// Initial prompt to guide transcription vocabulary.
    pub prompt: Option<String>,
    #[serde(default)]
    pub quiet: bool,
    /// Request one JSON progress object per stdout line.
    #[serde(default = "default_true")]
    pub json_progress: bool,
    /// Generate an LLM summary after extraction.
    #[serde(default)]
    pub summarize: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RunSpec {
    fn default() -> Self {
        RunSpec {
            url: String::new(),
            tier: None,
            model: None,
            device: None,
            prompt: None,
            quiet: false,
            json_progress: true,
            summarize: false,
        }
    }
}

/// One structured status line from the extractor's JSON progress stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Free-form stage token (download, transcribe, summarize, complete, error).
    pub stage: String,
    pub message: String,
    /// Percentage in [0, 100], or [`INDETERMINATE`].
    #[serde(default = "indeterminate")]
    pub progress: i32,
    #[serde(default)]
    pub timestamp: f64,
    /// Populated only on the terminal `complete` stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

fn indeterminate() -> i32 {
    INDETERMINATE
}

/// Options for creating an interactive shell session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionOptions {
    /// Shell program; defaults to $SHELL, then the platform shell.
    pub shell: Option<String>,
    /// Working directory; defaults to the project root.
    pub cwd: Option<PathBuf>,
    /// Extra environment entries, highest precedence in the resolved layers.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Descriptive view of a registered session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub pid: u32,
    pub shell: String,
    pub cwd: PathBuf,
    pub created_at: SystemTime,
}

/// One entry in the output file tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    /// Stable identifier: the full path.
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub is_folder: bool,
    /// Present for folders only, in display order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

/// Kind of filesystem change reported by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FileChangeKind {
    Add,
    Change,
    Remove,
    AddDir,
    RemoveDir,
}
