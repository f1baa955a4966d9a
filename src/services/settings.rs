/// Settings Store
/// Persisted user configuration as a JSON document with dotted-path access.
/// A missing or malformed file reads as an empty document; consumers decide
/// what absence means.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.json";

pub struct Settings {
    path: PathBuf,
    root: Value,
}

impl Settings {
    /// Load the settings document for a project root.
    pub fn load(project_root: &Path) -> Self {
        let path = project_root.join(SETTINGS_FILE);
        let root = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok())
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Map::new()));
        Settings { path, root }
    }

    /// Look up a nested value by dotted path, e.g. `summarize.provider`.
    pub fn get(&self, key_path: &str) -> Option<&Value> {
        key_path
            .split('.')
            .try_fold(&self.root, |node, key| node.get(key))
    }

    pub fn get_str(&self, key_path: &str) -> Option<String> {
        self.get(key_path)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Set a nested value, materializing intermediate objects as needed.
    /// A scalar in the middle of the path is replaced by an object.
    pub fn set(&mut self, key_path: &str, value: Value) {
        let parts: Vec<&str> = key_path.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            return;
        };
        let mut node = &mut self.root;
        for part in parents {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            match node {
                Value::Object(map) => {
                    node = map
                        .entry((*part).to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                }
                _ => return,
            }
        }
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            map.insert((*last).to_string(), value);
        }
    }

    /// Write the document back to disk.
    pub fn save(&self) -> Result<(), String> {
        let text = serde_json::to_string_pretty(&self.root)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        std::fs::write(&self.path, text)
            .map_err(|e| format!("Failed to write {}: {}", self.path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path());
        assert!(settings.get("summarize.provider").is_none());
    }

    #[test]
    fn malformed_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{not json").unwrap();
        let settings = Settings::load(dir.path());
        assert!(settings.get("anything").is_none());
    }

    #[test]
    fn set_and_get_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::load(dir.path());
        settings.set("summarize.provider", json!("gemini"));
        settings.set("summarize.api_key", json!("secret"));
        assert_eq!(
            settings.get_str("summarize.provider").as_deref(),
            Some("gemini")
        );
        assert_eq!(
            settings.get_str("summarize.api_key").as_deref(),
            Some("secret")
        );
        assert!(settings.get("summarize.missing").is_none());
    }

    #[test]
    fn set_replaces_scalar_in_path_with_object() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::load(dir.path());
        settings.set("whisper", json!("tiny"));
        settings.set("whisper.model", json!("large-v3"));
        assert_eq!(settings.get_str("whisper.model").as_deref(), Some("large-v3"));
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::load(dir.path());
        settings.set("output.directory", json!("./output"));
        settings.save().unwrap();

        let reloaded = Settings::load(dir.path());
        assert_eq!(
            reloaded.get_str("output.directory").as_deref(),
            Some("./output")
        );
    }
}
