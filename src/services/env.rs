/// Environment Resolver
/// Builds the environment a spawned process receives from layered sources,
/// low to high precedence: inherited environment, project .env file,
/// persisted settings, computed values, caller overrides. A key set by a
/// higher layer wins; a key resolved to nothing is dropped entirely so no
/// sentinel ever leaks into a child process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::services::settings::Settings;

/// One precedence layer. `None` marks a key as explicitly absent.
pub type EnvLayer = HashMap<String, Option<String>>;

pub struct EnvResolver {
    project_root: PathBuf,
}

impl EnvResolver {
    pub fn new(project_root: PathBuf) -> Self {
        EnvResolver { project_root }
    }

    /// Resolve the environment for a piped batch process.
    pub fn resolve(&self, overrides: &HashMap<String, String>) -> HashMap<String, String> {
        self.resolve_inner(false, overrides)
    }

    /// Resolve the environment for a pseudo-terminal spawn, which also
    /// carries terminal identity variables.
    pub fn resolve_for_pty(&self, overrides: &HashMap<String, String>) -> HashMap<String, String> {
        self.resolve_inner(true, overrides)
    }

    fn resolve_inner(
        &self,
        for_pty: bool,
        overrides: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut computed = computed_layer(&self.project_root);
        if for_pty {
            computed.insert("TERM".to_string(), Some("xterm-256color".to_string()));
            computed.insert("COLORTERM".to_string(), Some("truecolor".to_string()));
        }
        let override_layer: EnvLayer = overrides
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        merge_layers(&[
            inherited_layer(),
            dotenv_layer(&self.project_root.join(".env")),
            settings_layer(&self.project_root),
            computed,
            override_layer,
        ])
    }
}

/// Flatten precedence-ordered layers into the final map, last writer wins.
/// Keys whose winning value is `None` are removed, never propagated.
pub fn merge_layers(layers: &[EnvLayer]) -> HashMap<String, String> {
    let mut merged: EnvLayer = HashMap::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
}

fn inherited_layer() -> EnvLayer {
    std::env::vars().map(|(k, v)| (k, Some(v))).collect()
}

fn dotenv_layer(path: &Path) -> EnvLayer {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_dotenv(&contents),
        // Missing or unreadable file contributes nothing.
        Err(_) => EnvLayer::new(),
    }
}

/// Tolerant line-oriented KEY=VALUE parsing. Comments, blank lines, and
/// malformed lines are skipped; surrounding quotes are stripped.
pub fn parse_dotenv(contents: &str) -> EnvLayer {
    let mut layer = EnvLayer::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().trim_start_matches("export ").trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            continue;
        }
        let value = line_value(value);
        layer.insert(key.to_string(), Some(value));
    }
    layer
}

fn line_value(raw: &str) -> String {
    let trimmed = raw.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}

/// Translate persisted summarizer settings into the provider's credential
/// variable, mirroring the extractor's provider registry.
fn settings_layer(project_root: &Path) -> EnvLayer {
    let settings = Settings::load(project_root);
    let mut layer = EnvLayer::new();
    if let (Some(provider), Some(api_key)) = (
        settings.get_str("summarize.provider"),
        settings.get_str("summarize.api_key"),
    ) {
        layer.insert(provider_env_var(&provider), Some(api_key));
    }
    layer
}

/// Credential variable for a summarization provider. Unknown providers fall
/// back to the `{PROVIDER}_API_KEY` convention.
pub fn provider_env_var(provider: &str) -> String {
    match provider {
        "gemini" => "GEMINI_API_KEY".to_string(),
        "openai" => "OPENAI_API_KEY".to_string(),
        "anthropic" => "ANTHROPIC_API_KEY".to_string(),
        other => format!("{}_API_KEY", other.to_uppercase()),
    }
}

fn computed_layer(project_root: &Path) -> EnvLayer {
    let mut layer = EnvLayer::new();
    layer.insert("PATH".to_string(), Some(build_extended_path(project_root)));
    // The extractor is a Python CLI; force line buffering so progress lines
    // arrive as they are produced, not when the pipe buffer fills.
    layer.insert("PYTHONUNBUFFERED".to_string(), Some("1".to_string()));
    layer.insert("PYTHONIOENCODING".to_string(), Some("utf-8".to_string()));
    layer
}

/// Build an extended PATH with the project virtualenv, Homebrew, and common
/// locations. Bundled desktop apps inherit a minimal environment, so CLI
/// tools are not found without this.
fn build_extended_path(project_root: &Path) -> String {
    let home = std::env::var("HOME").unwrap_or_default();
    let current_path = std::env::var("PATH").unwrap_or_default();

    let mut paths = vec![
        "/opt/homebrew/bin".to_string(), // Homebrew Apple Silicon
        "/opt/homebrew/sbin".to_string(),
        "/usr/local/bin".to_string(), // Homebrew Intel / system
        "/usr/local/sbin".to_string(),
        format!("{}/.local/bin", home), // pipx / user installs
        "/usr/bin".to_string(),
        "/bin".to_string(),
        "/usr/sbin".to_string(),
        "/sbin".to_string(),
    ];

    // Put the project virtualenv first so its interpreter and console
    // scripts shadow any global install.
    if let Some(venv) = venv_bin(project_root) {
        paths.insert(0, venv.to_string_lossy().into_owned());
    }

    if !current_path.is_empty() {
        paths.push(current_path);
    }

    paths.join(":")
}

fn venv_bin(project_root: &Path) -> Option<PathBuf> {
    for candidate in [".venv", "venv"] {
        let bin = project_root.join(candidate).join("bin");
        if bin.is_dir() {
            return Some(bin);
        }
    }
    None
}
