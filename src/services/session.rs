/// Session Registry
/// Interactive pseudo-terminal shell sessions keyed by caller-supplied
/// identifiers. The registry is the only owner of the underlying PTYs:
/// all reads, writes, resizes, and terminations go through it.

use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::SystemTime;

use crate::models::{SessionInfo, SessionOptions};
use crate::services::env::EnvResolver;
use crate::services::hub::{Event, EventHub};

const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

#[cfg(unix)]
const FALLBACK_SHELL: &str = "/bin/bash";
#[cfg(not(unix))]
const FALLBACK_SHELL: &str = "powershell.exe";

struct SessionInstance {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    // Shared with the drain thread, which reaps the child on stream close.
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
    pid: u32,
    shell: String,
    cwd: PathBuf,
    created_at: SystemTime,
}

pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionInstance>>>,
    hub: Arc<EventHub>,
    resolver: EnvResolver,
    project_root: PathBuf,
}

impl SessionRegistry {
    pub fn new(hub: Arc<EventHub>, project_root: PathBuf) -> Self {
        SessionRegistry {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            hub,
            resolver: EnvResolver::new(project_root.clone()),
            project_root,
        }
    }

    /// Start a shell session under `id`. Fails if the id is taken or the
    /// shell cannot be spawned; nothing is registered on failure.
    pub fn create(&self, id: &str, opts: &SessionOptions) -> Result<u32, String> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(id) {
            return Err(format!("Session '{}' already exists", id));
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: DEFAULT_ROWS,
                cols: DEFAULT_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| format!("Failed to open PTY: {}", e))?;

        let shell = opts
            .shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| FALLBACK_SHELL.to_string());
        let cwd = opts.cwd.clone().unwrap_or_else(|| self.project_root.clone());

        let mut cmd = CommandBuilder::new(&shell);
        cmd.cwd(&cwd);
        cmd.env_clear();
        for (key, value) in self.resolver.resolve_for_pty(&opts.env) {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| format!("Failed to spawn {}: {}", shell, e))?;
        let pid = child.process_id().unwrap_or(0);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| format!("Failed to get PTY writer: {}", e))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| format!("Failed to get PTY reader: {}", e))?;

        let child = Arc::new(Mutex::new(child));
        sessions.insert(
            id.to_string(),
            SessionInstance {
                master: pair.master,
                writer,
                child: Arc::clone(&child),
                pid,
                shell: shell.clone(),
                cwd: cwd.clone(),
                created_at: SystemTime::now(),
            },
        );

        // Drain thread: forward raw bytes until the stream closes, then reap
        // the child, deregister, and emit the exit event exactly once.
        let session_id = id.to_string();
        let hub = Arc::clone(&self.hub);
        let registry = Arc::clone(&self.sessions);
        thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => hub.emit(Event::SessionData {
                        id: session_id.clone(),
                        bytes: buf[..n].to_vec(),
                    }),
                    Err(_) => break,
                }
            }
            let exit_code = match child.lock().wait() {
                Ok(status) => status.exit_code() as i32,
                Err(e) => {
                    log::warn!("Failed to reap session '{}': {}", session_id, e);
                    -1
                }
            };
            registry.lock().remove(&session_id);
            log::info!("Session '{}' exited with code {}", session_id, exit_code);
            hub.emit(Event::SessionExit {
                id: session_id,
                exit_code,
            });
        });

        log::info!(
            "Session '{}' started ({} in {}, pid {})",
            id,
            shell,
            cwd.display(),
            pid
        );
        Ok(pid)
    }

    /// Forward raw input bytes. Fire-and-forget: unknown ids and write
    /// failures are swallowed.
    pub fn write(&self, id: &str, data: &[u8]) {
        let mut sessions = self.sessions.lock();
        let Some(instance) = sessions.get_mut(id) else {
            log::debug!("Write to unknown session '{}' ignored", id);
            return;
        };
        let result = instance
            .writer
            .write_all(data)
            .and_then(|_| instance.writer.flush());
        if let Err(e) = result {
            log::warn!("Failed to write to session '{}': {}", id, e);
        }
    }

    /// Update the PTY geometry. Fire-and-forget like `write`.
    pub fn resize(&self, id: &str, cols: u16, rows: u16) {
        let sessions = self.sessions.lock();
        let Some(instance) = sessions.get(id) else {
            log::debug!("Resize of unknown session '{}' ignored", id);
            return;
        };
        if let Err(e) = instance.master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        }) {
            log::warn!("Failed to resize session '{}': {}", id, e);
        }
    }

    /// Terminate and deregister a session. The drain thread still delivers
    /// the exit event once the process is gone.
    pub fn kill(&self, id: &str) -> Result<(), String> {
        let instance = self
            .sessions
            .lock()
            .remove(id)
            .ok_or_else(|| format!("Session '{}' not found", id))?;

        // Kill the process group (shell + all descendants).
        #[cfg(unix)]
        {
            if instance.pid != 0 {
                unsafe {
                    libc::kill(-(instance.pid as i32), libc::SIGTERM);
                }
                thread::sleep(std::time::Duration::from_millis(100));
                unsafe {
                    libc::kill(-(instance.pid as i32), libc::SIGKILL);
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = instance.child.lock().kill();
        }

        // Dropping the instance closes the master and writer, which ends the
        // drain loop.
        drop(instance);
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn info(&self, id: &str) -> Option<SessionInfo> {
        let sessions = self.sessions.lock();
        sessions.get(id).map(|instance| SessionInfo {
            id: id.to_string(),
            pid: instance.pid,
            shell: instance.shell.clone(),
            cwd: instance.cwd.clone(),
            created_at: instance.created_at,
        })
    }

    /// Terminate every session, best-effort. Used during shutdown to avoid
    /// orphaned PTY processes.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.kill(&id) {
                log::warn!("Failed to kill session '{}' during shutdown: {}", id, e);
            }
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
