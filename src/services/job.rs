/// Job Runner
/// Owns the single active extraction job: spawn, kill, status, and the
/// concurrent drain of its output streams into broadcast events. At most one
/// job runs at a time; launching a new one tears the old one down first.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crate::models::{JobState, RunSpec};
use crate::services::env::EnvResolver;
use crate::services::hub::{Event, EventHub};
use crate::services::progress::{parse_progress_line, LineSplitter};

/// Executable name of the extraction CLI.
pub const DEFAULT_JOB_COMMAND: &str = "yt-comprehend";

/// The single active extraction process.
pub struct JobHandle {
    pub pid: u32,
    pub args: Vec<String>,
    pub started_at: SystemTime,
    pub state: JobState,
    generation: u64,
    child_slot: Arc<Mutex<Option<Child>>>,
}

pub struct JobRunner {
    program: String,
    project_root: PathBuf,
    hub: Arc<EventHub>,
    resolver: EnvResolver,
    active: Arc<Mutex<Option<JobHandle>>>,
    last_state: Arc<Mutex<JobState>>,
    // Supervisor of the current generation; joined before the next spawn so
    // two generations can never interleave on the hub.
    supervisor: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
}

impl JobRunner {
    pub fn new(hub: Arc<EventHub>, project_root: PathBuf) -> Self {
        Self::with_program(hub, project_root, DEFAULT_JOB_COMMAND)
    }

    /// Use an alternate executable (absolute install path, tests).
    pub fn with_program(hub: Arc<EventHub>, project_root: PathBuf, program: &str) -> Self {
        JobRunner {
            program: program.to_string(),
            resolver: EnvResolver::new(project_root.clone()),
            project_root,
            hub,
            active: Arc::new(Mutex::new(None)),
            last_state: Arc::new(Mutex::new(JobState::Idle)),
            supervisor: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Launch an extraction run. Any active job is terminated and its output
    /// pipes fully closed before the new process is wired up. Returns the
    /// new pid immediately; completion arrives later as an event.
    pub fn run(&self, spec: &RunSpec) -> Result<u32, String> {
        validate(spec)?;

        let prev = self.active.lock().take();
        let prev_supervisor = self.supervisor.lock().take();
        if let Some(prev) = prev {
            log::info!("Replacing active extraction job (pid {})", prev.pid);
            terminate(prev.pid, &prev.child_slot);
        }
        if let Some(handle) = prev_supervisor {
            let _ = handle.join();
        }

        let args = build_args(spec);
        let env = self.resolver.resolve(&HashMap::new());
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .current_dir(&self.project_root)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to launch {}: {}", self.program, e);
                log::warn!("{}", message);
                self.hub.emit(Event::JobError {
                    message: message.clone(),
                });
                *self.last_state.lock() = JobState::Failed;
                return Err(message);
            }
        };

        let pid = child.id();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child_slot = Arc::new(Mutex::new(Some(child)));

        self.register(JobHandle {
            pid,
            args,
            started_at: SystemTime::now(),
            state: JobState::Running,
            generation,
            child_slot: Arc::clone(&child_slot),
        });

        let stdout_drain = spawn_stdout_drain(stdout, Arc::clone(&self.hub));
        let stderr_drain = spawn_stderr_drain(stderr, Arc::clone(&self.hub));

        let hub = Arc::clone(&self.hub);
        let active = Arc::clone(&self.active);
        let last_state = Arc::clone(&self.last_state);
        let supervisor = thread::spawn(move || {
            let _ = stdout_drain.join();
            let _ = stderr_drain.join();
            let child = child_slot.lock().take();
            let exit_code = match child {
                Some(mut child) => match child.wait() {
                    Ok(status) => status.code().unwrap_or(-1),
                    Err(e) => {
                        log::warn!("Failed to reap extraction process: {}", e);
                        -1
                    }
                },
                None => -1,
            };
            let success = exit_code == 0;
            hub.emit(Event::JobCompleted { success, exit_code });
            let mut slot = active.lock();
            if slot.as_ref().is_some_and(|h| h.generation == generation) {
                if let Some(handle) = slot.take() {
                    let terminal = match handle.state {
                        JobState::Killed => JobState::Killed,
                        _ if success => JobState::Completed,
                        _ => JobState::Failed,
                    };
                    *last_state.lock() = terminal;
                }
            }
        });
        *self.supervisor.lock() = Some(supervisor);

        log::info!(
            "Extraction job started (pid {}, {} {})",
            pid,
            self.program,
            spec.url
        );
        Ok(pid)
    }

    /// Terminate the active job. Draining continues independently and emits
    /// the completion event once the pipes close.
    pub fn kill(&self) -> Result<(), String> {
        let mut active = self.active.lock();
        match active.as_mut() {
            Some(handle) => {
                handle.state = JobState::Killed;
                log::info!("Killing extraction job (pid {})", handle.pid);
                terminate(handle.pid, &handle.child_slot);
                Ok(())
            }
            None => Err("No active extraction process".to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Current state: the active handle's state, or the last terminal state.
    pub fn state(&self) -> JobState {
        let active = self.active.lock();
        match active.as_ref() {
            Some(handle) => handle.state,
            None => *self.last_state.lock(),
        }
    }

    fn register(&self, handle: JobHandle) {
        *self.active.lock() = Some(handle);
    }
}

fn validate(spec: &RunSpec) -> Result<(), String> {
    if spec.url.trim().is_empty() {
        return Err("No URL or video id given".to_string());
    }
    if let Some(tier) = spec.tier {
        if !(1..=3).contains(&tier) {
            return Err(format!("Invalid tier {} (expected 1-3)", tier));
        }
    }
    Ok(())
}

/// Argument vector for the extraction CLI.
fn build_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec![spec.url.clone()];
    if let Some(tier) = spec.tier {
        args.push("--tier".to_string());
        args.push(tier.to_string());
    }
    if let Some(model) = &spec.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    if let Some(device) = &spec.device {
        args.push("--device".to_string());
        args.push(device.clone());
    }
    if let Some(prompt) = &spec.prompt {
        args.push("--prompt".to_string());
        args.push(prompt.clone());
    }
    if spec.quiet {
        args.push("--quiet".to_string());
    }
    if spec.json_progress {
        args.push("--json-progress".to_string());
    }
    if spec.summarize {
        args.push("--summarize".to_string());
    }
    args
}

fn spawn_stdout_drain(stdout: Option<ChildStdout>, hub: Arc<EventHub>) -> JoinHandle<()> {
    thread::spawn(move || {
        let Some(mut stream) = stdout else { return };
        let mut splitter = LineSplitter::new();
        let mut buf = [0u8; 8192];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    for line in splitter.feed(&buf[..n]) {
                        emit_stdout_line(&hub, line);
                    }
                }
                Err(_) => break,
            }
        }
        if let Some(line) = splitter.finish() {
            emit_stdout_line(&hub, line);
        }
    })
}

/// Structured lines become progress events; anything else is forwarded
/// verbatim so no output is silently lost.
fn emit_stdout_line(hub: &EventHub, line: String) {
    match parse_progress_line(&line) {
        Some(event) => hub.emit(Event::JobProgress(event)),
        None => hub.emit(Event::JobStdout { line }),
    }
}

fn spawn_stderr_drain(stderr: Option<ChildStderr>, hub: Arc<EventHub>) -> JoinHandle<()> {
    thread::spawn(move || {
        let Some(mut stream) = stderr else { return };
        let mut buf = [0u8; 8192];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => hub.emit(Event::JobStderr {
                    chunk: String::from_utf8_lossy(&buf[..n]).into_owned(),
                }),
                Err(_) => break,
            }
        }
    })
}

/// Best-effort termination: SIGTERM for graceful shutdown, then SIGKILL.
fn terminate(pid: u32, _child_slot: &Mutex<Option<Child>>) {
    #[cfg(unix)]
    {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        thread::sleep(Duration::from_millis(100));
        unsafe {
            libc::kill(pid as i32, libc::SIGKILL);
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        if let Some(child) = _child_slot.lock().as_mut() {
            let _ = child.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Receiver;

    fn runner(program: &str) -> (JobRunner, Receiver<Event>) {
        let hub = Arc::new(EventHub::new());
        let (_, rx) = hub.attach();
        let dir = std::env::temp_dir();
        (JobRunner::with_program(hub, dir, program), rx)
    }

    fn plain_spec(url: &str) -> RunSpec {
        RunSpec {
            url: url.to_string(),
            json_progress: false,
            ..RunSpec::default()
        }
    }

    fn wait_for_completion(rx: &Receiver<Event>) -> (Vec<Event>, bool, i32) {
        let mut events = Vec::new();
        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(10))
                .expect("timed out waiting for completion");
            if let Event::JobCompleted { success, exit_code } = event {
                return (events, success, exit_code);
            }
            events.push(event);
        }
    }

    #[test]
    fn builds_the_full_argument_vector() {
        let spec = RunSpec {
            url: "https://youtube.com/watch?v=abc".to_string(),
            tier: Some(2),
            model: Some("large-v3".to_string()),
            device: Some("cuda".to_string()),
            prompt: Some("Claude Code, Anthropic".to_string()),
            quiet: true,
            json_progress: true,
            summarize: true,
        };
        assert_eq!(
            build_args(&spec),
            vec![
                "https://youtube.com/watch?v=abc",
                "--tier",
                "2",
                "--model",
                "large-v3",
                "--device",
                "cuda",
                "--prompt",
                "Claude Code, Anthropic",
                "--quiet",
                "--json-progress",
                "--summarize",
            ]
        );
    }

    #[test]
    fn minimal_spec_builds_url_and_progress_flag_only() {
        let spec = RunSpec {
            url: "VIDEO_ID".to_string(),
            ..RunSpec::default()
        };
        assert_eq!(build_args(&spec), vec!["VIDEO_ID", "--json-progress"]);
    }

    #[test]
    fn malformed_specs_are_rejected_synchronously() {
        let (runner, _rx) = runner("true");
        assert!(runner.run(&plain_spec("  ")).is_err());
        let mut spec = plain_spec("url");
        spec.tier = Some(7);
        assert!(runner.run(&spec).is_err());
        assert!(!runner.is_active());
    }

    #[test]
    fn classifies_structured_and_raw_lines_in_order() {
        let (runner, rx) = runner("printf");
        // printf treats the url as its format string; the payload mixes one
        // structured progress object with plain lines.
        let url = r#"{"stage":"download","message":"Downloading audio","progress":40,"timestamp":1.0}\nAnalyzing: VIDEO_ID\nsecond plain line\n"#;
        runner.run(&plain_spec(url)).unwrap();

        let (events, success, exit_code) = wait_for_completion(&rx);
        assert!(success);
        assert_eq!(exit_code, 0);
        assert_eq!(events.len(), 3);
        match &events[0] {
            Event::JobProgress(p) => {
                assert_eq!(p.stage, "download");
                assert_eq!(p.progress, 40);
            }
            other => panic!("expected progress event, got {:?}", other),
        }
        assert!(matches!(&events[1], Event::JobStdout { line } if line == "Analyzing: VIDEO_ID"));
        assert!(matches!(&events[2], Event::JobStdout { line } if line == "second plain line"));
    }

    #[test]
    fn partial_final_line_is_delivered_after_stream_close() {
        let (runner, rx) = runner("printf");
        runner.run(&plain_spec("no trailing newline")).unwrap();
        let (events, success, _) = wait_for_completion(&rx);
        assert!(success);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::JobStdout { line } if line == "no trailing newline"));
    }

    #[test]
    fn nonzero_exit_reports_failure() {
        let (runner, rx) = runner("false");
        runner.run(&plain_spec("ignored")).unwrap();
        let (_, success, exit_code) = wait_for_completion(&rx);
        assert!(!success);
        assert_eq!(exit_code, 1);
        // The handle is cleared once draining completes.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while runner.is_active() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!runner.is_active());
        assert_eq!(runner.state(), JobState::Failed);
    }

    #[test]
    fn spawn_failure_is_synchronous_and_leaves_no_job() {
        let (runner, rx) = runner("/nonexistent/extractor-binary");
        let result = runner.run(&plain_spec("VIDEO_ID"));
        assert!(result.is_err());
        assert!(!runner.is_active());
        assert_eq!(runner.state(), JobState::Failed);
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Event::JobError { message } => assert!(message.contains("Failed to launch")),
            other => panic!("expected job error, got {:?}", other),
        }
    }

    #[test]
    fn kill_without_a_job_is_a_definite_failure() {
        let (runner, _rx) = runner("true");
        let err = runner.kill().unwrap_err();
        assert!(err.contains("No active"));
        assert_eq!(runner.state(), JobState::Idle);
    }

    #[test]
    fn kill_terminates_and_drain_emits_completion() {
        let (runner, rx) = runner("sleep");
        runner.run(&plain_spec("30")).unwrap();
        assert!(runner.is_active());

        runner.kill().unwrap();
        let (_, success, exit_code) = wait_for_completion(&rx);
        assert!(!success);
        assert_eq!(exit_code, -1);

        // The drain loop clears the handle after the terminal event.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while runner.is_active() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!runner.is_active());
        assert_eq!(runner.state(), JobState::Killed);
    }

    #[test]
    fn run_while_active_replaces_the_prior_generation() {
        let (runner, rx) = runner("sleep");
        let first_pid = runner.run(&plain_spec("30")).unwrap();
        assert!(runner.is_active());

        let second_pid = runner.run(&plain_spec("0")).unwrap();
        assert_ne!(first_pid, second_pid);

        // The replaced generation's terminal event is delivered before any
        // event of the new one.
        let (_, first_success, first_code) = wait_for_completion(&rx);
        assert!(!first_success);
        assert_eq!(first_code, -1);

        let (_, second_success, second_code) = wait_for_completion(&rx);
        assert!(second_success);
        assert_eq!(second_code, 0);
    }
}
