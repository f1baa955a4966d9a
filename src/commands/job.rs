/// Job commands
/// Drive the extraction job: run, kill, status.

use crate::models::RunSpec;
use crate::Cockpit;

/// Launch an extraction run, replacing any active job. Returns the pid.
pub fn run(cockpit: &Cockpit, spec: RunSpec) -> Result<u32, String> {
    cockpit.jobs().run(&spec)
}

/// Terminate the active job. Fails with a "no process" reason when idle.
pub fn kill(cockpit: &Cockpit) -> Result<(), String> {
    cockpit.jobs().kill()
}

/// Whether a job is currently active.
pub fn status(cockpit: &Cockpit) -> bool {
    cockpit.jobs().is_active()
}
