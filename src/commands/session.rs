/// Session commands
/// Drive interactive shell sessions by caller-supplied identifier.

use crate::models::SessionOptions;
use crate::Cockpit;

/// Start a shell session under `id`. Returns the shell's pid.
pub fn create(cockpit: &Cockpit, id: &str, options: SessionOptions) -> Result<u32, String> {
    cockpit.sessions().create(id, &options)
}

/// Forward raw input bytes to a session. Fire-and-forget.
pub fn write(cockpit: &Cockpit, id: &str, data: &[u8]) {
    cockpit.sessions().write(id, data);
}

/// Update a session's terminal geometry. Fire-and-forget.
pub fn resize(cockpit: &Cockpit, id: &str, cols: u16, rows: u16) {
    cockpit.sessions().resize(id, cols, rows);
}

/// Terminate and deregister a session.
pub fn kill(cockpit: &Cockpit, id: &str) -> Result<(), String> {
    cockpit.sessions().kill(id)
}

/// Identifiers of all live sessions.
pub fn list(cockpit: &Cockpit) -> Vec<String> {
    cockpit.sessions().list()
}
