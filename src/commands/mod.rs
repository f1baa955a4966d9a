/// Commands module
/// The synchronous request boundary between the UI layer and the backend.
/// Each function performs its action and returns an immediate result;
/// asynchronous output arrives later through the broadcast hub.

pub mod files;
pub mod job;
pub mod session;
