/// Services module
/// Mechanisms behind the command surface: process orchestration, environment
/// resolution, persisted settings, file access, and event fan-out

pub mod env;
pub mod files;
pub mod hub;
pub mod job;
pub mod progress;
pub mod session;
pub mod settings;

pub use hub::{Event, EventHub};
pub use job::JobRunner;
pub use session::SessionRegistry;
