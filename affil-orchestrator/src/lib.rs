pub mod orchestrator;

pub use orchestrator::{EventOrchestrator, OrchestrationError};
