pub mod events;
pub mod orchestrator;
pub mod prompts;

pub use events::{EventPublisher, WorkflowEvent};
pub use orchestrator::Workflow;
