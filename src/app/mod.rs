pub mod inputs;
pub mod map_export;
pub mod pipelines;
pub mod workflow;

pub use inputs::{AnalysisInputs, ConfiguredInputs, PromptInputs};
pub use workflow::{OutbreakWorkflow, WorkflowOptions, WorkflowReport};
