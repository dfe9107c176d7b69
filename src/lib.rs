pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::LocalStorage;
pub use app::{pipelines::GSheetsEtl, OutbreakWorkflow, WorkflowOptions, WorkflowReport};
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::WnvConfig;
pub use core::etl::EtlEngine;
pub use utils::error::{Result, WnvError};
