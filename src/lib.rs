//! CivicFlow - Eligibility Workflow Engine
//!
//! Runs declarative, template-defined workflows for citizen eligibility
//! decisions. Every step is audited, every instance ends in exactly one
//! terminal status, and completed decisions can be appealed with new
//! evidence.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`workflow`]: Templates, instances, audit records and template loading
//! - [`execution`]: Sequential executor, task registry and batch sub-engine
//! - [`tasks`]: Built-in task capabilities (lookups, rules, decisions, appeals)
//! - [`store`]: Instance, audit and appeal persistence
//! - [`config`]: Engine configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use civicflow::config::EngineConfig;
//! use civicflow::Engine;
//! use serde_json::json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::from_config(&EngineConfig::default())?;
//!
//!     let mut inputs = serde_json::Map::new();
//!     inputs.insert("scheme_name".into(), json!("scheme_beta"));
//!
//!     // Evaluate a batch of citizens and read the summary
//!     let instance_id = engine.execute("batch_eligibility", inputs)?;
//!     println!("{}", engine.report(&instance_id)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod store;
pub mod tasks;
pub mod workflow;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{ConfigError, EngineError, StoreError, TaskError, TemplateError};
pub use execution::{Engine, Task, TaskInput, TaskRegistry, TaskResult};
pub use store::{FileStore, MemoryStore, Stores};
pub use workflow::{load_template, Context, StepDefinition, WorkflowTemplate};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "CivicFlow";
