//! Workflow Execution Module
//!
//! Provides the sequential executor, the task registry it dispatches
//! through, and the concurrent batch evaluation sub-engine.
//!
//! # Architecture
//!
//! - [`engine`]: Runs one workflow instance step by step
//! - [`registry`]: Task capabilities keyed by task type
//! - [`batch`]: Bounded fan-out of the per-citizen pipeline
//! - [`appeal`]: The built-in appeal template and its submission

pub mod appeal;
pub mod batch;
pub mod engine;
pub mod registry;

pub use appeal::{appeal_template, AppealReceipt, APPEAL_TEMPLATE_ID};
pub use batch::{
    BatchEvaluationResult, BatchEvaluator, EvaluationPipeline, UnitDecision, UnitFailure,
    DEFAULT_MAX_WORKERS,
};
pub use engine::Engine;
pub use registry::{run_guarded, Task, TaskInput, TaskRegistry, TaskRegistryBuilder, TaskResult};
