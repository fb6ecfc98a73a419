//! Workflow Definition Module
//!
//! Data structures for templates and the records produced by running them.
//!
//! # Structure
//!
//! - [`model`]: Templates, steps and the execution context
//! - [`parser`]: YAML/JSON loading and template lookup
//! - [`validator`]: Structural template checks
//! - [`state`]: Instances, audit records and appeals

pub mod model;
pub mod parser;
pub mod state;
pub mod validator;

pub use model::{Context, ContextExt, StepConfig, StepDefinition, WorkflowTemplate};
pub use parser::{load_template, parse_template, DirectoryLoader, TemplateCatalog, TemplateLoader};
pub use state::{
    Appeal, AppealOutcome, AuditStepRecord, InstanceStatus, StepStatus, WorkflowInstance,
};
pub use validator::{validate_template, ValidationError};
