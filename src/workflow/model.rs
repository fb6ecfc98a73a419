//! Workflow Template Model
//!
//! Data structures describing a reusable workflow and the key-value context
//! threaded through its steps.
//!
//! # Example YAML Format
//!
//! ```yaml
//! id: eligibility_check
//! steps:
//!   - name: Fetch citizen
//!     task_type: mock_db_lookup
//!     output_mapping: citizen
//!
//!   - name: Fetch scheme rules
//!     task_type: mock_doc_lookup
//!     output_mapping: scheme_rules
//!
//!   - name: Batch evaluation
//!     task_type: parallel_execution
//!     config:
//!       max_workers: 8
//!     output_mapping: parallel_results
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TaskError;

/// Mutable key-value state shared by the steps of one workflow instance.
pub type Context = Map<String, Value>;

/// Opaque per-step configuration passed verbatim to the task.
pub type StepConfig = Map<String, Value>;

/// A single step of a workflow template.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepDefinition {
    /// Display name, recorded in the audit trail
    pub name: String,

    /// Key into the task registry
    pub task_type: String,

    /// Configuration handed to the task as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<StepConfig>,

    /// Context key receiving the task output; output is only audited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mapping: Option<String>,
}

impl StepDefinition {
    /// Creates a step with no config and no output mapping.
    ///
    /// # Example
    ///
    /// ```
    /// use civicflow::workflow::StepDefinition;
    /// use serde_json::json;
    ///
    /// let step = StepDefinition::new("Batch evaluation", "parallel_execution")
    ///     .with_config_value("max_workers", json!(4))
    ///     .with_output("parallel_results");
    /// ```
    pub fn new(name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            task_type: task_type.into().trim().to_string(),
            config: None,
            output_mapping: None,
        }
    }

    /// Sets the context key the output is stored under.
    pub fn with_output(mut self, key: impl Into<String>) -> Self {
        self.output_mapping = Some(key.into());
        self
    }

    /// Replaces the step configuration.
    pub fn with_config(mut self, config: StepConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Adds a single configuration entry.
    pub fn with_config_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config
            .get_or_insert_with(StepConfig::new)
            .insert(key.into(), value);
        self
    }
}

/// An ordered list of steps executed top to bottom.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowTemplate {
    /// Template identifier (defaults to the file stem when loaded from disk)
    #[serde(default)]
    pub id: String,

    /// Steps in execution order
    pub steps: Vec<StepDefinition>,
}

impl WorkflowTemplate {
    /// Creates an empty template.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step, builder style.
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Returns the names of all task types the template dispatches to.
    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.steps.iter().map(|s| s.task_type.as_str()).collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the template has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Typed accessors for context and config maps.
///
/// Every accessor reports a missing key or a wrongly typed value as a
/// [`TaskError`] so tasks can use `?` directly.
pub trait ContextExt {
    fn require(&self, key: &str) -> Result<&Value, TaskError>;
    fn require_str(&self, key: &str) -> Result<&str, TaskError>;
    fn require_f64(&self, key: &str) -> Result<f64, TaskError>;
    fn require_array(&self, key: &str) -> Result<&Vec<Value>, TaskError>;
    fn require_object(&self, key: &str) -> Result<&Context, TaskError>;
}

impl ContextExt for Context {
    fn require(&self, key: &str) -> Result<&Value, TaskError> {
        self.get(key)
            .ok_or_else(|| TaskError::MissingKey(key.to_string()))
    }

    fn require_str(&self, key: &str) -> Result<&str, TaskError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| TaskError::invalid(key, "expected a string"))
    }

    fn require_f64(&self, key: &str) -> Result<f64, TaskError> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| TaskError::invalid(key, "expected a number"))
    }

    fn require_array(&self, key: &str) -> Result<&Vec<Value>, TaskError> {
        self.require(key)?
            .as_array()
            .ok_or_else(|| TaskError::invalid(key, "expected an array"))
    }

    fn require_object(&self, key: &str) -> Result<&Context, TaskError> {
        self.require(key)?
            .as_object()
            .ok_or_else(|| TaskError::invalid(key, "expected an object"))
    }
}
