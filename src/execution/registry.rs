//! Task Registry
//!
//! Maps task-type identifiers to task capabilities. A registry is built once
//! with [`TaskRegistryBuilder`] and is read-only afterwards; the engine
//! receives it by injection, so tests can swap any task type for a fake.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use crate::error::TaskError;
use crate::workflow::{Context, StepConfig};

/// Result of a single task invocation.
pub type TaskResult = Result<Value, TaskError>;

/// Everything a task receives for one invocation.
///
/// The context is borrowed immutably: a task changes the workflow context
/// only through its returned output and the step's `output_mapping`.
#[derive(Debug, Clone, Copy)]
pub struct TaskInput<'a> {
    /// Instance the step belongs to
    pub instance_id: &'a str,
    pub context: &'a Context,
    pub config: Option<&'a StepConfig>,
}

impl<'a> TaskInput<'a> {
    pub fn new(instance_id: &'a str, context: &'a Context, config: Option<&'a StepConfig>) -> Self {
        Self {
            instance_id,
            context,
            config,
        }
    }

    /// Reads a raw config value.
    pub fn config_value(&self, key: &str) -> Option<&'a Value> {
        self.config.and_then(|c| c.get(key))
    }

    /// Reads an unsigned integer from the config, falling back to `default`
    /// when the key is absent.
    pub fn config_u64(&self, key: &str, default: u64) -> Result<u64, TaskError> {
        match self.config_value(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_u64().ok_or_else(|| TaskError::InvalidConfig {
                key: key.to_string(),
                reason: format!("expected a non-negative integer, got {}", value),
            }),
        }
    }

    /// Reads a string from the config, falling back to `default`.
    pub fn config_str(&self, key: &str, default: &'a str) -> Result<&'a str, TaskError> {
        match self.config_value(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_str().ok_or_else(|| TaskError::InvalidConfig {
                key: key.to_string(),
                reason: format!("expected a string, got {}", value),
            }),
        }
    }
}

/// A pluggable unit of work invoked by the engine.
///
/// Plain functions and closures with the matching signature are tasks.
pub trait Task: Send + Sync {
    fn run(&self, input: &TaskInput<'_>) -> TaskResult;
}

impl<F> Task for F
where
    F: Fn(&TaskInput<'_>) -> TaskResult + Send + Sync,
{
    fn run(&self, input: &TaskInput<'_>) -> TaskResult {
        self(input)
    }
}

/// Invokes a task, turning a panic into [`TaskError::Panicked`].
///
/// Tasks are arbitrary plugged-in code; a panic must end up as a step or unit
/// failure like any other error.
pub fn run_guarded(task: &dyn Task, input: &TaskInput<'_>) -> TaskResult {
    panic::catch_unwind(AssertUnwindSafe(|| task.run(input)))
        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Immutable task-type to task mapping.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    /// Starts a builder pre-filled with this registry's entries.
    pub fn to_builder(&self) -> TaskRegistryBuilder {
        TaskRegistryBuilder {
            tasks: self.tasks.clone(),
        }
    }

    /// Looks up a task; an unknown type is a configuration error.
    pub fn resolve(&self, task_type: &str) -> Result<Arc<dyn Task>, TaskError> {
        self.tasks
            .get(task_type)
            .cloned()
            .ok_or_else(|| TaskError::UnknownTaskType(task_type.to_string()))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.tasks.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}

/// Collects task registrations; the only way to populate a registry.
#[derive(Default)]
pub struct TaskRegistryBuilder {
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistryBuilder {
    /// Registers a task, replacing any previous one with the same type.
    pub fn register(self, task_type: impl Into<String>, task: impl Task + 'static) -> Self {
        self.register_shared(task_type, Arc::new(task))
    }

    pub fn register_shared(mut self, task_type: impl Into<String>, task: Arc<dyn Task>) -> Self {
        self.tasks.insert(task_type.into(), task);
        self
    }

    pub fn build(self) -> TaskRegistry {
        TaskRegistry { tasks: self.tasks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(input: &TaskInput<'_>) -> TaskResult {
        Ok(Value::Object(input.context.clone()))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = TaskRegistry::builder()
            .register("echo", echo)
            .register("constant", |_: &TaskInput<'_>| -> TaskResult { Ok(json!(42)) })
            .build();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.task_types(), vec!["constant", "echo"]);

        let ctx = Context::new();
        let input = TaskInput::new("i", &ctx, None);
        assert_eq!(registry.resolve("constant").unwrap().run(&input).unwrap(), json!(42));
    }

    #[test]
    fn test_unknown_task_type() {
        let registry = TaskRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.resolve("missing"),
            Err(TaskError::UnknownTaskType(t)) if t == "missing"
        ));
    }

    #[test]
    fn test_to_builder_overrides_single_entry() {
        let base = TaskRegistry::builder()
            .register("a", |_: &TaskInput<'_>| -> TaskResult { Ok(json!("real")) })
            .register("b", |_: &TaskInput<'_>| -> TaskResult { Ok(json!("b")) })
            .build();

        let patched = base
            .to_builder()
            .register("a", |_: &TaskInput<'_>| -> TaskResult { Ok(json!("fake")) })
            .build();

        let ctx = Context::new();
        let input = TaskInput::new("i", &ctx, None);
        assert_eq!(patched.resolve("a").unwrap().run(&input).unwrap(), json!("fake"));
        assert_eq!(base.resolve("a").unwrap().run(&input).unwrap(), json!("real"));
        assert!(patched.contains("b"));
    }

    #[test]
    fn test_run_guarded_catches_panics() {
        let ctx = Context::new();
        let input = TaskInput::new("i", &ctx, None);

        let exploding = |_: &TaskInput<'_>| -> TaskResult { panic!("bad input {}", 7) };
        let err = run_guarded(&exploding, &input).unwrap_err();
        assert!(matches!(err, TaskError::Panicked(ref m) if m == "bad input 7"));

        let fine = |_: &TaskInput<'_>| -> TaskResult { Ok(json!(true)) };
        assert_eq!(run_guarded(&fine, &input).unwrap(), json!(true));
    }

    #[test]
    fn test_config_accessors() {
        let ctx = Context::new();
        let mut config = StepConfig::new();
        config.insert("max_workers".to_string(), json!(4));
        config.insert("prefix".to_string(), json!("CIT"));
        config.insert("bad".to_string(), json!(-1));

        let input = TaskInput::new("i", &ctx, Some(&config));
        assert_eq!(input.config_u64("max_workers", 20).unwrap(), 4);
        assert_eq!(input.config_u64("absent", 20).unwrap(), 20);
        assert_eq!(input.config_str("prefix", "X").unwrap(), "CIT");
        assert!(matches!(
            input.config_u64("bad", 1),
            Err(TaskError::InvalidConfig { .. })
        ));

        let no_config = TaskInput::new("i", &ctx, None);
        assert_eq!(no_config.config_u64("max_workers", 20).unwrap(), 20);
    }
}
