//! Workflow Execution Engine
//!
//! Drives one workflow instance from template to terminal status:
//! - Steps run in template order on the calling thread
//! - The context is snapshotted into the audit trail before each task runs
//! - The first failing step terminates the instance as `failed`
//! - Task errors are recorded, never returned to the caller

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info};
use serde_json::Value;

use super::registry::{run_guarded, TaskInput, TaskRegistry};
use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError, TaskError};
use crate::store::{FileStore, Stores};
use crate::tasks::registry_with_pipeline;
use crate::workflow::{
    AuditStepRecord, Context, DirectoryLoader, InstanceStatus, StepDefinition, TemplateCatalog,
    TemplateLoader, WorkflowInstance, WorkflowTemplate,
};

use super::appeal::appeal_template;

/// Context key returned by [`Engine::report`] when present.
const REPORT_KEY: &str = "report";

/// Workflow execution engine.
///
/// Holds the template source, the task registry and the stores. All three
/// are injected, so tests can swap any of them.
///
/// # Example
///
/// ```rust,no_run
/// use civicflow::config::EngineConfig;
/// use civicflow::execution::Engine;
/// use serde_json::json;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = Engine::from_config(&EngineConfig::default())?;
///
///     let mut inputs = serde_json::Map::new();
///     inputs.insert("citizen_id".into(), json!("CIT-00001"));
///     inputs.insert("scheme_name".into(), json!("scheme_alpha"));
///
///     let instance_id = engine.execute("eligibility_check", inputs)?;
///     println!("{}", engine.instance(&instance_id)?.status);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Engine {
    templates: Arc<dyn TemplateLoader>,
    registry: Arc<TaskRegistry>,
    stores: Stores,
}

impl Engine {
    /// Creates an engine from its three collaborators.
    pub fn new(
        templates: impl TemplateLoader + 'static,
        registry: TaskRegistry,
        stores: Stores,
    ) -> Self {
        Self {
            templates: Arc::new(templates),
            registry: Arc::new(registry),
            stores,
        }
    }

    /// Builds the default engine described by `config`.
    ///
    /// Templates come from `templates_dir` with the built-in `appeal`
    /// template in front. State is kept in `state_file` when set, in memory
    /// otherwise.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let stores = match &config.state_file {
            Some(path) => {
                info!("Using state file: {}", path.display());
                Stores::shared(Arc::new(FileStore::open(path)?))
            }
            None => Stores::in_memory(),
        };

        let templates = TemplateCatalog::new()
            .with_template(appeal_template())
            .with_fallback(DirectoryLoader::new(&config.templates_dir));

        let registry = registry_with_pipeline(
            crate::tasks::default_pipeline(),
            &stores,
            config.max_workers,
        );

        Ok(Self::new(templates, registry, stores))
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Runs the template `template_id` with `inputs` and returns the new
    /// instance id.
    ///
    /// # Returns
    ///
    /// * `Ok(id)` - The instance ran; read it to learn whether it completed
    /// * `Err` - The template could not be loaded or a store write failed
    pub fn execute(&self, template_id: &str, inputs: Context) -> Result<String, EngineError> {
        let template = self.templates.load(template_id)?;
        self.run_template(&template, inputs)
    }

    /// Runs an already loaded template.
    ///
    /// This is the main execution loop:
    /// 1. Creates the instance record (status `running`)
    /// 2. Runs each step against the shared context
    /// 3. Appends one audit record per step attempt
    /// 4. Stops at the first failure, otherwise stores the final context
    pub fn run_template(
        &self,
        template: &WorkflowTemplate,
        inputs: Context,
    ) -> Result<String, EngineError> {
        let start_time = Instant::now();

        let instance = WorkflowInstance::start(&template.id, inputs.clone());
        let instance_id = instance.instance_id.clone();
        self.stores.instances.create(&instance)?;

        info!(
            "Starting workflow '{}' (instance: {}, steps: {})",
            template.id,
            instance_id,
            template.len()
        );

        let mut context = inputs;

        for step in &template.steps {
            let started_at = Utc::now();
            let snapshot = context.clone();

            debug!("Starting step: {} ({})", step.name, step.task_type);

            match self.run_step(&instance_id, step, &context) {
                Ok(output) => {
                    self.stores.audit.append(AuditStepRecord::success(
                        &instance_id,
                        &step.name,
                        started_at,
                        snapshot,
                        output.clone(),
                    ))?;

                    if let Some(key) = &step.output_mapping {
                        context.insert(key.clone(), output);
                    }

                    info!("Step '{}' completed successfully", step.name);
                }
                Err(e) => {
                    error!("Step '{}' failed: {}", step.name, e);

                    self.stores.audit.append(AuditStepRecord::failure(
                        &instance_id,
                        &step.name,
                        started_at,
                        snapshot,
                        e.to_string(),
                    ))?;
                    self.stores
                        .instances
                        .finish(&instance_id, InstanceStatus::Failed, None)?;

                    info!(
                        "Workflow '{}' failed at step '{}' after {:.2?}",
                        template.id,
                        step.name,
                        start_time.elapsed()
                    );
                    return Ok(instance_id);
                }
            }
        }

        self.stores
            .instances
            .finish(&instance_id, InstanceStatus::Completed, Some(context))?;

        info!(
            "Workflow '{}' completed in {:.2?}",
            template.id,
            start_time.elapsed()
        );
        Ok(instance_id)
    }

    fn run_step(
        &self,
        instance_id: &str,
        step: &StepDefinition,
        context: &Context,
    ) -> Result<Value, TaskError> {
        let task = self.registry.resolve(&step.task_type)?;
        run_guarded(
            task.as_ref(),
            &TaskInput::new(instance_id, context, step.config.as_ref()),
        )
    }

    pub fn instance(&self, instance_id: &str) -> Result<WorkflowInstance, EngineError> {
        Ok(self.stores.instances.instance(instance_id)?)
    }

    /// Audit records of an instance, in insertion order.
    pub fn audit_trail(&self, instance_id: &str) -> Result<Vec<AuditStepRecord>, EngineError> {
        Ok(self.stores.audit.trail(instance_id)?)
    }

    /// The `report` output of a completed instance, or all of its outputs if
    /// no step produced a report.
    pub fn report(&self, instance_id: &str) -> Result<Value, EngineError> {
        let instance = self.instance(instance_id)?;

        let outputs = match (instance.status, instance.outputs) {
            (InstanceStatus::Completed, Some(outputs)) => outputs,
            (status, _) => {
                return Err(EngineError::NotCompleted {
                    instance_id: instance_id.to_string(),
                    status: status.to_string(),
                })
            }
        };

        Ok(match outputs.get(REPORT_KEY) {
            Some(report) => report.clone(),
            None => Value::Object(outputs),
        })
    }
}
