//! Batch Evaluation
//!
//! Runs the per-citizen evaluation pipeline for many citizens at once:
//! - A bounded pool of worker threads pulls citizens in input order
//! - Each unit gets its own context seeded with `citizen_id` and `scheme_name`
//! - A failing (or panicking) unit is recorded and never stops its siblings
//! - Outcomes are collected over a channel until every unit has reported
//!
//! Results are kept in completion order, which is not the input order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::{run_guarded, Task, TaskInput, TaskRegistry, TaskResult};
use crate::error::TaskError;
use crate::workflow::{Context, ContextExt};

/// Worker bound used when the step config does not set `max_workers`.
pub const DEFAULT_MAX_WORKERS: usize = 20;

/// Task types the default pipeline is assembled from.
pub const PIPELINE_TASK_TYPES: [&str; 4] = [
    "mock_db_lookup",
    "mock_doc_lookup",
    "rule_engine",
    "decision_logic",
];

/// Per-citizen pipeline: fetch facts, fetch rules, evaluate, decide.
#[derive(Clone)]
pub struct EvaluationPipeline {
    fetch_entity: Arc<dyn Task>,
    fetch_rules: Arc<dyn Task>,
    evaluate: Arc<dyn Task>,
    decide: Arc<dyn Task>,
}

impl EvaluationPipeline {
    pub fn new(
        fetch_entity: impl Task + 'static,
        fetch_rules: impl Task + 'static,
        evaluate: impl Task + 'static,
        decide: impl Task + 'static,
    ) -> Self {
        Self {
            fetch_entity: Arc::new(fetch_entity),
            fetch_rules: Arc::new(fetch_rules),
            evaluate: Arc::new(evaluate),
            decide: Arc::new(decide),
        }
    }

    /// Assembles the pipeline from the registry's [`PIPELINE_TASK_TYPES`].
    pub fn from_registry(registry: &TaskRegistry) -> Result<Self, TaskError> {
        let [entity, rules, evaluate, decide] = PIPELINE_TASK_TYPES;
        Ok(Self {
            fetch_entity: registry.resolve(entity)?,
            fetch_rules: registry.resolve(rules)?,
            evaluate: registry.resolve(evaluate)?,
            decide: registry.resolve(decide)?,
        })
    }

    /// Runs the pipeline on a unit context and returns the decide output.
    ///
    /// The context is owned by this call; intermediate outputs are stored
    /// under `citizen`, `scheme_rules` and `rule_result`.
    pub fn run(&self, instance_id: &str, mut context: Context) -> TaskResult {
        let stages: [(&str, &Arc<dyn Task>); 3] = [
            ("citizen", &self.fetch_entity),
            ("scheme_rules", &self.fetch_rules),
            ("rule_result", &self.evaluate),
        ];

        for (key, task) in stages {
            let output = run_guarded(task.as_ref(), &TaskInput::new(instance_id, &context, None))?;
            context.insert(key.to_string(), output);
        }

        run_guarded(self.decide.as_ref(), &TaskInput::new(instance_id, &context, None))
    }
}

/// A citizen with a decision.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitDecision {
    pub citizen_id: String,
    pub decision: String,
}

/// A citizen whose evaluation failed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitFailure {
    pub citizen_id: String,
    pub error: String,
}

/// Aggregate of one batch evaluation.
///
/// `success_count + failure_count == total`, and `total` is the number of
/// citizens requested.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BatchEvaluationResult {
    pub results: Vec<UnitDecision>,
    pub failures: Vec<UnitFailure>,
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

/// The `parallel_execution` task.
///
/// Context:
/// - `citizens`: array of citizen ids
/// - `scheme_name`: scheme every citizen is evaluated against
///
/// Config:
/// - `max_workers`: worker pool bound (default 20, must be at least 1)
#[derive(Clone)]
pub struct BatchEvaluator {
    pipeline: EvaluationPipeline,
    default_max_workers: usize,
    worker_stack_size: Option<usize>,
}

impl BatchEvaluator {
    pub fn new(pipeline: EvaluationPipeline) -> Self {
        Self {
            pipeline,
            default_max_workers: DEFAULT_MAX_WORKERS,
            worker_stack_size: None,
        }
    }

    /// Sets the pool bound used when the step config has no `max_workers`.
    pub fn with_default_workers(mut self, max_workers: usize) -> Self {
        self.default_max_workers = max_workers.max(1);
        self
    }

    /// Sets the stack size of worker threads; the platform default otherwise.
    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    /// Evaluates every citizen and blocks until all of them have finished.
    pub fn evaluate(
        &self,
        instance_id: &str,
        citizens: &[String],
        scheme_name: &str,
        max_workers: usize,
    ) -> BatchEvaluationResult {
        let total = citizens.len();
        let mut outcome = BatchEvaluationResult {
            total,
            ..BatchEvaluationResult::default()
        };

        if total == 0 {
            info!("Batch evaluation: no citizens to evaluate");
            return outcome;
        }

        let workers = max_workers.clamp(1, total);
        let start_time = Instant::now();
        info!(
            "Batch evaluation: {} citizens against '{}' (workers: {})",
            total, scheme_name, workers
        );

        let next_index = AtomicUsize::new(0);
        let (tx, rx) = channel::<(usize, Result<String, TaskError>)>();

        let work = |tx: Sender<(usize, Result<String, TaskError>)>| loop {
            let index = next_index.fetch_add(1, Ordering::Relaxed);
            let Some(citizen_id) = citizens.get(index) else {
                break;
            };

            let result = self.evaluate_unit(instance_id, citizen_id, scheme_name);
            if tx.send((index, result)).is_err() {
                break;
            }
        };

        thread::scope(|scope| {
            // The pool shrinks to whatever the OS lets us start
            let mut started = 0;
            for n in 0..workers {
                let mut builder = thread::Builder::new().name(format!("batch-worker-{}", n));
                if let Some(bytes) = self.worker_stack_size {
                    builder = builder.stack_size(bytes);
                }

                let tx = tx.clone();
                match builder.spawn_scoped(scope, move || work(tx)) {
                    Ok(_) => started += 1,
                    Err(e) => {
                        warn!("Batch evaluation: could not start worker {}: {}", n, e);
                        break;
                    }
                }
            }

            if started == 0 {
                warn!("Batch evaluation: no worker started, evaluating on the calling thread");
                work(tx);
            } else {
                debug!("Batch evaluation: {} of {} workers started", started, workers);
                // Only workers hold senders now; the loop ends when all have exited
                drop(tx);
            }

            for (index, result) in rx {
                let citizen_id = citizens[index].clone();
                match result {
                    Ok(decision) => {
                        debug!("Citizen {}: {}", citizen_id, decision);
                        outcome.results.push(UnitDecision { citizen_id, decision });
                    }
                    Err(e) => {
                        warn!("Citizen {} failed: {}", citizen_id, e);
                        outcome.failures.push(UnitFailure {
                            citizen_id,
                            error: e.to_string(),
                        });
                    }
                }
            }
        });

        outcome.success_count = outcome.results.len();
        outcome.failure_count = outcome.failures.len();

        info!(
            "Batch evaluation finished in {:.2?}: {} succeeded, {} failed",
            start_time.elapsed(),
            outcome.success_count,
            outcome.failure_count
        );

        outcome
    }

    /// Runs one citizen through the pipeline in an isolated context.
    fn evaluate_unit(
        &self,
        instance_id: &str,
        citizen_id: &str,
        scheme_name: &str,
    ) -> Result<String, TaskError> {
        let mut context = Context::new();
        context.insert("citizen_id".to_string(), Value::String(citizen_id.to_string()));
        context.insert("scheme_name".to_string(), Value::String(scheme_name.to_string()));

        let decision = self.pipeline.run(instance_id, context)?;
        decision
            .get("decision")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TaskError::invalid("decision", "decide output has no decision string"))
    }
}

/// Reads the citizen id list; numeric ids are accepted and stringified.
fn citizen_ids(context: &Context) -> Result<Vec<String>, TaskError> {
    context
        .require_array("citizens")?
        .iter()
        .map(|value| match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(TaskError::invalid(
                "citizens",
                format!("expected string ids, found {}", other),
            )),
        })
        .collect()
}

impl Task for BatchEvaluator {
    fn run(&self, input: &TaskInput<'_>) -> TaskResult {
        let citizens = citizen_ids(input.context)?;
        let scheme_name = input.context.require_str("scheme_name")?;

        let max_workers = input.config_u64("max_workers", self.default_max_workers as u64)?;
        if max_workers == 0 {
            return Err(TaskError::InvalidConfig {
                key: "max_workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let max_workers = usize::try_from(max_workers).unwrap_or(usize::MAX);

        let result = self.evaluate(input.instance_id, &citizens, scheme_name, max_workers);
        serde_json::to_value(result).map_err(|e| TaskError::Failed(e.to_string()))
    }
}
