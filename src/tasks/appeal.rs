//! Appeal pipeline tasks.
//!
//! The steps of the `appeal` template, in order:
//! `load_original_instance` → `validate_evidence` → `reevaluate` →
//! `compare_decisions` → `record_appeal`.

use std::sync::Arc;

use log::info;
use serde_json::{json, Value};

use super::facts::OVERRIDABLE_FIELDS;
use crate::error::TaskError;
use crate::execution::{EvaluationPipeline, TaskInput, TaskResult};
use crate::store::{AppealStore, InstanceStore};
use crate::workflow::{Appeal, AppealOutcome, Context, ContextExt, InstanceStatus};

/// Pulls the decision string out of either `{decision, reason}` or a bare string.
fn decision_label<'a>(value: &'a Value, key: &str) -> Result<&'a str, TaskError> {
    match value {
        Value::String(s) => Ok(s.as_str()),
        Value::Object(map) => map.require_str("decision"),
        _ => Err(TaskError::invalid(key, "expected a decision")),
    }
}

/// `load_original_instance`: loads the appealed instance.
///
/// Fails unless the instance exists and completed.
pub struct LoadOriginalInstance {
    instances: Arc<dyn InstanceStore>,
}

impl LoadOriginalInstance {
    pub fn new(instances: Arc<dyn InstanceStore>) -> Self {
        Self { instances }
    }
}

impl crate::execution::Task for LoadOriginalInstance {
    fn run(&self, input: &TaskInput<'_>) -> TaskResult {
        let original_id = input.context.require_str("original_instance_id")?;
        let original = self.instances.instance(original_id)?;

        if original.status != InstanceStatus::Completed {
            return Err(TaskError::Validation(format!(
                "Original workflow {} is not completed (status: {})",
                original_id, original.status
            )));
        }

        Ok(json!({
            "instance_id": original.instance_id,
            "template_id": original.template_id,
            "inputs": original.inputs,
            "outputs": original.outputs,
        }))
    }
}

/// `validate_evidence`: accepts `new_data` if every key may be overridden.
pub fn validate_evidence(input: &TaskInput<'_>) -> TaskResult {
    let new_data = input.context.require_object("new_data")?;

    if let Some(field) = new_data
        .keys()
        .find(|key| !OVERRIDABLE_FIELDS.contains(&key.as_str()))
    {
        return Err(TaskError::Validation(format!("Invalid evidence field: {}", field)));
    }

    Ok(Value::Object(new_data.clone()))
}

/// `reevaluate`: re-runs the per-citizen pipeline for the original inputs
/// with the validated evidence applied on top.
///
/// Fields neither submitted nor pinned by the original inputs come from the
/// citizen the original run recorded, so both decisions concern the same
/// citizen.
pub struct Reevaluate {
    pipeline: EvaluationPipeline,
}

impl Reevaluate {
    pub fn new(pipeline: EvaluationPipeline) -> Self {
        Self { pipeline }
    }
}

impl crate::execution::Task for Reevaluate {
    fn run(&self, input: &TaskInput<'_>) -> TaskResult {
        let original = input.context.require_object("original_instance")?;
        let original_inputs = original.require_object("inputs")?;
        let evidence = input.context.require_object("validated_data")?;
        let recorded_citizen = original
            .get("outputs")
            .and_then(|outputs| outputs.get("citizen"))
            .and_then(Value::as_object);

        let mut unit = Context::new();
        for key in ["citizen_id", "scheme_name"] {
            let value = original_inputs.require(key)?;
            unit.insert(key.to_string(), value.clone());
        }
        for field in OVERRIDABLE_FIELDS {
            let value = evidence
                .get(field)
                .or_else(|| original_inputs.get(field))
                .or_else(|| recorded_citizen.and_then(|citizen| citizen.get(field)));
            if let Some(value) = value {
                unit.insert(field.to_string(), value.clone());
            }
        }

        self.pipeline.run(input.instance_id, unit)
    }
}

/// `compare_decisions`: compares the original and re-evaluated decisions.
///
/// `changed_fields` lists the fields the appellant submitted, whether or not
/// they moved the decision.
pub fn compare_decisions(input: &TaskInput<'_>) -> TaskResult {
    let original = input.context.require_object("original_instance")?;
    let outputs = original.require_object("outputs")?;
    let old_decision = decision_label(
        outputs.require("decision")?,
        "original_instance.outputs.decision",
    )?;
    let new_decision = decision_label(input.context.require("decision")?, "decision")?;

    let changed_fields: Vec<&String> = input
        .context
        .require_object("validated_data")?
        .keys()
        .collect();

    Ok(json!({
        "decision_changed": old_decision != new_decision,
        "old_decision": old_decision,
        "new_decision": new_decision,
        "changed_fields": changed_fields,
    }))
}

/// `record_appeal`: stores the appeal with its final outcome.
pub struct RecordAppeal {
    appeals: Arc<dyn AppealStore>,
}

impl RecordAppeal {
    pub fn new(appeals: Arc<dyn AppealStore>) -> Self {
        Self { appeals }
    }
}

impl crate::execution::Task for RecordAppeal {
    fn run(&self, input: &TaskInput<'_>) -> TaskResult {
        let comparison = input.context.require_object("decision_comparison")?;
        let changed = comparison
            .require("decision_changed")?
            .as_bool()
            .ok_or_else(|| TaskError::invalid("decision_changed", "expected a boolean"))?;

        let appeal_of = input
            .context
            .require_object("original_instance")?
            .require_str("instance_id")?;

        let outcome = if changed {
            AppealOutcome::Accepted
        } else {
            AppealOutcome::Rejected
        };

        self.appeals
            .record(Appeal::new(appeal_of, input.instance_id, outcome))?;
        info!("Appeal of {} {}", appeal_of, outcome);

        Ok(json!({ "outcome": outcome }))
    }
}
