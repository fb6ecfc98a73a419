//! Appeal Submission
//!
//! An appeal re-runs the evaluation of a completed instance with new
//! evidence. It is an ordinary instance of the built-in `appeal` template,
//! run through the same executor as every other workflow.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::engine::Engine;
use crate::error::EngineError;
use crate::workflow::{
    Appeal, AppealOutcome, Context, InstanceStatus, StepDefinition, WorkflowTemplate,
};

/// Id of the built-in appeal template.
pub const APPEAL_TEMPLATE_ID: &str = "appeal";

/// The fixed appeal pipeline.
pub fn appeal_template() -> WorkflowTemplate {
    WorkflowTemplate::new(APPEAL_TEMPLATE_ID)
        .step(
            StepDefinition::new("Load original instance", "load_original_instance")
                .with_output("original_instance"),
        )
        .step(
            StepDefinition::new("Validate evidence", "validate_evidence")
                .with_output("validated_data"),
        )
        .step(StepDefinition::new("Re-evaluate", "reevaluate").with_output("decision"))
        .step(
            StepDefinition::new("Compare decisions", "compare_decisions")
                .with_output("decision_comparison"),
        )
        .step(StepDefinition::new("Record appeal", "record_appeal").with_output("appeal"))
}

/// What the caller learns about a submitted appeal.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppealReceipt {
    pub appeal_of: String,
    pub new_instance_id: String,
    pub status: InstanceStatus,
    pub outcome: AppealOutcome,
}

impl Engine {
    /// Submits an appeal against `original_instance_id`.
    ///
    /// The appeal instance is created even when the evidence is rejected or
    /// the original cannot be appealed; such an appeal stays `pending`.
    pub fn submit_appeal(
        &self,
        original_instance_id: &str,
        new_data: Context,
    ) -> Result<AppealReceipt, EngineError> {
        let mut inputs = Context::new();
        inputs.insert(
            "original_instance_id".to_string(),
            Value::String(original_instance_id.to_string()),
        );
        inputs.insert("new_data".to_string(), Value::Object(new_data));

        let new_instance_id = self.run_template(&appeal_template(), inputs)?;
        let status = self.instance(&new_instance_id)?.status;

        let outcome = match self.stores().appeals.appeal(&new_instance_id)? {
            Some(appeal) => appeal.outcome,
            None => {
                warn!(
                    "Appeal {} of {} did not finish; recording it as pending",
                    new_instance_id, original_instance_id
                );
                self.stores().appeals.record(Appeal::new(
                    original_instance_id,
                    &new_instance_id,
                    AppealOutcome::Pending,
                ))?;
                AppealOutcome::Pending
            }
        };

        info!("Appeal {} submitted ({}, {})", new_instance_id, status, outcome);

        Ok(AppealReceipt {
            appeal_of: original_instance_id.to_string(),
            new_instance_id,
            status,
            outcome,
        })
    }
}
