//! Workflow Instance State
//!
//! Records produced by running a template: the instance itself, one audit
//! record per attempted step, and appeals filed against a finished instance.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::model::Context;

/// Lifecycle status of a workflow instance.
///
/// Moves from `Running` to exactly one terminal value and never changes again.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Completed,
    Failed,
}

impl InstanceStatus {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a workflow template.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowInstance {
    pub instance_id: String,
    pub template_id: String,
    pub status: InstanceStatus,

    /// Snapshot of the initial context
    pub inputs: Context,

    /// Final context, present only when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Context>,

    pub triggered_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Creates a running instance with a fresh UUID.
    pub fn start(template_id: impl Into<String>, inputs: Context) -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            template_id: template_id.into(),
            status: InstanceStatus::Running,
            inputs,
            outputs: None,
            triggered_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Moves the instance to a terminal status.
    ///
    /// Outputs are kept only for `Completed`.
    pub fn finish(&mut self, status: InstanceStatus, outputs: Option<Context>) {
        self.outputs = match status {
            InstanceStatus::Completed => outputs,
            _ => None,
        };
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

/// Outcome of a single step attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Append-only audit entry for one step attempt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditStepRecord {
    /// Insertion order within the store, assigned on append
    #[serde(default)]
    pub sequence: u64,

    pub instance_id: String,
    pub step_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: StepStatus,

    /// Context as it was before the task ran
    pub input_snapshot: Context,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_snapshot: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditStepRecord {
    pub fn success(
        instance_id: &str,
        step_name: &str,
        started_at: DateTime<Utc>,
        input_snapshot: Context,
        output: Value,
    ) -> Self {
        Self {
            sequence: 0,
            instance_id: instance_id.to_string(),
            step_name: step_name.to_string(),
            started_at,
            completed_at: Utc::now(),
            status: StepStatus::Success,
            input_snapshot,
            output_snapshot: Some(output),
            error_message: None,
        }
    }

    pub fn failure(
        instance_id: &str,
        step_name: &str,
        started_at: DateTime<Utc>,
        input_snapshot: Context,
        error_message: String,
    ) -> Self {
        Self {
            sequence: 0,
            instance_id: instance_id.to_string(),
            step_name: step_name.to_string(),
            started_at,
            completed_at: Utc::now(),
            status: StepStatus::Failed,
            input_snapshot,
            output_snapshot: None,
            error_message: Some(error_message),
        }
    }
}

/// Resolution of an appeal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppealOutcome {
    Pending,
    Accepted,
    Rejected,
}

impl fmt::Display for AppealOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Accepted => f.write_str("accepted"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// An appeal links an original instance to its re-evaluation instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Appeal {
    pub appeal_of: String,
    pub new_instance_id: String,
    pub outcome: AppealOutcome,
    pub created_at: DateTime<Utc>,
}

impl Appeal {
    pub fn new(
        appeal_of: impl Into<String>,
        new_instance_id: impl Into<String>,
        outcome: AppealOutcome,
    ) -> Self {
        Self {
            appeal_of: appeal_of.into(),
            new_instance_id: new_instance_id.into(),
            outcome,
            created_at: Utc::now(),
        }
    }
}
