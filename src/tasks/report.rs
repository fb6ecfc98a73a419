//! Batch reporting and batch loading tasks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;
use crate::execution::{TaskInput, TaskResult};
use crate::workflow::ContextExt;

use super::decision::Decision;

/// Context key holding the batch result unless the step config names another.
const DEFAULT_REPORT_SOURCE: &str = "parallel_results";

const DEFAULT_BATCH_COUNT: u64 = 100;
const DEFAULT_BATCH_PREFIX: &str = "CIT";

/// Decision counts over one batch evaluation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Citizens with a decision
    pub total: usize,
    pub eligible: usize,
    pub not_eligible: usize,
    pub needs_review: usize,
    /// Citizens whose evaluation failed
    pub failed: usize,
}

/// `report_builder`: counts decisions in a batch result.
///
/// Config:
/// - `source`: context key of the batch result (default `parallel_results`)
pub fn build_report(input: &TaskInput<'_>) -> TaskResult {
    let source = input.config_str("source", DEFAULT_REPORT_SOURCE)?;
    let batch = input.context.require_object(source)?;
    let results = batch.require_array("results")?;

    let mut report = BatchReport {
        total: results.len(),
        failed: batch.get("failures").and_then(Value::as_array).map_or(0, Vec::len),
        ..BatchReport::default()
    };

    for item in results {
        match item.get("decision").and_then(Value::as_str) {
            Some(d) if d == Decision::Eligible.as_str() => report.eligible += 1,
            Some(d) if d == Decision::NotEligible.as_str() => report.not_eligible += 1,
            Some(d) if d == Decision::NeedsReview.as_str() => report.needs_review += 1,
            _ => {}
        }
    }

    serde_json::to_value(report).map_err(|e| TaskError::Failed(e.to_string()))
}

/// `load_citizen_batch`: produces the ids of a batch of citizens.
///
/// Config:
/// - `count`: number of ids (default 100)
/// - `prefix`: id prefix (default `CIT`)
///
/// Ids look like `CIT-00001`.
pub fn load_citizen_batch(input: &TaskInput<'_>) -> TaskResult {
    let count = input.config_u64("count", DEFAULT_BATCH_COUNT)?;
    let prefix = input.config_str("prefix", DEFAULT_BATCH_PREFIX)?;

    let ids: Vec<Value> = (1..=count)
        .map(|n| Value::String(format!("{}-{:05}", prefix, n)))
        .collect();

    Ok(Value::Array(ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Context, StepConfig};
    use serde_json::json;

    #[test]
    fn test_build_report_counts() {
        let context = json!({
            "parallel_results": {
                "results": [
                    {"citizen_id": "a", "decision": "ELIGIBLE"},
                    {"citizen_id": "b", "decision": "ELIGIBLE"},
                    {"citizen_id": "c", "decision": "NOT_ELIGIBLE"},
                    {"citizen_id": "d", "decision": "NEEDS_REVIEW"}
                ],
                "failures": [{"citizen_id": "e", "error": "boom"}]
            }
        });
        let context: Context = context.as_object().cloned().unwrap();

        let report = build_report(&TaskInput::new("i", &context, None)).unwrap();
        assert_eq!(
            report,
            json!({"total": 4, "eligible": 2, "not_eligible": 1, "needs_review": 1, "failed": 1})
        );
    }

    #[test]
    fn test_build_report_custom_source() {
        let context = json!({"nightly": {"results": []}});
        let context: Context = context.as_object().cloned().unwrap();
        let mut config = StepConfig::new();
        config.insert("source".to_string(), json!("nightly"));

        let report = build_report(&TaskInput::new("i", &context, Some(&config))).unwrap();
        assert_eq!(report["total"], json!(0));
        assert_eq!(report["failed"], json!(0));
    }

    #[test]
    fn test_build_report_missing_source() {
        let context = Context::new();
        let err = build_report(&TaskInput::new("i", &context, None)).unwrap_err();
        assert!(matches!(err, TaskError::MissingKey(k) if k == "parallel_results"));
    }

    #[test]
    fn test_load_citizen_batch() {
        let context = Context::new();
        let mut config = StepConfig::new();
        config.insert("count".to_string(), json!(3));
        config.insert("prefix".to_string(), json!("TST"));

        let ids = load_citizen_batch(&TaskInput::new("i", &context, Some(&config))).unwrap();
        assert_eq!(ids, json!(["TST-00001", "TST-00002", "TST-00003"]));
    }

    #[test]
    fn test_load_citizen_batch_defaults() {
        let context = Context::new();
        let ids = load_citizen_batch(&TaskInput::new("i", &context, None)).unwrap();

        let ids = ids.as_array().unwrap();
        assert_eq!(ids.len(), 100);
        assert_eq!(ids[0], json!("CIT-00001"));
        assert_eq!(ids[99], json!("CIT-00100"));
    }
}
