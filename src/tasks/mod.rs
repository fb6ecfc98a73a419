//! Task Capabilities
//!
//! The task types the engine ships with, and the registries that bundle them.
//!
//! - [`facts`]: citizen and scheme lookups (`mock_db_lookup`, `mock_doc_lookup`)
//! - [`eligibility`]: rule evaluation (`rule_engine`)
//! - [`decision`]: final decision (`decision_logic`)
//! - [`report`]: batch loading and reporting (`load_citizen_batch`, `report_builder`)
//! - [`appeal`]: the appeal pipeline steps

pub mod appeal;
pub mod decision;
pub mod eligibility;
pub mod facts;
pub mod report;

pub use appeal::{
    compare_decisions, validate_evidence, LoadOriginalInstance, Reevaluate, RecordAppeal,
};
pub use decision::{make_decision, Decision};
pub use eligibility::{evaluate_rules, RuleResult};
pub use facts::{
    fetch_citizen, fetch_scheme_rules, generate_citizen, scheme_rules, Citizen, SchemeRules,
    OVERRIDABLE_FIELDS, SCHEMES,
};
pub use report::{build_report, load_citizen_batch, BatchReport};

use crate::execution::{BatchEvaluator, EvaluationPipeline, TaskRegistry, DEFAULT_MAX_WORKERS};
use crate::store::Stores;

/// Tasks that need neither stores nor other tasks.
pub fn base_registry() -> TaskRegistry {
    TaskRegistry::builder()
        .register("mock_db_lookup", fetch_citizen)
        .register("mock_doc_lookup", fetch_scheme_rules)
        .register("rule_engine", evaluate_rules)
        .register("decision_logic", make_decision)
        .register("report_builder", build_report)
        .register("load_citizen_batch", load_citizen_batch)
        .register("validate_evidence", validate_evidence)
        .register("compare_decisions", compare_decisions)
        .build()
}

/// fetch citizen → fetch scheme rules → evaluate → decide.
pub fn default_pipeline() -> EvaluationPipeline {
    EvaluationPipeline::new(fetch_citizen, fetch_scheme_rules, evaluate_rules, make_decision)
}

/// Every built-in task type, backed by `stores`.
pub fn default_registry(stores: &Stores) -> TaskRegistry {
    registry_with_pipeline(default_pipeline(), stores, DEFAULT_MAX_WORKERS)
}

/// Every built-in task type, with batch evaluation and re-evaluation running
/// `pipeline`.
///
/// `max_workers` is the batch pool bound used when a step does not set one.
pub fn registry_with_pipeline(
    pipeline: EvaluationPipeline,
    stores: &Stores,
    max_workers: usize,
) -> TaskRegistry {
    base_registry()
        .to_builder()
        .register(
            "parallel_execution",
            BatchEvaluator::new(pipeline.clone()).with_default_workers(max_workers),
        )
        .register("reevaluate", Reevaluate::new(pipeline))
        .register(
            "load_original_instance",
            LoadOriginalInstance::new(stores.instances.clone()),
        )
        .register("record_appeal", RecordAppeal::new(stores.appeals.clone()))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_task_types() {
        let registry = default_registry(&Stores::in_memory());

        assert_eq!(
            registry.task_types(),
            vec![
                "compare_decisions",
                "decision_logic",
                "load_citizen_batch",
                "load_original_instance",
                "mock_db_lookup",
                "mock_doc_lookup",
                "parallel_execution",
                "record_appeal",
                "reevaluate",
                "report_builder",
                "rule_engine",
                "validate_evidence",
            ]
        );
    }

    #[test]
    fn test_base_registry_has_no_store_tasks() {
        let registry = base_registry();
        assert_eq!(registry.len(), 8);
        assert!(!registry.contains("record_appeal"));
        assert!(!registry.contains("parallel_execution"));
    }
}
