//! End-to-end runs through the public engine API.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::tempdir;

use civicflow::execution::{AppealReceipt, BatchEvaluationResult, EvaluationPipeline};
use civicflow::tasks::{base_registry, fetch_citizen, registry_with_pipeline};
use civicflow::workflow::{AppealOutcome, ContextExt, DirectoryLoader, InstanceStatus, StepStatus};
use civicflow::{
    Context, Engine, EngineConfig, EngineError, Stores, TaskError, TaskInput, TaskResult,
};

fn bundled_templates() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates")
}

fn engine() -> Engine {
    let config = EngineConfig {
        templates_dir: bundled_templates(),
        ..EngineConfig::default()
    };
    Engine::from_config(&config).unwrap()
}

fn ctx(value: Value) -> Context {
    value.as_object().cloned().unwrap()
}

/// Runs `eligibility_check` for a citizen aged 30 earning 300000.
fn not_eligible_original(engine: &Engine) -> String {
    let id = engine
        .execute(
            "eligibility_check",
            ctx(json!({
                "citizen_id": "CIT-00001",
                "scheme_name": "scheme_alpha",
                "age": 30,
                "income": 300000
            })),
        )
        .unwrap();

    let outputs = engine.instance(&id).unwrap().outputs.unwrap();
    assert_eq!(outputs["decision"]["decision"], json!("NOT_ELIGIBLE"));
    id
}

fn appeal(engine: &Engine, original: &str, evidence: Value) -> AppealReceipt {
    engine.submit_appeal(original, ctx(evidence)).unwrap()
}

#[test]
fn eligibility_check_completes_with_threaded_context() {
    let engine = engine();

    let id = engine
        .execute(
            "eligibility_check",
            ctx(json!({
                "citizen_id": "CIT-00042",
                "scheme_name": "scheme_alpha",
                "age": 30,
                "income": 100000
            })),
        )
        .unwrap();

    let instance = engine.instance(&id).unwrap();
    assert_eq!(instance.status, InstanceStatus::Completed);
    assert_eq!(instance.template_id, "eligibility_check");

    let outputs = instance.outputs.unwrap();
    for key in ["citizen", "scheme_rules", "rule_result", "decision"] {
        assert!(outputs.contains_key(key), "missing output {}", key);
    }
    assert_eq!(outputs["decision"]["decision"], json!("ELIGIBLE"));

    let trail = engine.audit_trail(&id).unwrap();
    let names: Vec<&str> = trail.iter().map(|r| r.step_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Fetch citizen", "Fetch scheme rules", "Evaluate rules", "Decide"]
    );
}

#[test]
fn rules_scenario_is_eligible() {
    let temp_dir = tempdir().unwrap();
    fs::write(
        temp_dir.path().join("rules_only.yaml"),
        r#"
steps:
  - name: Fetch rules
    task_type: mock_doc_lookup
    output_mapping: scheme_rules
  - name: Evaluate
    task_type: rule_engine
    output_mapping: rule_result
  - name: Decide
    task_type: decision_logic
    output_mapping: decision
"#,
    )
    .unwrap();

    let engine = Engine::from_config(&EngineConfig {
        templates_dir: temp_dir.path().to_path_buf(),
        ..EngineConfig::default()
    })
    .unwrap();

    let id = engine
        .execute(
            "rules_only",
            ctx(json!({
                "scheme_name": "scheme_alpha",
                "citizen": {"age": 30, "income": 100000}
            })),
        )
        .unwrap();

    let outputs = engine.instance(&id).unwrap().outputs.unwrap();
    assert_eq!(
        outputs["rule_result"],
        json!({"age_pass": true, "income_pass": true, "income_near_limit": false})
    );
    assert_eq!(outputs["decision"]["decision"], json!("ELIGIBLE"));
}

#[test]
fn unknown_scheme_fails_instance() {
    let engine = engine();

    let id = engine
        .execute(
            "eligibility_check",
            ctx(json!({"citizen_id": "CIT-1", "scheme_name": "scheme_omega"})),
        )
        .unwrap();

    let instance = engine.instance(&id).unwrap();
    assert_eq!(instance.status, InstanceStatus::Failed);
    assert!(instance.outputs.is_none());

    let trail = engine.audit_trail(&id).unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].status, StepStatus::Success);
    assert_eq!(trail[1].status, StepStatus::Failed);
    assert_eq!(
        trail[1].error_message.as_deref(),
        Some("Unknown scheme: scheme_omega")
    );
}

#[test]
fn unknown_template_is_a_caller_error() {
    let engine = engine();
    let err = engine.execute("no_such_template", Context::new()).unwrap_err();
    assert!(matches!(err, EngineError::Template(_)));
}

#[test]
fn batch_template_reports_every_citizen() {
    let engine = engine();

    let id = engine
        .execute("batch_eligibility", ctx(json!({"scheme_name": "scheme_beta"})))
        .unwrap();

    let instance = engine.instance(&id).unwrap();
    assert_eq!(instance.status, InstanceStatus::Completed);

    let outputs = instance.outputs.unwrap();
    let batch: BatchEvaluationResult =
        serde_json::from_value(outputs["parallel_results"].clone()).unwrap();
    assert_eq!(batch.total, 100);
    assert_eq!(batch.success_count + batch.failure_count, batch.total);

    let report = engine.report(&id).unwrap();
    let decided = ["eligible", "not_eligible", "needs_review"]
        .iter()
        .map(|k| report[*k].as_u64().unwrap())
        .sum::<u64>();
    assert_eq!(report["total"], json!(batch.success_count));
    assert_eq!(decided, batch.success_count as u64);
    assert_eq!(report["failed"], json!(0));
}

/// Fails every citizen whose id ends in "3".
fn flaky_lookup(input: &TaskInput<'_>) -> TaskResult {
    let id = input.context.require_str("citizen_id")?;
    if id.ends_with('3') {
        return Err(TaskError::Failed(format!("registry offline for {}", id)));
    }
    fetch_citizen(input)
}

#[test]
fn batch_step_completes_when_some_citizens_fail() {
    let stores = Stores::in_memory();
    let flaky = base_registry()
        .to_builder()
        .register("mock_db_lookup", flaky_lookup)
        .build();
    let pipeline = EvaluationPipeline::from_registry(&flaky).unwrap();
    let engine = Engine::new(
        DirectoryLoader::new(bundled_templates()),
        registry_with_pipeline(pipeline, &stores, 4),
        stores,
    );

    let id = engine
        .execute("batch_eligibility", ctx(json!({"scheme_name": "scheme_alpha"})))
        .unwrap();

    let instance = engine.instance(&id).unwrap();
    assert_eq!(instance.status, InstanceStatus::Completed);

    let outputs = instance.outputs.unwrap();
    let batch: BatchEvaluationResult =
        serde_json::from_value(outputs["parallel_results"].clone()).unwrap();
    assert_eq!(batch.total, 100);
    assert_eq!(batch.failure_count, 10);
    assert_eq!(batch.success_count, 90);
    assert!(batch
        .failures
        .iter()
        .all(|f| f.citizen_id.ends_with('3') && f.error.contains("registry offline")));

    let report = engine.report(&id).unwrap();
    assert_eq!(report["total"], json!(90));
    assert_eq!(report["failed"], json!(10));

    let trail = engine.audit_trail(&id).unwrap();
    assert!(trail.iter().all(|r| r.status == StepStatus::Success));
}

#[test]
fn batch_results_do_not_depend_on_pool_size() {
    let temp_dir = tempdir().unwrap();
    fs::write(
        temp_dir.path().join("batch.yaml"),
        r#"
steps:
  - name: Load
    task_type: load_citizen_batch
    config: {count: 60}
    output_mapping: citizens
  - name: Evaluate
    task_type: parallel_execution
    output_mapping: parallel_results
"#,
    )
    .unwrap();

    let run_with = |max_workers: usize| {
        let engine = Engine::from_config(&EngineConfig {
            templates_dir: temp_dir.path().to_path_buf(),
            max_workers,
            ..EngineConfig::default()
        })
        .unwrap();
        let id = engine
            .execute("batch", ctx(json!({"scheme_name": "scheme_alpha"})))
            .unwrap();
        let outputs = engine.instance(&id).unwrap().outputs.unwrap();
        let batch: BatchEvaluationResult =
            serde_json::from_value(outputs["parallel_results"].clone()).unwrap();
        batch
            .results
            .into_iter()
            .map(|r| (r.citizen_id, r.decision))
            .collect::<HashSet<_>>()
    };

    let serial = run_with(1);
    assert_eq!(serial.len(), 60);
    assert_eq!(serial, run_with(20));
}

#[test]
fn appeal_with_new_income_is_accepted() {
    let engine = engine();
    let original = not_eligible_original(&engine);

    let receipt = appeal(&engine, &original, json!({"income": 40000}));
    assert_eq!(receipt.status, InstanceStatus::Completed);
    assert_eq!(receipt.outcome, AppealOutcome::Accepted);
    assert_eq!(receipt.appeal_of, original);

    let outputs = engine.instance(&receipt.new_instance_id).unwrap().outputs.unwrap();
    let comparison = &outputs["decision_comparison"];
    assert_eq!(comparison["decision_changed"], json!(true));
    assert_eq!(comparison["old_decision"], json!("NOT_ELIGIBLE"));
    assert_eq!(comparison["new_decision"], json!("ELIGIBLE"));
    assert_eq!(comparison["changed_fields"], json!(["income"]));

    // The original instance is untouched
    let original_instance = engine.instance(&original).unwrap();
    assert_eq!(original_instance.inputs["income"], json!(300000));
}

#[test]
fn appeal_with_disallowed_field_fails_before_reevaluation() {
    let engine = engine();
    let original = not_eligible_original(&engine);

    let receipt = appeal(&engine, &original, json!({"zipcode": "00000"}));
    assert_eq!(receipt.status, InstanceStatus::Failed);
    assert_eq!(receipt.outcome, AppealOutcome::Pending);

    let trail = engine.audit_trail(&receipt.new_instance_id).unwrap();
    let names: Vec<&str> = trail.iter().map(|r| r.step_name.as_str()).collect();
    assert_eq!(names, vec!["Load original instance", "Validate evidence"]);
    assert_eq!(
        trail[1].error_message.as_deref(),
        Some("Invalid evidence field: zipcode")
    );
}

#[test]
fn appeal_against_failed_instance_fails() {
    let engine = engine();
    let failed = engine
        .execute(
            "eligibility_check",
            ctx(json!({"citizen_id": "CIT-1", "scheme_name": "scheme_omega"})),
        )
        .unwrap();

    let receipt = appeal(&engine, &failed, json!({"income": 1}));
    assert_eq!(receipt.status, InstanceStatus::Failed);

    let trail = engine.audit_trail(&receipt.new_instance_id).unwrap();
    assert_eq!(trail.len(), 1);
    assert!(trail[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("not completed"));
}

#[test]
fn completed_instance_rereads_are_identical() {
    let engine = engine();
    let id = not_eligible_original(&engine);

    let first = engine.instance(&id).unwrap();
    let second = engine.instance(&id).unwrap();
    assert_eq!(first, second);

    let first_trail = serde_json::to_value(engine.audit_trail(&id).unwrap()).unwrap();
    let second_trail = serde_json::to_value(engine.audit_trail(&id).unwrap()).unwrap();
    assert_eq!(first_trail, second_trail);
}

#[test]
fn state_file_survives_engine_restart() {
    let temp_dir = tempdir().unwrap();
    let config = EngineConfig {
        templates_dir: bundled_templates(),
        state_file: Some(temp_dir.path().join("state.json")),
        ..EngineConfig::default()
    };

    let (original, receipt) = {
        let engine = Engine::from_config(&config).unwrap();
        let original = not_eligible_original(&engine);
        let receipt = appeal(&engine, &original, json!({"income": 40000}));
        (original, receipt)
    };

    let engine = Engine::from_config(&config).unwrap();
    let instance = engine.instance(&original).unwrap();
    assert_eq!(instance.status, InstanceStatus::Completed);
    assert_eq!(engine.audit_trail(&original).unwrap().len(), 4);

    let appeals = engine.stores().appeals.appeals_for(&original).unwrap();
    assert_eq!(appeals.len(), 1);
    assert_eq!(appeals[0].new_instance_id, receipt.new_instance_id);
    assert_eq!(appeals[0].outcome, AppealOutcome::Accepted);
}
