//! Template Validation
//!
//! Structural checks run when a template is loaded:
//! - Every step has a name and a task type
//! - Output mappings, when present, name a non-empty key
//!
//! Task types are not resolved here. An unknown task type is a failure of
//! the step that uses it, reported at execution time.

use std::collections::HashSet;

use log::{debug, info, warn};

use super::model::{StepDefinition, WorkflowTemplate};

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyStepName(usize),
    EmptyTaskType(String),
    EmptyOutputMapping(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyStepName(index) => {
                write!(f, "Step #{} has an empty or whitespace-only name", index + 1)
            }
            Self::EmptyTaskType(step) => write!(f, "Step '{}' has no task_type specified", step),
            Self::EmptyOutputMapping(step) => {
                write!(f, "Step '{}' has an empty output_mapping", step)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates a single step's fields.
fn validate_step(index: usize, step: &StepDefinition) -> Result<(), ValidationError> {
    if step.name.trim().is_empty() {
        return Err(ValidationError::EmptyStepName(index));
    }

    if step.task_type.trim().is_empty() {
        return Err(ValidationError::EmptyTaskType(step.name.clone()));
    }

    if let Some(key) = &step.output_mapping {
        if key.trim().is_empty() {
            return Err(ValidationError::EmptyOutputMapping(step.name.clone()));
        }
    }

    if step.output_mapping.is_none() {
        debug!("Step '{}' output is audited only", step.name);
    }

    Ok(())
}

/// Validates the whole template.
///
/// Returns the first structural error found. Duplicate step names and
/// output keys written by more than one step are allowed but logged.
pub fn validate_template(template: &WorkflowTemplate) -> Result<(), ValidationError> {
    info!(
        "Validating template '{}' with {} steps",
        template.id,
        template.steps.len()
    );

    if template.is_empty() {
        warn!("Template '{}' has no steps", template.id);
    }

    let mut names = HashSet::new();
    let mut outputs = HashSet::new();

    for (index, step) in template.steps.iter().enumerate() {
        validate_step(index, step)?;

        if !names.insert(step.name.as_str()) {
            warn!(
                "Template '{}': duplicate step name '{}' makes the audit trail ambiguous",
                template.id, step.name
            );
        }

        if let Some(key) = &step.output_mapping {
            if !outputs.insert(key.as_str()) {
                debug!(
                    "Template '{}': step '{}' overwrites context key '{}'",
                    template.id, step.name, key
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_template() {
        let template = WorkflowTemplate::new("ok")
            .step(StepDefinition::new("a", "mock_doc_lookup").with_output("scheme_rules"))
            .step(StepDefinition::new("b", "rule_engine"));

        assert!(validate_template(&template).is_ok());
    }

    #[test]
    fn test_empty_template_is_valid() {
        assert!(validate_template(&WorkflowTemplate::new("empty")).is_ok());
    }

    #[test]
    fn test_empty_step_name() {
        let template = WorkflowTemplate::new("t")
            .step(StepDefinition::new("a", "x"))
            .step(StepDefinition::new("  ", "x"));

        assert_eq!(
            validate_template(&template),
            Err(ValidationError::EmptyStepName(1))
        );
    }

    #[test]
    fn test_empty_task_type() {
        let template = WorkflowTemplate::new("t").step(StepDefinition::new("a", ""));
        assert_eq!(
            validate_template(&template),
            Err(ValidationError::EmptyTaskType("a".to_string()))
        );
    }

    #[test]
    fn test_empty_output_mapping() {
        let template =
            WorkflowTemplate::new("t").step(StepDefinition::new("a", "x").with_output(" "));
        assert!(matches!(
            validate_template(&template),
            Err(ValidationError::EmptyOutputMapping(_))
        ));
    }

    #[test]
    fn test_duplicate_names_allowed() {
        let template = WorkflowTemplate::new("t")
            .step(StepDefinition::new("same", "x"))
            .step(StepDefinition::new("same", "y"));

        assert!(validate_template(&template).is_ok());
    }

    #[test]
    fn test_unknown_task_type_not_checked() {
        let template = WorkflowTemplate::new("t").step(StepDefinition::new("a", "does_not_exist"));
        assert!(validate_template(&template).is_ok());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyStepName(0);
        assert!(err.to_string().contains("#1"));

        let err = ValidationError::EmptyTaskType("step1".to_string());
        assert!(err.to_string().contains("step1"));
    }
}
