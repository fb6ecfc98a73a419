//! Eligibility rule evaluation.

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::execution::{TaskInput, TaskResult};
use crate::workflow::ContextExt;

/// Incomes at or above this share of the scheme limit are "near the limit".
const NEAR_LIMIT_RATIO: f64 = 0.9;

/// Outcome of checking one citizen against one scheme.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleResult {
    pub age_pass: bool,
    pub income_pass: bool,
    pub income_near_limit: bool,
}

impl RuleResult {
    pub fn evaluate(age: f64, income: f64, min_age: f64, max_age: f64, max_income: f64) -> Self {
        let income_pass = income <= max_income;
        Self {
            age_pass: min_age <= age && age <= max_age,
            income_pass,
            income_near_limit: income_pass && income >= NEAR_LIMIT_RATIO * max_income,
        }
    }
}

/// `rule_engine`: checks `citizen` against `scheme_rules`.
pub fn evaluate_rules(input: &TaskInput<'_>) -> TaskResult {
    let citizen = input.context.require_object("citizen")?;
    let rules = input.context.require_object("scheme_rules")?;

    let result = RuleResult::evaluate(
        citizen.require_f64("age")?,
        citizen.require_f64("income")?,
        rules.require_f64("min_age")?,
        rules.require_f64("max_age")?,
        rules.require_f64("max_income")?,
    );

    serde_json::to_value(result).map_err(|e| TaskError::Failed(e.to_string()))
}
