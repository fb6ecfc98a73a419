//! Final eligibility decision.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::TaskError;
use crate::execution::{TaskInput, TaskResult};
use crate::workflow::ContextExt;

/// Possible decisions for one citizen.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Eligible,
    NotEligible,
    NeedsReview,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eligible => "ELIGIBLE",
            Self::NotEligible => "NOT_ELIGIBLE",
            Self::NeedsReview => "NEEDS_REVIEW",
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Eligible => "All eligibility criteria satisfied",
            Self::NotEligible => "Eligibility criteria not met",
            Self::NeedsReview => "Income close to scheme limit",
        }
    }

    /// Near-limit income always goes to review, even if the age check failed.
    pub fn from_rules(age_pass: bool, income_pass: bool, income_near_limit: bool) -> Self {
        if income_near_limit {
            Self::NeedsReview
        } else if age_pass && income_pass {
            Self::Eligible
        } else {
            Self::NotEligible
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn require_bool(rules: &crate::workflow::Context, key: &str) -> Result<bool, TaskError> {
    rules
        .require(key)?
        .as_bool()
        .ok_or_else(|| TaskError::invalid(key, "expected a boolean"))
}

/// `decision_logic`: turns `rule_result` into `{decision, reason}`.
pub fn make_decision(input: &TaskInput<'_>) -> TaskResult {
    let rules = input.context.require_object("rule_result")?;

    let decision = Decision::from_rules(
        require_bool(rules, "age_pass")?,
        require_bool(rules, "income_pass")?,
        require_bool(rules, "income_near_limit")?,
    );

    Ok(json!({
        "decision": decision.as_str(),
        "reason": decision.reason(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Context;
    use serde_json::Value;

    fn decide(rule_result: Value) -> Result<Value, TaskError> {
        let mut context = Context::new();
        context.insert("rule_result".to_string(), rule_result);
        make_decision(&TaskInput::new("i", &context, None))
    }

    #[test]
    fn test_eligible() {
        let out = decide(json!({
            "age_pass": true,
            "income_pass": true,
            "income_near_limit": false
        }))
        .unwrap();
        assert_eq!(out["decision"], json!("ELIGIBLE"));
        assert_eq!(out["reason"], json!("All eligibility criteria satisfied"));
    }

    #[test]
    fn test_near_limit_needs_review() {
        let out = decide(json!({
            "age_pass": false,
            "income_pass": true,
            "income_near_limit": true
        }))
        .unwrap();
        assert_eq!(out["decision"], json!("NEEDS_REVIEW"));
    }

    #[test]
    fn test_not_eligible() {
        let out = decide(json!({
            "age_pass": true,
            "income_pass": false,
            "income_near_limit": false
        }))
        .unwrap();
        assert_eq!(out["decision"], json!("NOT_ELIGIBLE"));
    }

    #[test]
    fn test_missing_rule_result() {
        let err = make_decision(&TaskInput::new("i", &Context::new(), None)).unwrap_err();
        assert!(matches!(err, TaskError::MissingKey(_)));
    }

    #[test]
    fn test_decision_serialization() {
        assert_eq!(serde_json::to_value(Decision::NotEligible).unwrap(), json!("NOT_ELIGIBLE"));
        assert_eq!(Decision::NeedsReview.to_string(), "NEEDS_REVIEW");
    }
}
