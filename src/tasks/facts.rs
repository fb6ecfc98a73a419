//! Synthetic Domain Facts
//!
//! Stand-ins for the citizen registry and the scheme rulebook. Citizens are
//! generated deterministically from their id so repeated lookups agree.

use std::collections::HashMap;

use log::debug;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;
use crate::execution::{TaskInput, TaskResult};
use crate::workflow::ContextExt;

/// Citizen attributes an appeal may override.
pub const OVERRIDABLE_FIELDS: [&str; 3] = ["age", "income", "category"];

const CATEGORIES: [&str; 4] = ["general", "sc", "st", "obc"];

/// Eligibility limits of a scheme.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SchemeRules {
    pub min_age: u32,
    pub max_age: u32,
    pub max_income: u64,
}

/// Known schemes, keyed by name.
pub static SCHEMES: Lazy<HashMap<&'static str, SchemeRules>> = Lazy::new(|| {
    HashMap::from([
        (
            "scheme_alpha",
            SchemeRules {
                min_age: 18,
                max_age: 60,
                max_income: 250_000,
            },
        ),
        (
            "scheme_beta",
            SchemeRules {
                min_age: 21,
                max_age: 55,
                max_income: 180_000,
            },
        ),
        (
            "scheme_gamma",
            SchemeRules {
                min_age: 60,
                max_age: 99,
                max_income: 120_000,
            },
        ),
    ])
});

/// Generated citizen record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Citizen {
    pub name: String,
    pub age: u32,
    pub income: u64,
    pub category: String,
}

/// 64-bit FNV-1a of the id bytes. Fixed across toolchains, unlike
/// `DefaultHasher`.
fn citizen_seed(citizen_id: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    citizen_id.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

/// Builds the citizen for `citizen_id`; the same id always yields the same
/// citizen for a given `rand` version.
pub fn generate_citizen(citizen_id: &str) -> Citizen {
    let mut rng = StdRng::seed_from_u64(citizen_seed(citizen_id));

    Citizen {
        name: format!("Citizen_{}", citizen_id),
        age: rng.gen_range(18..=80),
        income: rng.gen_range(50_000..=300_000),
        category: CATEGORIES
            .choose(&mut rng)
            .copied()
            .unwrap_or("general")
            .to_string(),
    }
}

/// Looks up a scheme by name.
pub fn scheme_rules(scheme_name: &str) -> Result<SchemeRules, TaskError> {
    SCHEMES
        .get(scheme_name)
        .copied()
        .ok_or_else(|| TaskError::UnknownScheme(scheme_name.to_string()))
}

/// `mock_db_lookup`: fetches the citizen named by `citizen_id`.
///
/// Any of `age`, `income` or `category` present in the context replaces the
/// generated value.
pub fn fetch_citizen(input: &TaskInput<'_>) -> TaskResult {
    let citizen_id = input.context.require_str("citizen_id")?;

    let mut citizen = match serde_json::to_value(generate_citizen(citizen_id)) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(TaskError::Failed("citizen did not serialize to an object".into())),
        Err(e) => return Err(TaskError::Failed(e.to_string())),
    };

    for field in OVERRIDABLE_FIELDS {
        if let Some(value) = input.context.get(field) {
            debug!("Citizen {}: overriding '{}' with {}", citizen_id, field, value);
            citizen.insert(field.to_string(), value.clone());
        }
    }

    Ok(Value::Object(citizen))
}

/// `mock_doc_lookup`: fetches the rules of the scheme named by `scheme_name`.
pub fn fetch_scheme_rules(input: &TaskInput<'_>) -> TaskResult {
    let scheme_name = input.context.require_str("scheme_name")?;
    let rules = scheme_rules(scheme_name)?;
    serde_json::to_value(rules).map_err(|e| TaskError::Failed(e.to_string()))
}
