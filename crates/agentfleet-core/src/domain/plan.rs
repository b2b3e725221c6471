//! The evaluation contract shared by every approach in a tournament.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::error::PlanValidationError;

/// Allowed drift when checking that category weights sum to 100.
pub const WEIGHT_TOLERANCE: f64 = 0.01;

/// The category whose contribution is withheld from failed approaches.
pub const CORRECTNESS_CATEGORY: &str = "correctness";

fn default_test_weight() -> f64 {
    1.0
}

/// A single hidden test declared by the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    /// Test identifier, unique within the plan.
    pub name: String,

    /// Scoring category this test belongs to (e.g. `correctness`).
    pub category: String,

    /// Relative weight within its category.
    #[serde(default = "default_test_weight")]
    pub weight: f64,
}

impl TestSpec {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            weight: default_test_weight(),
        }
    }
}

/// Raw plan fields as produced by the planner, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFields {
    pub resolved_task: String,
    pub interface_contract: String,
    pub tests: Vec<TestSpec>,
    #[serde(default)]
    pub metrics: BTreeSet<String>,
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub evaluator_spec: serde_json::Value,
}

/// Immutable evaluation contract.
///
/// Constructed only through [`Plan::new`] (or deserialization, which routes
/// through the same validation), so every `Plan` in circulation satisfies:
/// - every weight is finite and non-negative, and the weights sum to 100;
/// - every category with a non-zero weight has at least one test;
/// - test names are unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlanFields", into = "PlanFields")]
pub struct Plan {
    resolved_task: String,
    interface_contract: String,
    tests: Vec<TestSpec>,
    metrics: BTreeSet<String>,
    weights: BTreeMap<String, f64>,
    evaluator_spec: serde_json::Value,
}

impl Plan {
    /// Validate `fields` and freeze them into a plan.
    pub fn new(fields: PlanFields) -> Result<Self, PlanValidationError> {
        if fields.tests.is_empty() {
            return Err(PlanValidationError::NoTests);
        }

        for (category, weight) in &fields.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(PlanValidationError::InvalidWeight {
                    category: category.clone(),
                    weight: *weight,
                });
            }
        }

        let total: f64 = fields.weights.values().sum();
        if (total - 100.0).abs() > WEIGHT_TOLERANCE {
            return Err(PlanValidationError::WeightsDoNotSum { total });
        }

        let mut names = HashSet::new();
        for test in &fields.tests {
            if !names.insert(test.name.as_str()) {
                return Err(PlanValidationError::DuplicateTest {
                    name: test.name.clone(),
                });
            }
        }

        for (category, weight) in &fields.weights {
            if *weight > 0.0 && !fields.tests.iter().any(|t| &t.category == category) {
                return Err(PlanValidationError::MissingTests {
                    category: category.clone(),
                });
            }
        }

        Ok(Self {
            resolved_task: fields.resolved_task,
            interface_contract: fields.interface_contract,
            tests: fields.tests,
            metrics: fields.metrics,
            weights: fields.weights,
            evaluator_spec: fields.evaluator_spec,
        })
    }

    pub fn resolved_task(&self) -> &str {
        &self.resolved_task
    }

    pub fn interface_contract(&self) -> &str {
        &self.interface_contract
    }

    pub fn tests(&self) -> &[TestSpec] {
        &self.tests
    }

    /// Metric names the evaluator is expected to report.
    pub fn metrics(&self) -> &BTreeSet<String> {
        &self.metrics
    }

    /// Category weights as percentages summing to 100.
    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    /// Opaque evaluator configuration (script source, interpreter hints, ...).
    pub fn evaluator_spec(&self) -> &serde_json::Value {
        &self.evaluator_spec
    }

    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Weight for `category`, or 0 when the plan does not weigh it.
    pub fn category_weight(&self, category: &str) -> f64 {
        self.weights.get(category).copied().unwrap_or(0.0)
    }
}

impl TryFrom<PlanFields> for Plan {
    type Error = PlanValidationError;

    fn try_from(fields: PlanFields) -> Result<Self, Self::Error> {
        Plan::new(fields)
    }
}

impl From<Plan> for PlanFields {
    fn from(plan: Plan) -> Self {
        PlanFields {
            resolved_task: plan.resolved_task,
            interface_contract: plan.interface_contract,
            tests: plan.tests,
            metrics: plan.metrics,
            weights: plan.weights,
            evaluator_spec: plan.evaluator_spec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(weights: &[(&str, f64)]) -> PlanFields {
        PlanFields {
            resolved_task: "Implement a per-user rate limiter".to_string(),
            interface_contract: "class RateLimiter:\n    def allow(self, user_id: str) -> bool".to_string(),
            tests: vec![
                TestSpec::new("test_basic", "correctness"),
                TestSpec::new("test_loc", "simplicity"),
                TestSpec::new("test_throughput", "performance"),
            ],
            metrics: ["correctness_score", "simplicity_score", "performance_score"]
                .into_iter()
                .map(String::from)
                .collect(),
            weights: weights
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            evaluator_spec: serde_json::json!({ "script": "print('{}')" }),
        }
    }

    #[test]
    fn test_valid_plan() {
        let plan = Plan::new(fields(&[
            ("correctness", 60.0),
            ("simplicity", 25.0),
            ("performance", 15.0),
        ]))
        .unwrap();

        assert_eq!(plan.test_count(), 3);
        assert_eq!(plan.category_weight("correctness"), 60.0);
        assert_eq!(plan.category_weight("edge_cases"), 0.0);
    }

    #[test]
    fn test_weights_must_sum_to_100() {
        let err = Plan::new(fields(&[("correctness", 60.0), ("simplicity", 30.0)])).unwrap_err();
        assert!(matches!(err, PlanValidationError::WeightsDoNotSum { .. }));
    }

    #[test]
    fn test_weights_within_tolerance_accepted() {
        let plan = Plan::new(fields(&[
            ("correctness", 33.333),
            ("simplicity", 33.333),
            ("performance", 33.334),
        ]));
        assert!(plan.is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = Plan::new(fields(&[("correctness", 110.0), ("simplicity", -10.0)])).unwrap_err();
        assert!(matches!(err, PlanValidationError::InvalidWeight { .. }));
    }

    #[test]
    fn test_weighted_category_without_tests_rejected() {
        let err = Plan::new(fields(&[("correctness", 70.0), ("security", 30.0)])).unwrap_err();
        assert_eq!(
            err,
            PlanValidationError::MissingTests {
                category: "security".to_string()
            }
        );
    }

    #[test]
    fn test_zero_weight_category_needs_no_tests() {
        let plan = Plan::new(fields(&[("correctness", 100.0), ("security", 0.0)]));
        assert!(plan.is_ok());
    }

    #[test]
    fn test_duplicate_test_names_rejected() {
        let mut f = fields(&[("correctness", 100.0)]);
        f.tests.push(TestSpec::new("test_basic", "correctness"));
        let err = Plan::new(f).unwrap_err();
        assert!(matches!(err, PlanValidationError::DuplicateTest { .. }));
    }

    #[test]
    fn test_deserialize_runs_validation() {
        let json = serde_json::json!({
            "resolved_task": "t",
            "interface_contract": "c",
            "tests": [{ "name": "a", "category": "correctness" }],
            "weights": { "correctness": 50.0 }
        });
        let result: Result<Plan, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_plan_serde_roundtrip() {
        let plan = Plan::new(fields(&[("correctness", 100.0)])).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, back);
    }
}
