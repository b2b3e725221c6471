//! Deterministic weighted scoring and ranking.
//!
//! Weights are percentages summing to 100 and metrics are fractions in
//! `[0, 1]`, so a perfect approach scores 100. Category `c` reads the metric
//! named `c_score`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::{AgentResult, Plan, CORRECTNESS_CATEGORY};

/// Multiplier applied to the non-correctness categories of a failed approach.
pub const FAILURE_PENALTY: f64 = 0.5;

/// Metric consulted for category `category`.
pub fn metric_name(category: &str) -> String {
    format!("{category}_score")
}

fn metric_value(metrics: &BTreeMap<String, f64>, category: &str) -> f64 {
    metrics
        .get(&metric_name(category))
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Weighted score of one result, clamped to `[0, 100]`.
///
/// A failed approach earns nothing for correctness and half credit for every
/// other category. Missing or non-finite metrics count as zero.
pub fn score(result: &AgentResult, weights: &BTreeMap<String, f64>) -> f64 {
    let total: f64 = weights
        .iter()
        .filter(|(category, _)| result.success || category.as_str() != CORRECTNESS_CATEGORY)
        .map(|(category, weight)| weight * metric_value(&result.metrics, category))
        .sum();

    let total = if result.success {
        total
    } else {
        FAILURE_PENALTY * total
    };
    if total.is_nan() {
        0.0
    } else {
        total.clamp(0.0, 100.0)
    }
}

/// Fill in `score` for every result against the plan's weights.
pub fn score_all(results: &mut [AgentResult], plan: &Plan) {
    for result in results.iter_mut() {
        result.score = score(result, plan.weights());
    }
}

/// Total order used for ranking: score descending, then approach ascending.
pub fn compare(a: &AgentResult, b: &AgentResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.approach.cmp(&b.approach))
}

/// Sort results into rank order.
pub fn rank(results: &mut [AgentResult]) {
    results.sort_by(compare);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Termination;

    fn weights() -> BTreeMap<String, f64> {
        [
            ("correctness".to_string(), 60.0),
            ("simplicity".to_string(), 25.0),
            ("performance".to_string(), 15.0),
        ]
        .into_iter()
        .collect()
    }

    fn result(approach: &str, success: bool, metrics: &[(&str, f64)]) -> AgentResult {
        AgentResult {
            approach: approach.to_string(),
            success,
            iterations: vec![],
            decision_trail: vec![],
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            final_code: String::new(),
            score: 0.0,
            termination: if success {
                Termination::Passed
            } else {
                Termination::IterationBudgetExhausted
            },
            workspace: None,
            branch: None,
        }
    }

    const METRICS: &[(&str, f64)] = &[
        ("correctness_score", 0.8),
        ("simplicity_score", 0.9),
        ("performance_score", 0.7),
    ];

    #[test]
    fn test_successful_score() {
        let s = score(&result("A", true, METRICS), &weights());
        assert!((s - 81.0).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn test_failed_score_is_penalized() {
        let s = score(&result("A", false, METRICS), &weights());
        assert!((s - 16.5).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn test_missing_and_non_finite_metrics_count_as_zero() {
        let r = result(
            "A",
            true,
            &[("correctness_score", 1.0), ("simplicity_score", f64::NAN)],
        );
        assert!((score(&r, &weights()) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_clamped() {
        let high = result("A", true, &[("correctness_score", 5.0)]);
        assert_eq!(score(&high, &weights()), 100.0);
        let low = result("A", true, &[("correctness_score", -1.0)]);
        assert_eq!(score(&low, &weights()), 0.0);
    }

    #[test]
    fn test_overflowing_metrics_stay_in_range() {
        let r = result(
            "A",
            true,
            &[("correctness_score", f64::MAX), ("simplicity_score", -f64::MAX)],
        );
        assert_eq!(score(&r, &weights()), 0.0);

        let r = result("A", true, &[("correctness_score", f64::MAX)]);
        assert_eq!(score(&r, &weights()), 100.0);
    }

    #[test]
    fn test_rank_breaks_ties_alphabetically() {
        let mut results = vec![
            result("Beta", true, &[]),
            result("Gamma", true, &[]),
            result("Alpha", true, &[]),
        ];
        results[0].score = 80.0;
        results[1].score = 95.0;
        results[2].score = 80.0;

        rank(&mut results);
        let order: Vec<&str> = results.iter().map(|r| r.approach.as_str()).collect();
        assert_eq!(order, vec!["Gamma", "Alpha", "Beta"]);
    }
}
