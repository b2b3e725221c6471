//! Tournament artifacts and human-readable summaries.
//!
//! A finished tournament is persisted as `<dir>/<tournament_id>/tournament.json`
//! next to a `tournament.digest` holding the SHA-256 of the JSON bytes.
//! Reading verifies the digest before deserializing.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::domain::{FleetError, Plan, Result, TournamentResult};

const ARTIFACT_FILE: &str = "tournament.json";
const DIGEST_FILE: &str = "tournament.digest";

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write `<dir>/<tournament_id>/tournament.json` and its digest.
pub fn write_tournament_artifact(result: &TournamentResult, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(result.tournament_id.to_string());
    std::fs::create_dir_all(&run_dir)?;

    let artifact_path = run_dir.join(ARTIFACT_FILE);
    let json = serde_json::to_vec_pretty(result)?;
    std::fs::write(&artifact_path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), sha256_hex(&json))?;

    Ok(artifact_path)
}

/// Read and verify a tournament artifact.
pub fn read_tournament_artifact(tournament_id: &str, dir: &Path) -> Result<TournamentResult> {
    let run_dir = dir.join(tournament_id);
    let json = std::fs::read(run_dir.join(ARTIFACT_FILE))?;
    let expected = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?;
    let actual = sha256_hex(&json);
    if expected.trim() != actual {
        return Err(FleetError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}

/// Write the winner's final code to `path`. Returns `false` when there is no
/// winner.
pub fn save_winner(result: &TournamentResult, path: &Path) -> Result<bool> {
    let Some(winner) = result.winner() else {
        return Ok(false);
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &winner.final_code)?;
    Ok(true)
}

fn medal(rank: usize) -> String {
    match rank {
        1 => "🥇".to_string(),
        2 => "🥈".to_string(),
        3 => "🥉".to_string(),
        n => format!("{n}."),
    }
}

/// Markdown overview of a plan.
pub fn render_plan_md(plan: &Plan) -> String {
    let mut out = String::new();
    out.push_str("# Evaluation Plan\n\n");
    let _ = writeln!(out, "## Task\n{}\n", plan.resolved_task());
    let _ = writeln!(out, "## Interface\n```\n{}\n```\n", plan.interface_contract());

    out.push_str("## Tests\n");
    for test in plan.tests() {
        let _ = writeln!(out, "- `{}` ({})", test.name, test.category);
    }
    out.push('\n');

    if !plan.metrics().is_empty() {
        out.push_str("## Metrics\n");
        for metric in plan.metrics() {
            let _ = writeln!(out, "- {metric}");
        }
        out.push('\n');
    }

    out.push_str("## Weights\n");
    for (category, weight) in plan.weights() {
        let _ = writeln!(out, "- {category}: {weight}%");
    }
    out
}

/// Markdown summary: ranking table, winner and per-approach decision trails.
pub fn render_summary_md(result: &TournamentResult) -> String {
    let mut out = String::new();
    out.push_str("# Tournament Results\n\n");
    let _ = writeln!(out, "- tournament: `{}`", result.tournament_id);
    let _ = writeln!(out, "- completed: {}\n", result.completed_at.to_rfc3339());

    out.push_str("| Rank | Approach | Status | Score | Iterations | Decisions |\n");
    out.push_str("|------|----------|--------|------:|-----------:|----------:|\n");
    for (i, r) in result.results().iter().enumerate() {
        let status = if r.success { "PASS" } else { "FAIL" };
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:.1} | {} | {} |",
            medal(i + 1),
            r.approach,
            status,
            r.score,
            r.iteration_count(),
            r.decision_count()
        );
    }
    out.push('\n');

    match result.winner() {
        Some(winner) => {
            let _ = writeln!(
                out,
                "## Winner: {} ({:.1}/100)\n",
                winner.approach, winner.score
            );
            for (metric, value) in &winner.metrics {
                let _ = writeln!(out, "- {metric}: {value:.2}");
            }
            out.push('\n');
        }
        None => out.push_str("## No winner\n\n"),
    }

    for r in result.results() {
        let _ = writeln!(out, "## {}\n", r.approach);
        let _ = writeln!(out, "Outcome: {}\n", r.termination);
        if let Some(branch) = &r.branch {
            let _ = writeln!(out, "Branch: `{branch}`\n");
        }
        if let Some(last) = r.final_iteration() {
            if !last.error_messages.is_empty() {
                out.push_str("Failures in final attempt:\n");
                for message in &last.error_messages {
                    let _ = writeln!(out, "- {message}");
                }
                out.push('\n');
            }
        }
        if r.decision_trail.is_empty() {
            out.push_str("No decisions recorded.\n\n");
            continue;
        }
        let _ = writeln!(
            out,
            "{} decision(s), {} blocking:\n",
            r.decision_count(),
            r.blocking_decisions().count()
        );
        for d in &r.decision_trail {
            let mode = if d.blocking { "BLOCKING" } else { "SPECULATIVE" };
            let _ = writeln!(out, "{}. **{}** [{mode}]", d.sequence, d.question);
            let _ = writeln!(out, "   - options: {}", d.options.join(", "));
            let _ = writeln!(out, "   - chosen: {}", d.chosen);
            if !d.reasoning.is_empty() {
                let _ = writeln!(out, "   - reasoning: {}", d.reasoning);
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::domain::{AgentResult, Decision, Iteration, PlanFields, TestSpec, Termination};

    fn plan() -> Plan {
        Plan::new(PlanFields {
            resolved_task: "Implement a rate limiter".to_string(),
            interface_contract: "class RateLimiter: ...".to_string(),
            tests: vec![
                TestSpec::new("test_basic", "correctness"),
                TestSpec::new("test_loc", "simplicity"),
            ],
            metrics: ["correctness_score".to_string()].into_iter().collect(),
            weights: [("correctness".to_string(), 70.0), ("simplicity".to_string(), 30.0)]
                .into_iter()
                .collect(),
            evaluator_spec: serde_json::Value::Null,
        })
        .unwrap()
    }

    fn result(approach: &str, success: bool, score: f64) -> AgentResult {
        AgentResult {
            approach: approach.to_string(),
            success,
            iterations: vec![Iteration {
                attempt: 1,
                tests_passed: 1,
                tests_failed: u32::from(!success),
                decisions_made: vec![1],
                error_messages: if success { vec![] } else { vec!["test_loc: too long".to_string()] },
                metrics: BTreeMap::new(),
                evaluator_success: success,
                code_snapshot: None,
            }],
            decision_trail: vec![Decision {
                question: "Per-user or global?".to_string(),
                options: vec!["per-user".to_string(), "global".to_string()],
                chosen: "per-user".to_string(),
                reasoning: "user_id in signature".to_string(),
                blocking: false,
                sequence: 1,
                timestamp: Utc::now(),
            }],
            metrics: [("correctness_score".to_string(), 0.9)].into_iter().collect(),
            final_code: format!("# {approach}\n"),
            score,
            termination: if success {
                Termination::Passed
            } else {
                Termination::IterationBudgetExhausted
            },
            workspace: None,
            branch: Some("agentfleet/x".to_string()),
        }
    }

    fn tournament() -> TournamentResult {
        TournamentResult::new(
            plan(),
            vec![result("Sliding window", false, 12.0), result("Token bucket", true, 93.0)],
        )
    }

    #[test]
    fn test_artifact_roundtrip_with_digest() {
        let dir = tempfile::tempdir().unwrap();
        let tr = tournament();
        let path = write_tournament_artifact(&tr, dir.path()).unwrap();
        assert!(path.ends_with("tournament.json"));

        let loaded = read_tournament_artifact(&tr.tournament_id.to_string(), dir.path()).unwrap();
        assert_eq!(loaded, tr);
    }

    #[test]
    fn test_tampered_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tr = tournament();
        let path = write_tournament_artifact(&tr, dir.path()).unwrap();

        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("Token bucket", "Token bucket!");
        std::fs::write(&path, tampered).unwrap();

        let err = read_tournament_artifact(&tr.tournament_id.to_string(), dir.path()).unwrap_err();
        assert!(matches!(err, FleetError::DigestMismatch { .. }));
    }

    #[test]
    fn test_summary_lists_ranking_and_trail() {
        let md = render_summary_md(&tournament());
        let token = md.find("| 🥇 | Token bucket | PASS | 93.0 |").unwrap();
        let sliding = md.find("| 🥈 | Sliding window | FAIL | 12.0 |").unwrap();
        assert!(token < sliding);
        assert!(md.contains("## Winner: Token bucket (93.0/100)"));
        assert!(md.contains("1. **Per-user or global?** [SPECULATIVE]"));
        assert!(md.contains("- test_loc: too long"));
        assert!(md.contains("Outcome: iteration budget exhausted"));
        assert!(md.contains("1 decision(s), 0 blocking:"));
    }

    #[test]
    fn test_save_winner_writes_final_code() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out/solution.py");
        assert!(save_winner(&tournament(), &out).unwrap());
        assert_eq!(std::fs::read_to_string(out).unwrap(), "# Token bucket\n");

        let empty = TournamentResult::new(plan(), vec![]);
        assert!(!save_winner(&empty, &dir.path().join("none.py")).unwrap());
    }

    #[test]
    fn test_plan_md_lists_weights() {
        let md = render_plan_md(&plan());
        assert!(md.contains("- `test_basic` (correctness)"));
        assert!(md.contains("- correctness: 70%"));
        assert!(md.contains("- simplicity: 30%"));
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
