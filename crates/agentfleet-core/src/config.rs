//! Runtime configuration, read from `AGENTFLEET_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::tournament::{Mode, TournamentConfig};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_EVAL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IMPLEMENTER_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_WORK_DIR: &str = "./work";
pub const DEFAULT_INTERPRETER: &str = "python3";

/// AgentFleet configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Iteration budget per approach (`AGENTFLEET_MAX_ITERATIONS`)
    pub max_iterations: u32,
    /// Global tournament timeout (`AGENTFLEET_TIMEOUT_SECS`, unset = none)
    pub timeout: Option<Duration>,
    /// Per-evaluation timeout (`AGENTFLEET_EVAL_TIMEOUT_SECS`)
    pub eval_timeout: Duration,
    /// Per-draft implementer timeout (`AGENTFLEET_IMPLEMENTER_TIMEOUT_SECS`)
    pub implementer_timeout: Duration,
    /// Root for workspaces, clones and artifacts (`AGENTFLEET_WORK_DIR`)
    pub work_dir: PathBuf,
    /// Interpreter used to run the evaluator script (`AGENTFLEET_EVALUATOR`)
    pub interpreter: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %value, "ignoring unparseable configuration value");
            default
        }),
        None => default,
    }
}

impl FleetConfig {
    /// Create a config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Build from an arbitrary key lookup; unset or unparseable values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_iterations = parse_or(
            "AGENTFLEET_MAX_ITERATIONS",
            lookup("AGENTFLEET_MAX_ITERATIONS"),
            DEFAULT_MAX_ITERATIONS,
        )
        .max(1);
        let timeout = lookup("AGENTFLEET_TIMEOUT_SECS")
            .and_then(|raw| match raw.trim().parse::<u64>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    warn!(key = "AGENTFLEET_TIMEOUT_SECS", value = %raw, "ignoring unparseable configuration value");
                    None
                }
            })
            .map(Duration::from_secs);
        let eval_timeout = parse_or(
            "AGENTFLEET_EVAL_TIMEOUT_SECS",
            lookup("AGENTFLEET_EVAL_TIMEOUT_SECS"),
            DEFAULT_EVAL_TIMEOUT_SECS,
        );
        let implementer_timeout = parse_or(
            "AGENTFLEET_IMPLEMENTER_TIMEOUT_SECS",
            lookup("AGENTFLEET_IMPLEMENTER_TIMEOUT_SECS"),
            DEFAULT_IMPLEMENTER_TIMEOUT_SECS,
        );

        Self {
            max_iterations,
            timeout,
            eval_timeout: Duration::from_secs(eval_timeout),
            implementer_timeout: Duration::from_secs(implementer_timeout),
            work_dir: lookup("AGENTFLEET_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR)),
            interpreter: lookup("AGENTFLEET_EVALUATOR")
                .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string()),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_eval_timeout(mut self, timeout: Duration) -> Self {
        self.eval_timeout = timeout;
        self
    }

    pub fn with_implementer_timeout(mut self, timeout: Duration) -> Self {
        self.implementer_timeout = timeout;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_interpreter(mut self, interpreter: &str) -> Self {
        self.interpreter = interpreter.to_string();
        self
    }

    /// Directory holding per-approach workspaces.
    pub fn agents_dir(&self) -> PathBuf {
        self.work_dir.join("agents")
    }

    /// Directory holding tournament artifacts.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.work_dir.join("tournaments")
    }

    pub fn tournament_config(&self, mode: Mode) -> TournamentConfig {
        TournamentConfig {
            max_iterations: self.max_iterations,
            mode,
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FleetConfig::from_lookup(lookup(&[]));
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.timeout, None);
        assert_eq!(config.eval_timeout, Duration::from_secs(30));
        assert_eq!(config.implementer_timeout, Duration::from_secs(300));
        assert_eq!(config.work_dir, PathBuf::from("./work"));
        assert_eq!(config.interpreter, "python3");
    }

    #[test]
    fn test_env_overrides() {
        let config = FleetConfig::from_lookup(lookup(&[
            ("AGENTFLEET_MAX_ITERATIONS", "4"),
            ("AGENTFLEET_TIMEOUT_SECS", "600"),
            ("AGENTFLEET_EVAL_TIMEOUT_SECS", " 12 "),
            ("AGENTFLEET_WORK_DIR", "/tmp/fleet"),
            ("AGENTFLEET_EVALUATOR", "python"),
        ]));
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.eval_timeout, Duration::from_secs(12));
        assert_eq!(config.artifacts_dir(), PathBuf::from("/tmp/fleet/tournaments"));
        assert_eq!(config.interpreter, "python");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = FleetConfig::from_lookup(lookup(&[
            ("AGENTFLEET_MAX_ITERATIONS", "lots"),
            ("AGENTFLEET_TIMEOUT_SECS", "soon"),
        ]));
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_tournament_config_projection() {
        let config = FleetConfig::from_lookup(lookup(&[]))
            .with_max_iterations(3)
            .with_timeout(Some(Duration::from_secs(5)));
        let tc = config.tournament_config(Mode::Interactive);
        assert_eq!(tc.max_iterations, 3);
        assert_eq!(tc.mode, Mode::Interactive);
        assert_eq!(tc.timeout, Some(Duration::from_secs(5)));
    }
}
