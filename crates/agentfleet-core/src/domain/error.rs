//! Domain-level error taxonomy for AgentFleet.

/// Reasons a [`Plan`](super::plan::Plan) is rejected before any loop starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanValidationError {
    #[error("weights must sum to 100, got {total}")]
    WeightsDoNotSum { total: f64 },

    #[error("weight for category {category} must be a non-negative number, got {weight}")]
    InvalidWeight { category: String, weight: f64 },

    #[error("category {category} carries weight but has no tests")]
    MissingTests { category: String },

    #[error("duplicate test name: {name}")]
    DuplicateTest { name: String },

    #[error("plan must define at least one test")]
    NoTests,
}

/// AgentFleet domain errors.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("plan validation error: {0}")]
    PlanValidation(#[from] PlanValidationError),

    #[error("invalid approaches: {0}")]
    InvalidApproaches(String),

    #[error("invalid tournament config: {0}")]
    InvalidConfig(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for AgentFleet domain operations.
pub type Result<T> = std::result::Result<T, FleetError>;
