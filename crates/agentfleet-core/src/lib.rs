//! AgentFleet Core Library
//!
//! Runs several independent "approach" workers against one blind evaluation
//! plan, iterates each toward a passing state, records the interpretive
//! decisions they make and ranks them with a deterministic weighted score.
//!
//! The pieces, bottom-up:
//! - [`domain`]: plan, decisions, iterations and results
//! - [`ledger`]: append-only per-approach decision history
//! - [`attention`]: the shared FIFO of blocking decisions
//! - [`agent_loop`]: one approach's draft/evaluate state machine
//! - [`tournament`]: concurrent fan-out, fan-in and ranking
//! - [`scoring`]: the weighted score and total order

pub mod adapters;
pub mod agent_loop;
pub mod annotation;
pub mod attention;
pub mod capability;
pub mod config;
pub mod domain;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod scoring;
pub mod telemetry;
pub mod tournament;
pub mod workspace;

/// Crate version, shared by every workspace member.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use domain::{
    AgentResult, Decision, DecisionCandidate, FleetError, Iteration, Plan, PlanFields,
    PlanValidationError, Result, Termination, TestSpec, TournamentResult,
};

pub use adapters::{extract_code, CommandImplementer, EvaluatorScript, ProcessEvaluator};
pub use agent_loop::{AgentLoop, Collaborators, LoopPhase};
pub use annotation::{
    parse_annotations, AllSpeculative, AnnotatedClassification, AnnotationParser,
    ClassificationPolicy, JsonAnnotationParser, ParserChain, TaggedAnnotationParser,
};
pub use attention::{
    AcceptSuggestion, AttentionQueue, DecisionResolver, PendingDecision, ResolutionError,
    Suspension,
};
pub use capability::{
    CapabilityError, EvaluationReport, Evaluator, Implementer, ImplementerOutput,
    ImplementerRequest, TestOutcome,
};
pub use config::FleetConfig;
pub use events::{
    ChannelEventSink, EventSink, FleetEvent, MemoryEventSink, NullEventSink, TracingEventSink,
};
pub use ledger::{DecisionLedger, LedgerError};
pub use reporting::{
    read_tournament_artifact, render_plan_md, render_summary_md, save_winner,
    write_tournament_artifact,
};
pub use scoring::{rank, score, score_all};
pub use tournament::{Mode, Tournament, TournamentConfig};
pub use workspace::{
    resolve_repo, DirectoryWorkspaces, GitWorktreeWorkspaces, Workspace, WorkspaceError,
    WorkspaceProvider,
};
