//! Subprocess-backed implementations of the capability traits.
//!
//! - [`ProcessEvaluator`]: runs the plan's evaluator script against a candidate
//! - [`CommandImplementer`]: asks an external command for a candidate over JSON stdio

pub mod command_implementer;
pub mod process_evaluator;

pub use command_implementer::{extract_code, CommandImplementer};
pub use process_evaluator::{EvaluatorScript, ProcessEvaluator};
