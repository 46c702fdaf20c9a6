//! Compile recorded browser demonstrations into executable automation plans.
//!
//! Demonstrations are [`Trajectory`] records whose subtasks hold free-text
//! action descriptions. [`build`] turns them into an ordered list of typed
//! [`IrNode`]s with fallback locators and parse diagnostics. The compiled plan
//! can be emitted as JSON or run through an [`AutomationDriver`] by the
//! [`Executor`].

pub mod builder;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod parser;
pub mod scrape;
pub mod selector;
pub mod session;
pub mod types;

pub use builder::{build, compile_trajectory};
pub use driver::{AutomationDriver, ResolvedTarget};
pub use executor::{ExecutionConfig, ExecutionReport, Executor, TrajectoryOutcome};
pub use parser::parse;
pub use selector::{SelectorCandidate, StrategyKind, synthesize};
pub use types::{
    Action, CompilationResult, IrNode, ParseDiagnostic, Position, Subtask, Trajectory,
    TrajectorySummary,
};
