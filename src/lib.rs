//! remod: batch codemod runner.
//!
//! Runs a user-supplied code transformation over a set of source files,
//! either by mutating a syntax tree through a pluggable AST toolkit or by
//! delegating to a remote text-completion model, and writes back only the
//! files whose output actually changed.
//!
//! The crate is four subsystems:
//!
//! - [`reconcile`]: the single-file transform pipeline, combining a
//!   format-preserving re-printer with a general AST-rewriting engine while
//!   detecting "no real change occurred".
//! - [`signal`]: the change-signal protocol a codemod uses to declare "I
//!   examined but did not change this file".
//! - [`pool`]: the bounded worker pool that fans a codemod out across many
//!   files, aggregates outcomes, and applies the write policy.
//! - [`limiter`]: the dual-budget sliding-window rate limiter throttling
//!   calls to an external completion API.
//!
//! Parsing and printing are not defined here; they arrive through the
//! [`toolkit::AstToolkit`] seam. Codemods arrive through the
//! [`codemod::Codemod`] contract and are loaded per worker via a
//! [`codemod::CodemodFactory`], so no codemod state is shared across files.

pub mod codemod;
pub mod error;
pub mod limiter;
pub mod pool;
pub mod reconcile;
pub mod signal;
pub mod toolkit;

// Reference toolkit and scripted codemods backing the test suite.
pub mod testkit;

pub use codemod::{
    Action, Codemod, CodemodFactory, CodemodOutcome, DirectOutput, DirectTransform, OutcomeKind,
    OutcomeReport, PluginFactory, PluginSpec, TransformPathway, TransformRequest,
};
pub use error::{DynError, Phase, RunError, TransformError};
pub use limiter::{Admission, CompletionUsage, RateLimiter, Work, WorkSource};
pub use pool::{Orchestrator, RunOptions, RunSummary};
pub use reconcile::{reconcile_source, Reconciled};
pub use signal::{ChangeSession, ChangeSignal, SignalResolution};
pub use toolkit::{AstToolkit, ParseOptions, TreeVisitor};
