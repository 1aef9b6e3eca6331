//! Error types for the codemod runner.
//!
//! Two error families exist:
//!
//! - [`TransformError`]: everything that can go wrong while reconciling one
//!   file. These are fatal for that file only; the orchestrator captures them
//!   into the file's outcome and keeps going.
//! - [`RunError`]: failures that abort the whole run (codemod failed to load,
//!   `postProcess` raised, a worker task panicked).
//!
//! Every `TransformError` carries a [`Phase`] tag naming the pipeline stage
//! that failed and a human-actionable [`suggestion`](TransformError::suggestion),
//! so a caller rendering errors can tell a codemod bug from a runner bug.

use std::fmt;

use thiserror::Error;

/// Boxed error type used at the codemod trait boundary.
///
/// Codemods are user-supplied and raise their own error types; they cross
/// into the runner as boxed trait objects and are wrapped, never swallowed.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ============================================================================
// Pipeline Phases
// ============================================================================

/// The stage of the single-file pipeline an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The codemod's direct `transform` raised.
    Transform,
    /// The codemod's plugin factory raised.
    GetPlugin,
    /// The acquired visitor raised while walking the tree.
    PluginExecution,
    /// The toolkit failed to parse the file.
    Parse,
    /// The print stage failed or produced nothing.
    Print,
    /// The codemod's `parse_args` rejected the passthrough argument string.
    Args,
    /// Reading or writing the file itself failed.
    FileIo,
}

impl Phase {
    /// Stable string form used in reports and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Transform => "codemod.transform()",
            Phase::GetPlugin => "codemod.getPlugin()",
            Phase::PluginExecution => "codemod plugin execution",
            Phase::Parse => "parse",
            Phase::Print => "print",
            Phase::Args => "codemod.parseArgs()",
            Phase::FileIo => "file io",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Per-File Errors
// ============================================================================

/// Errors local to one file's reconciliation.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The codemod fired the change signal without arming it first.
    #[error("change-signal protocol violation: {message}")]
    Protocol { message: String },

    /// The codemod itself raised, in the tagged phase.
    #[error("codemod failed in {phase}: {source}")]
    Codemod {
        phase: Phase,
        #[source]
        source: DynError,
    },

    /// The toolkit could not parse the file.
    #[error("parse failed: {source}")]
    Parse {
        #[source]
        source: DynError,
    },

    /// The print stage yielded no result for a non-empty input. A bug in the
    /// toolkit or the runner, not in the codemod.
    #[error("print stage produced no output: {detail}")]
    Print { detail: String },

    /// `parse_args` rejected the raw passthrough argument string.
    #[error("argument parsing failed: {source}")]
    Args {
        #[source]
        source: DynError,
    },

    /// Reading or writing the file failed.
    #[error("file io failed: {source}")]
    FileIo {
        #[source]
        source: std::io::Error,
    },
}

impl TransformError {
    /// Wrap a codemod-raised error with its pipeline phase.
    pub fn codemod(phase: Phase, source: DynError) -> Self {
        TransformError::Codemod { phase, source }
    }

    /// Build the fire-before-arm protocol violation.
    pub fn fire_before_arm() -> Self {
        TransformError::Protocol {
            message: "the change signal was fired without a prior arm call".to_string(),
        }
    }

    /// The pipeline stage this error is attributed to.
    pub fn phase(&self) -> Phase {
        match self {
            TransformError::Protocol { .. } => Phase::PluginExecution,
            TransformError::Codemod { phase, .. } => *phase,
            TransformError::Parse { .. } => Phase::Parse,
            TransformError::Print { .. } => Phase::Print,
            TransformError::Args { .. } => Phase::Args,
            TransformError::FileIo { .. } => Phase::FileIo,
        }
    }

    /// A human-actionable hint rendered next to the error message.
    pub fn suggestion(&self) -> &'static str {
        match self {
            TransformError::Protocol { .. } => {
                "call the arm hook when the plugin is acquired, before firing the change signal"
            }
            TransformError::Codemod {
                phase: Phase::Transform,
                ..
            } => "the error was raised by the codemod's transform(); debug the codemod, not the runner",
            TransformError::Codemod {
                phase: Phase::GetPlugin,
                ..
            } => "the codemod's plugin factory raised; check its getPlugin() implementation",
            TransformError::Codemod { .. } => {
                "the codemod's visitor raised while walking this file's tree; try running it on this file alone"
            }
            TransformError::Parse { .. } => {
                "the file may use syntax the toolkit does not recognize; adjust parse options or add the file to the codemod's ignore patterns"
            }
            TransformError::Print { .. } => {
                "this indicates a toolkit or runner bug; retry with format-preserving printing disabled"
            }
            TransformError::Args { .. } => {
                "check the passthrough argument string against what the codemod's parseArgs() accepts"
            }
            TransformError::FileIo { .. } => "check that the file exists and is readable and writable",
        }
    }
}

// ============================================================================
// Run-Level Errors
// ============================================================================

/// Failures that abort the whole run rather than a single file.
#[derive(Debug, Error)]
pub enum RunError {
    /// The codemod module could not be constructed at all.
    #[error("failed to load codemod: {source}")]
    CodemodLoad {
        #[source]
        source: DynError,
    },

    /// A pattern in the codemod's `ignore` list does not compile.
    #[error("invalid ignore pattern '{pattern}': {source}")]
    InvalidIgnorePattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// The coordinator's up-front `parse_args` validation failed.
    #[error("codemod rejected the argument string: {source}")]
    InvalidArguments {
        #[source]
        source: DynError,
    },

    /// `post_process` raised after all files settled. There is no
    /// partial-success notion at that point, so this fails the run.
    #[error("postProcess failed: {source}")]
    PostProcess {
        #[source]
        source: DynError,
    },

    /// A worker task panicked instead of returning outcomes.
    #[error("worker task panicked: {message}")]
    WorkerPanic { message: String },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod phase_display {
        use super::*;

        #[test]
        fn transform_phase_matches_reported_stage_name() {
            assert_eq!(Phase::Transform.to_string(), "codemod.transform()");
        }

        #[test]
        fn plugin_execution_phase_matches_reported_stage_name() {
            assert_eq!(
                Phase::PluginExecution.to_string(),
                "codemod plugin execution"
            );
        }

        #[test]
        fn get_plugin_phase_matches_reported_stage_name() {
            assert_eq!(Phase::GetPlugin.to_string(), "codemod.getPlugin()");
        }
    }

    mod transform_error {
        use super::*;

        fn boxed(msg: &str) -> DynError {
            Box::new(std::io::Error::other(msg.to_string()))
        }

        #[test]
        fn codemod_error_carries_its_phase() {
            let err = TransformError::codemod(Phase::Transform, boxed("boom"));
            assert_eq!(err.phase(), Phase::Transform);
            assert!(err.to_string().contains("codemod.transform()"));
            assert!(err.to_string().contains("boom"));
        }

        #[test]
        fn protocol_violation_is_attributed_to_plugin_execution() {
            let err = TransformError::fire_before_arm();
            assert_eq!(err.phase(), Phase::PluginExecution);
            assert!(err.suggestion().contains("arm"));
        }

        #[test]
        fn every_variant_has_a_nonempty_suggestion() {
            let errors = vec![
                TransformError::fire_before_arm(),
                TransformError::codemod(Phase::GetPlugin, boxed("x")),
                TransformError::codemod(Phase::PluginExecution, boxed("x")),
                TransformError::Parse { source: boxed("x") },
                TransformError::Print {
                    detail: "empty".to_string(),
                },
                TransformError::Args { source: boxed("x") },
                TransformError::FileIo {
                    source: std::io::Error::other("x"),
                },
            ];
            for err in errors {
                assert!(!err.suggestion().is_empty(), "{err} lacks a suggestion");
            }
        }
    }
}
