//! The codemod contract and per-file outcome types.
//!
//! A codemod is a user-supplied unit of logic with one of two transform
//! capabilities, surfaced as a tagged [`TransformPathway`]:
//!
//! - **Direct**: a function from file text to new text (or nothing). Codemods
//!   backed by a remote completion model implement this pathway and schedule
//!   their calls through the rate limiter.
//! - **Visitor**: a plugin factory producing a tree visitor; the reconciler
//!   parses, walks, and re-prints on the codemod's behalf.
//!
//! Codemod instances are never shared across file-processing units: the
//! orchestrator builds one per worker through a [`CodemodFactory`], so
//! closures and parser caches inside a codemod cannot leak between files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{DynError, TransformError};
use crate::signal::ChangeSession;
use crate::toolkit::TreeVisitor;

// ============================================================================
// Requests
// ============================================================================

/// Immutable input to a single transform invocation.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// The file's original text.
    pub source: String,
    /// Absolute path of the file being transformed.
    pub file_path: PathBuf,
    /// The passthrough argument string, as structured by `parse_args`.
    pub command_line_args: Option<Value>,
}

/// What a direct transform hands back.
///
/// Covers both the bare-text and the `{code, meta}` return shapes.
#[derive(Debug, Clone)]
pub struct DirectOutput {
    pub code: String,
    pub meta: Option<Value>,
}

impl DirectOutput {
    pub fn code(code: impl Into<String>) -> Self {
        DirectOutput {
            code: code.into(),
            meta: None,
        }
    }

    pub fn with_meta(code: impl Into<String>, meta: Value) -> Self {
        DirectOutput {
            code: code.into(),
            meta: Some(meta),
        }
    }
}

// ============================================================================
// Transform Capabilities
// ============================================================================

/// The direct text-to-text capability.
#[async_trait]
pub trait DirectTransform: Send + Sync {
    /// Transform one file's text. `None` means "examined, produced nothing".
    async fn transform(&self, request: &TransformRequest) -> Result<Option<DirectOutput>, DynError>;
}

/// The visitor capability: a factory the reconciler calls once per file.
///
/// The factory receives the file's [`ChangeSession`] so it can arm the change
/// signal or attach metadata at acquisition time.
pub trait PluginFactory<T>: Send + Sync {
    fn get_plugin(&self, session: &mut ChangeSession) -> Result<PluginSpec<T>, DynError>;
}

/// The factory's return shape, resolved once at acquisition time.
pub enum PluginSpec<T> {
    /// A bare visitor; format-preserving printing stays on (the default).
    Plugin(Box<dyn TreeVisitor<T>>),
    /// A visitor plus an explicit printing choice. `format_preserving: false`
    /// opts into the mutation engine's plain pretty-printer, for inputs the
    /// re-printer handles badly.
    Configured {
        plugin: Box<dyn TreeVisitor<T>>,
        format_preserving: bool,
    },
}

impl<T> PluginSpec<T> {
    /// Split into the visitor and the effective printing mode.
    pub fn into_parts(self) -> (Box<dyn TreeVisitor<T>>, bool) {
        match self {
            PluginSpec::Plugin(plugin) => (plugin, true),
            PluginSpec::Configured {
                plugin,
                format_preserving,
            } => (plugin, format_preserving),
        }
    }
}

/// A codemod's transform capability, as a tagged variant.
pub enum TransformPathway<'a, T> {
    Direct(&'a dyn DirectTransform),
    Visitor(&'a dyn PluginFactory<T>),
}

// ============================================================================
// The Codemod Contract
// ============================================================================

/// A user-supplied code transformation, generic over the toolkit's tree.
#[async_trait]
pub trait Codemod<T>: Send + Sync {
    /// Identifier used in log fields.
    fn name(&self) -> &str {
        "codemod"
    }

    /// Which transform capability this codemod implements.
    fn pathway(&self) -> TransformPathway<'_, T>;

    /// Glob patterns excluding files from the run.
    fn ignore(&self) -> &[String] {
        &[]
    }

    /// Turn the raw passthrough argument string into a structured value.
    ///
    /// Invoked once by the coordinator (fail-fast validation) and once per
    /// file inside the worker. The default passes the raw string through.
    fn parse_args(&self, raw: Option<&str>) -> Result<Option<Value>, DynError> {
        Ok(raw.map(|s| Value::String(s.to_string())))
    }

    /// Invoked once after all files settle, with the modified paths and the
    /// accumulated per-file metadata.
    async fn post_process(
        &self,
        _modified: &[PathBuf],
        _meta: &BTreeMap<PathBuf, Value>,
    ) -> Result<(), DynError> {
        Ok(())
    }
}

/// Builds codemod instances.
///
/// Each worker loads its own instance; only primitive configuration crosses
/// the worker boundary. A load failure aborts the whole run.
pub trait CodemodFactory<T>: Send + Sync {
    type Codemod: Codemod<T> + 'static;

    fn load(&self) -> Result<Self::Codemod, DynError>;
}

// ============================================================================
// Outcomes
// ============================================================================

/// What happened to one file, discriminated on the action taken.
#[derive(Debug)]
pub enum OutcomeKind {
    /// The produced text is non-empty, differs from the original, and was not
    /// suppressed by the change-signal protocol.
    Modified {
        contents: String,
        meta: Option<Value>,
    },
    /// The codemod examined the file but nothing really changed; `contents`
    /// is the original text.
    Skipped {
        contents: String,
        meta: Option<Value>,
    },
    /// The pipeline failed for this file. Local to the file; the run goes on.
    Error(TransformError),
}

/// The action tag of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Modified,
    Skipped,
    Error,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Modified => "modified",
            Action::Skipped => "skipped",
            Action::Error => "error",
        }
    }
}

/// One file's result, correlated back to its source path.
#[derive(Debug)]
pub struct CodemodOutcome {
    pub file_path: PathBuf,
    pub kind: OutcomeKind,
}

impl CodemodOutcome {
    pub fn action(&self) -> Action {
        match &self.kind {
            OutcomeKind::Modified { .. } => Action::Modified,
            OutcomeKind::Skipped { .. } => Action::Skipped,
            OutcomeKind::Error(_) => Action::Error,
        }
    }

    /// True iff the returned text actually replaces the original.
    pub fn code_modified(&self) -> bool {
        matches!(self.kind, OutcomeKind::Modified { .. })
    }

    /// The produced text, absent for errored files.
    pub fn contents(&self) -> Option<&str> {
        match &self.kind {
            OutcomeKind::Modified { contents, .. } | OutcomeKind::Skipped { contents, .. } => {
                Some(contents)
            }
            OutcomeKind::Error(_) => None,
        }
    }

    /// Codemod-attached metadata, if any.
    pub fn meta(&self) -> Option<&Value> {
        match &self.kind {
            OutcomeKind::Modified { meta, .. } | OutcomeKind::Skipped { meta, .. } => meta.as_ref(),
            OutcomeKind::Error(_) => None,
        }
    }

    /// The error, for errored files.
    pub fn error(&self) -> Option<&TransformError> {
        match &self.kind {
            OutcomeKind::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Machine-readable form for JSON output.
    pub fn report(&self) -> OutcomeReport {
        OutcomeReport {
            file: self.file_path.display().to_string(),
            action: self.action(),
            code_modified: self.code_modified(),
            meta: self.meta().cloned(),
            error: self.error().map(|err| ErrorReport {
                phase: err.phase().as_str(),
                message: err.to_string(),
                suggestion: err.suggestion(),
            }),
        }
    }

    pub fn error_outcome(file_path: impl AsRef<Path>, err: TransformError) -> Self {
        CodemodOutcome {
            file_path: file_path.as_ref().to_path_buf(),
            kind: OutcomeKind::Error(err),
        }
    }
}

/// Serializable per-file report.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub file: String,
    pub action: Action,
    pub code_modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Serializable error detail inside a report.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub phase: &'static str,
    pub message: String,
    pub suggestion: &'static str,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Phase;
    use serde_json::json;

    fn boxed(msg: &str) -> DynError {
        Box::new(std::io::Error::other(msg.to_string()))
    }

    mod plugin_spec {
        use super::*;

        fn noop_visitor() -> Box<dyn TreeVisitor<Vec<String>>> {
            Box::new(
                |_: &mut Vec<String>, _: &mut ChangeSession| -> Result<(), DynError> { Ok(()) },
            )
        }

        #[test]
        fn bare_plugin_defaults_to_format_preserving() {
            let spec: PluginSpec<Vec<String>> = PluginSpec::Plugin(noop_visitor());
            let (_, format_preserving) = spec.into_parts();
            assert!(format_preserving);
        }

        #[test]
        fn configured_plugin_can_opt_out() {
            let spec: PluginSpec<Vec<String>> = PluginSpec::Configured {
                plugin: noop_visitor(),
                format_preserving: false,
            };
            let (_, format_preserving) = spec.into_parts();
            assert!(!format_preserving);
        }
    }

    mod outcomes {
        use super::*;

        #[test]
        fn code_modified_iff_action_is_modified() {
            let modified = CodemodOutcome {
                file_path: PathBuf::from("/a.js"),
                kind: OutcomeKind::Modified {
                    contents: "new".to_string(),
                    meta: None,
                },
            };
            let skipped = CodemodOutcome {
                file_path: PathBuf::from("/b.js"),
                kind: OutcomeKind::Skipped {
                    contents: "old".to_string(),
                    meta: None,
                },
            };
            let errored = CodemodOutcome::error_outcome(
                "/c.js",
                TransformError::codemod(Phase::Transform, boxed("boom")),
            );
            assert!(modified.code_modified());
            assert!(!skipped.code_modified());
            assert!(!errored.code_modified());
            assert_eq!(modified.action(), Action::Modified);
            assert_eq!(skipped.action(), Action::Skipped);
            assert_eq!(errored.action(), Action::Error);
        }

        #[test]
        fn report_serializes_action_and_phase() {
            let outcome = CodemodOutcome::error_outcome(
                "/c.js",
                TransformError::codemod(Phase::Transform, boxed("boom")),
            );
            let json = serde_json::to_value(outcome.report()).unwrap();
            assert_eq!(json["action"], json!("error"));
            assert_eq!(json["error"]["phase"], json!("codemod.transform()"));
            assert!(json["error"]["suggestion"].as_str().unwrap().len() > 0);
        }

        #[test]
        fn report_carries_meta_for_skipped_files() {
            let outcome = CodemodOutcome {
                file_path: PathBuf::from("/a.js"),
                kind: OutcomeKind::Skipped {
                    contents: "old".to_string(),
                    meta: Some(json!({"seen": 3})),
                },
            };
            let json = serde_json::to_value(outcome.report()).unwrap();
            assert_eq!(json["meta"]["seen"], json!(3));
            assert_eq!(json["code_modified"], json!(false));
        }
    }

    mod default_parse_args {
        use super::*;

        struct Noop;

        impl Codemod<Vec<String>> for Noop {
            fn pathway(&self) -> TransformPathway<'_, Vec<String>> {
                unimplemented!("not exercised")
            }
        }

        #[test]
        fn default_passes_raw_string_through() {
            let codemod = Noop;
            assert_eq!(
                codemod.parse_args(Some("--flag")).unwrap(),
                Some(Value::String("--flag".to_string()))
            );
            assert_eq!(codemod.parse_args(None).unwrap(), None);
        }
    }
}
