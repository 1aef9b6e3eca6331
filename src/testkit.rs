//! Line-oriented reference toolkit and scripted codemods for the test suite.
//!
//! The runner treats parsing and printing as an external capability, so the
//! tests need a toolkit that is trivial to reason about: [`LineToolkit`]
//! "parses" a file into its lines. Its format-preserving printer returns the
//! original text byte-for-byte when the lines were not touched; its generated
//! printer re-joins lines after trimming trailing whitespace, the way a plain
//! pretty-printer sheds incidental formatting.
//!
//! Also serves as the minimal worked example of implementing [`AstToolkit`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::codemod::{
    Codemod, CodemodFactory, DirectOutput, DirectTransform, PluginFactory, PluginSpec,
    TransformPathway, TransformRequest,
};
use crate::error::DynError;
use crate::signal::ChangeSession;
use crate::toolkit::{AstToolkit, ParseOptions, TreeVisitor};

/// Marker that makes [`LineToolkit::parse`] fail, for parse-error scenarios.
pub const UNPARSEABLE: &str = "%%unparseable%%";

// ============================================================================
// Line Tree
// ============================================================================

/// A file "parsed" into its lines.
#[derive(Debug, Clone)]
pub struct LineTree {
    original: String,
    pub lines: Vec<String>,
    had_trailing_newline: bool,
    parsed_with_tokens: bool,
}

impl LineTree {
    fn new(source: &str, parsed_with_tokens: bool) -> Self {
        LineTree {
            original: source.to_string(),
            lines: source.lines().map(String::from).collect(),
            had_trailing_newline: source.ends_with('\n'),
            parsed_with_tokens,
        }
    }

    /// Whether the parse that built this tree emitted tokens.
    pub fn parsed_with_tokens(&self) -> bool {
        self.parsed_with_tokens
    }

    fn joined(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.had_trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }
}

// ============================================================================
// Line Toolkit
// ============================================================================

/// The trivial toolkit backing the test suite.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineToolkit;

impl AstToolkit for LineToolkit {
    type Tree = LineTree;

    fn reprint_option_keys(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([("preserveLayout".to_string(), Value::Bool(true))])
    }

    fn parse(&self, source: &str, options: &ParseOptions) -> Result<Self::Tree, DynError> {
        if source.contains(UNPARSEABLE) {
            return Err(format!("unexpected token at `{UNPARSEABLE}`").into());
        }
        Ok(LineTree::new(source, options.emit_tokens))
    }

    fn print_preserving(&self, tree: &Self::Tree) -> Result<String, DynError> {
        // Untouched lines reproduce the parsed text byte-for-byte.
        if tree.joined() == tree.original {
            Ok(tree.original.clone())
        } else {
            Ok(tree.joined())
        }
    }

    fn print_generated(&self, tree: &Self::Tree) -> Result<String, DynError> {
        let trimmed: Vec<&str> = tree.lines.iter().map(|l| l.trim_end()).collect();
        Ok(trimmed.join("\n"))
    }
}

// ============================================================================
// Scripted Visitor Codemods
// ============================================================================

/// A configurable visitor-pathway codemod.
///
/// The default is a no-op visitor that neither arms nor fires. Tests flip
/// individual fields to script each protocol scenario.
#[derive(Debug, Clone, Default)]
pub struct VisitorCodemod {
    /// Replace every occurrence of `.0` with `.1` on each line.
    pub replace: Option<(String, String)>,
    /// Arm the change signal at plugin acquisition.
    pub arm: bool,
    /// Fire the signal when a replacement actually changed a line.
    pub fire_on_change: bool,
    /// Fire unconditionally without ever arming (protocol violation).
    pub fire_without_arm: bool,
    /// `Some(flag)` returns the configured plugin shape; `None` the bare one.
    pub format_preserving: Option<bool>,
    /// Metadata attached at acquisition time.
    pub meta: Option<Value>,
    /// Glob patterns for files this codemod skips.
    pub ignore: Vec<String>,
    /// Raise from the plugin factory.
    pub fail_in_factory: bool,
    /// Raise from inside the visitor.
    pub fail_in_visitor: bool,
}

impl Codemod<LineTree> for VisitorCodemod {
    fn name(&self) -> &str {
        "scripted-visitor"
    }

    fn pathway(&self) -> TransformPathway<'_, LineTree> {
        TransformPathway::Visitor(self)
    }

    fn ignore(&self) -> &[String] {
        &self.ignore
    }
}

impl PluginFactory<LineTree> for VisitorCodemod {
    fn get_plugin(&self, session: &mut ChangeSession) -> Result<PluginSpec<LineTree>, DynError> {
        if self.fail_in_factory {
            return Err("factory exploded".into());
        }
        if self.arm {
            session.arm();
        }
        if let Some(meta) = &self.meta {
            session.set_result_meta(meta.clone());
        }

        let config = self.clone();
        let visitor = Box::new(move |tree: &mut LineTree,
                                     session: &mut ChangeSession|
              -> Result<(), DynError> {
            if config.fail_in_visitor {
                return Err("visitor exploded".into());
            }
            let mut changed = false;
            if let Some((from, to)) = &config.replace {
                for line in &mut tree.lines {
                    let replaced = line.replace(from.as_str(), to.as_str());
                    if replaced != *line {
                        *line = replaced;
                        changed = true;
                    }
                }
            }
            if config.fire_without_arm {
                session.fire();
            } else if changed && config.fire_on_change {
                session.fire();
            }
            Ok(())
        }) as Box<dyn TreeVisitor<LineTree>>;

        Ok(match self.format_preserving {
            None => PluginSpec::Plugin(visitor),
            Some(format_preserving) => PluginSpec::Configured {
                plugin: visitor,
                format_preserving,
            },
        })
    }
}

// ============================================================================
// Scripted Direct Codemods
// ============================================================================

/// What a [`DirectCodemod`] does with the source it is given.
#[derive(Debug, Clone)]
pub enum DirectBehavior {
    /// Return the text uppercased.
    Uppercase,
    /// Return the input unchanged.
    Identity,
    /// Return nothing ("examined, no output").
    Null,
    /// Append a line to the text.
    AppendLine(String),
    /// Append a line and attach metadata.
    AppendWithMeta(String, Value),
    /// Raise with the given message.
    Fail(String),
}

/// A configurable direct-pathway codemod.
#[derive(Debug, Clone)]
pub struct DirectCodemod {
    pub behavior: DirectBehavior,
    pub ignore: Vec<String>,
}

impl DirectCodemod {
    pub fn new(behavior: DirectBehavior) -> Self {
        DirectCodemod {
            behavior,
            ignore: Vec::new(),
        }
    }
}

impl Codemod<LineTree> for DirectCodemod {
    fn name(&self) -> &str {
        "scripted-direct"
    }

    fn pathway(&self) -> TransformPathway<'_, LineTree> {
        TransformPathway::Direct(self)
    }

    fn ignore(&self) -> &[String] {
        &self.ignore
    }
}

#[async_trait]
impl DirectTransform for DirectCodemod {
    async fn transform(
        &self,
        request: &TransformRequest,
    ) -> Result<Option<DirectOutput>, DynError> {
        match &self.behavior {
            DirectBehavior::Uppercase => Ok(Some(DirectOutput::code(
                request.source.to_uppercase(),
            ))),
            DirectBehavior::Identity => Ok(Some(DirectOutput::code(request.source.clone()))),
            DirectBehavior::Null => Ok(None),
            DirectBehavior::AppendLine(line) => Ok(Some(DirectOutput::code(format!(
                "{}{line}\n",
                request.source
            )))),
            DirectBehavior::AppendWithMeta(line, meta) => Ok(Some(DirectOutput::with_meta(
                format!("{}{line}\n", request.source),
                meta.clone(),
            ))),
            DirectBehavior::Fail(message) => Err(message.clone().into()),
        }
    }
}

// ============================================================================
// Factories
// ============================================================================

/// Loads a fresh clone of the prototype per worker.
#[derive(Debug, Clone)]
pub struct CloneFactory<C>(pub C);

impl<C> CodemodFactory<LineTree> for CloneFactory<C>
where
    C: Codemod<LineTree> + Clone + 'static,
{
    type Codemod = C;

    fn load(&self) -> Result<Self::Codemod, DynError> {
        Ok(self.0.clone())
    }
}

/// Always fails to load, for whole-run abort scenarios.
#[derive(Debug, Clone, Copy)]
pub struct FailingFactory;

impl CodemodFactory<LineTree> for FailingFactory {
    type Codemod = VisitorCodemod;

    fn load(&self) -> Result<Self::Codemod, DynError> {
        Err("codemod module does not compile".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserving_print_reproduces_untouched_text() {
        let toolkit = LineToolkit;
        let source = "one\n\n  two   \nthree\n";
        let tree = toolkit.parse(source, &ParseOptions::default()).unwrap();
        assert_eq!(toolkit.print_preserving(&tree).unwrap(), source);
    }

    #[test]
    fn generated_print_sheds_trailing_whitespace() {
        let toolkit = LineToolkit;
        let tree = toolkit
            .parse("a   \nb\n", &ParseOptions::default())
            .unwrap();
        assert_eq!(toolkit.print_generated(&tree).unwrap(), "a\nb");
    }

    #[test]
    fn parse_records_token_emission() {
        let toolkit = LineToolkit;
        let options = ParseOptions {
            emit_tokens: true,
            extensions: toolkit.reprint_option_keys(),
        };
        let tree = toolkit.parse("x\n", &options).unwrap();
        assert!(tree.parsed_with_tokens());
    }

    #[test]
    fn unparseable_marker_fails_the_parse() {
        let toolkit = LineToolkit;
        assert!(toolkit
            .parse(&format!("ok\n{UNPARSEABLE}\n"), &ParseOptions::default())
            .is_err());
    }
}
