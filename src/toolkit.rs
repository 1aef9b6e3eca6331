//! The AST toolkit seam: parse, print, and visitor capabilities.
//!
//! The runner does not define a syntax tree or a grammar. Parsing a file,
//! re-printing a (possibly mutated) tree, and walking it with a visitor are
//! capabilities supplied by an external toolkit behind the [`AstToolkit`]
//! trait. The reconciler composes two printing modes through this seam:
//!
//! - [`print_preserving`](AstToolkit::print_preserving): format-preserving
//!   re-printing, keeping unmodified regions byte-identical. Requires the
//!   parse to have emitted raw tokens (see [`ParseOptions::emit_tokens`]).
//! - [`print_generated`](AstToolkit::print_generated): the mutation engine's
//!   own pretty-printed output, for inputs the re-printer handles badly.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::DynError;
use crate::signal::ChangeSession;

// ============================================================================
// Parse Options
// ============================================================================

/// Options handed to [`AstToolkit::parse`].
///
/// The reconciler builds these through a shim when format-preserving printing
/// is on: token emission is forced (the re-printer needs raw tokens to
/// reproduce exact formatting; without them it falls back to a generic
/// tokenizer that ignores custom syntax extensions), and option keys the
/// re-printer recognizes but the parser itself does not are merged into
/// `extensions`.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Emit raw tokens alongside the tree.
    pub emit_tokens: bool,
    /// Toolkit-specific option keys merged in by the parser shim.
    pub extensions: BTreeMap<String, Value>,
}

// ============================================================================
// Toolkit
// ============================================================================

/// An external syntax engine: parser, printers, and the tree they share.
pub trait AstToolkit: Send + Sync + 'static {
    /// The parsed tree handed to visitors.
    type Tree: Send + 'static;

    /// Option keys the format-preserving printer understands but the parser
    /// does not support natively. The parser shim merges these into
    /// [`ParseOptions::extensions`] before a format-preserving parse.
    fn reprint_option_keys(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    /// Parse source text into a tree.
    fn parse(&self, source: &str, options: &ParseOptions) -> Result<Self::Tree, DynError>;

    /// Re-print a tree, keeping unmodified regions' original formatting.
    fn print_preserving(&self, tree: &Self::Tree) -> Result<String, DynError>;

    /// Print a tree with the mutation engine's plain pretty-printer.
    fn print_generated(&self, tree: &Self::Tree) -> Result<String, DynError>;
}

// ============================================================================
// Visitors
// ============================================================================

/// A codemod-supplied pass that mutates a parsed tree in place.
///
/// The visitor receives the file's [`ChangeSession`] so it can arm and fire
/// the change signal and attach result metadata while it walks.
pub trait TreeVisitor<T>: Send {
    fn visit(&mut self, tree: &mut T, session: &mut ChangeSession) -> Result<(), DynError>;
}

/// Blanket impl so simple visitors can be written as closures in tests and
/// small codemods.
impl<T, F> TreeVisitor<T> for F
where
    F: FnMut(&mut T, &mut ChangeSession) -> Result<(), DynError> + Send,
{
    fn visit(&mut self, tree: &mut T, session: &mut ChangeSession) -> Result<(), DynError> {
        self(tree, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options_default_to_no_tokens() {
        let options = ParseOptions::default();
        assert!(!options.emit_tokens);
        assert!(options.extensions.is_empty());
    }

    #[test]
    fn closures_are_tree_visitors() {
        // Compile-time check that the blanket impl holds for closures.
        fn assert_visitor<V: TreeVisitor<Vec<String>>>(_: V) {}
        assert_visitor(
            |_: &mut Vec<String>, _: &mut ChangeSession| -> Result<(), DynError> { Ok(()) },
        );
    }
}
