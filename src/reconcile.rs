//! The transform reconciler: one codemod, one file's text, one outcome.
//!
//! [`reconcile_source`] applies a codemod to a single file's text and returns
//! the new text plus metadata, or a classified [`TransformError`]. It never
//! touches the filesystem; writing is the orchestrator's job.
//!
//! For visitor codemods the pipeline is:
//!
//! 1. Shebang/leading-whitespace split (format-preserving printers collapse
//!    leading blank lines and merge a shebang into the first statement, so
//!    the prefix is stripped before parsing and reattached verbatim after).
//! 2. Plugin acquisition through a fresh [`ChangeSession`].
//! 3. Parse, through the shim when format-preserving printing is on.
//! 4. Visitor walk over the parsed tree.
//! 5. Change-signal resolution: armed-but-never-fired discards whatever the
//!    print stage would produce and returns the original text verbatim.
//! 6. Print, reattach the prefix, preserve a trailing newline.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::codemod::{Codemod, PluginFactory, TransformPathway, TransformRequest};
use crate::error::{Phase, TransformError};
use crate::signal::{ChangeSession, SignalResolution};
use crate::toolkit::{AstToolkit, ParseOptions};

// ============================================================================
// Result Type
// ============================================================================

/// The reconciler's successful result for one file.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// The text to report. Equal to the original when nothing really changed.
    pub contents: String,
    /// True iff `contents` is non-empty, differs byte-for-byte from the
    /// original, and the change-signal protocol did not suppress it.
    pub code_modified: bool,
    /// Codemod-attached metadata.
    pub meta: Option<Value>,
}

impl Reconciled {
    fn unchanged(source: &str, meta: Option<Value>) -> Self {
        Reconciled {
            contents: source.to_string(),
            code_modified: false,
            meta,
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Apply one codemod to one file's text.
///
/// `args` is the structured value produced by the codemod's `parse_args`,
/// shared verbatim with every invocation in the run.
pub async fn reconcile_source<K: AstToolkit>(
    codemod: &dyn Codemod<K::Tree>,
    toolkit: &K,
    source: &str,
    file_path: &Path,
    args: Option<&Value>,
) -> Result<Reconciled, TransformError> {
    match codemod.pathway() {
        TransformPathway::Direct(direct) => {
            debug!(codemod = codemod.name(), file = %file_path.display(), "running direct transform");
            let request = TransformRequest {
                source: source.to_string(),
                file_path: file_path.to_path_buf(),
                command_line_args: args.cloned(),
            };
            let output = direct
                .transform(&request)
                .await
                .map_err(|err| TransformError::codemod(Phase::Transform, err))?;
            Ok(match output {
                None => Reconciled::unchanged(source, None),
                Some(output) => {
                    let contents = preserve_trailing_newline(source, output.code);
                    let code_modified = !contents.is_empty() && contents != source;
                    if code_modified {
                        Reconciled {
                            contents,
                            code_modified: true,
                            meta: output.meta,
                        }
                    } else {
                        Reconciled::unchanged(source, output.meta)
                    }
                }
            })
        }
        TransformPathway::Visitor(factory) => {
            debug!(codemod = codemod.name(), file = %file_path.display(), "running visitor pipeline");
            reconcile_with_plugin(factory, toolkit, source)
        }
    }
}

// ============================================================================
// Visitor Pipeline
// ============================================================================

fn reconcile_with_plugin<K: AstToolkit>(
    factory: &dyn PluginFactory<K::Tree>,
    toolkit: &K,
    source: &str,
) -> Result<Reconciled, TransformError> {
    let mut session = ChangeSession::new();

    let spec = factory
        .get_plugin(&mut session)
        .map_err(|err| TransformError::codemod(Phase::GetPlugin, err))?;
    let (mut visitor, format_preserving) = spec.into_parts();

    // The prefix is only split off for the format-preserving printer; the
    // plain pretty-printer parses the original, unstripped text.
    let (prefix, body) = split_shebang(source);
    let (parse_input, options) = if format_preserving {
        (body, shimmed_parse_options(toolkit))
    } else {
        (source, ParseOptions::default())
    };

    let mut tree = toolkit
        .parse(parse_input, &options)
        .map_err(|err| TransformError::Parse { source: err })?;

    visitor
        .visit(&mut tree, &mut session)
        .map_err(|err| TransformError::codemod(Phase::PluginExecution, err))?;

    let resolution = session.resolve()?;
    let meta = session.take_meta();

    if resolution == SignalResolution::ForcedUnchanged {
        debug!("change signal armed but never fired; returning original text");
        return Ok(Reconciled::unchanged(source, meta));
    }

    let printed = if format_preserving {
        let body_out = toolkit
            .print_preserving(&tree)
            .map_err(|err| TransformError::Print {
                detail: err.to_string(),
            })?;
        if body_out.is_empty() && !parse_input.trim().is_empty() {
            return Err(TransformError::Print {
                detail: "format-preserving printer returned nothing for a non-empty tree"
                    .to_string(),
            });
        }
        format!("{prefix}{body_out}")
    } else {
        let generated = toolkit
            .print_generated(&tree)
            .map_err(|err| TransformError::Print {
                detail: err.to_string(),
            })?;
        if generated.is_empty() && !source.trim().is_empty() {
            return Err(TransformError::Print {
                detail: "pretty-printer returned nothing for a non-empty tree".to_string(),
            });
        }
        generated
    };

    let contents = preserve_trailing_newline(source, printed);
    let code_modified = !contents.is_empty() && contents != source;
    if code_modified {
        Ok(Reconciled {
            contents,
            code_modified: true,
            meta,
        })
    } else {
        Ok(Reconciled::unchanged(source, meta))
    }
}

/// Force token emission and merge re-printer-only option keys, so exact
/// formatting can be reproduced and custom syntax extensions survive.
fn shimmed_parse_options<K: AstToolkit>(toolkit: &K) -> ParseOptions {
    ParseOptions {
        emit_tokens: true,
        extensions: toolkit.reprint_option_keys(),
    }
}

// ============================================================================
// Text Utilities
// ============================================================================

/// Split a leading `#!` line, plus any immediately following whitespace run,
/// off the front of the text. The prefix is excluded from parsing and
/// reattached verbatim to the printed output.
fn split_shebang(source: &str) -> (&str, &str) {
    if !source.starts_with("#!") {
        return ("", source);
    }
    let line_end = match source.find('\n') {
        Some(i) => i + 1,
        None => source.len(),
    };
    let rest = &source[line_end..];
    let ws_len = rest.len() - rest.trim_start().len();
    source.split_at(line_end + ws_len)
}

/// If the original ended with a line break and the produced text does not,
/// append one.
fn preserve_trailing_newline(source: &str, mut produced: String) -> String {
    if source.ends_with('\n') && !produced.ends_with('\n') {
        produced.push('\n');
    }
    produced
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod shebang_split {
        use super::*;

        #[test]
        fn text_without_shebang_is_untouched() {
            assert_eq!(split_shebang("const a = 1;\n"), ("", "const a = 1;\n"));
        }

        #[test]
        fn shebang_line_becomes_the_prefix() {
            let (prefix, body) = split_shebang("#!/usr/bin/env node\nconsole.log(1)\n");
            assert_eq!(prefix, "#!/usr/bin/env node\n");
            assert_eq!(body, "console.log(1)\n");
        }

        #[test]
        fn whitespace_run_after_the_shebang_joins_the_prefix() {
            let (prefix, body) = split_shebang("#!/usr/bin/env node\n\n\n  console.log(1)\n");
            assert_eq!(prefix, "#!/usr/bin/env node\n\n\n  ");
            assert_eq!(body, "console.log(1)\n");
        }

        #[test]
        fn shebang_without_newline_is_all_prefix() {
            let (prefix, body) = split_shebang("#!/bin/sh");
            assert_eq!(prefix, "#!/bin/sh");
            assert_eq!(body, "");
        }

        #[test]
        fn prefix_and_body_reassemble_to_the_original() {
            for source in [
                "#!/usr/bin/env node\n\nlet x;\n",
                "#! /bin/bash\n   echo hi\n",
                "plain text",
            ] {
                let (prefix, body) = split_shebang(source);
                assert_eq!(format!("{prefix}{body}"), source);
            }
        }
    }

    mod trailing_newline {
        use super::*;

        #[test]
        fn appended_when_original_had_one() {
            assert_eq!(
                preserve_trailing_newline("a\n", "b".to_string()),
                "b\n".to_string()
            );
        }

        #[test]
        fn not_appended_when_original_lacked_one() {
            assert_eq!(
                preserve_trailing_newline("a", "b".to_string()),
                "b".to_string()
            );
        }

        #[test]
        fn not_doubled_when_already_present() {
            assert_eq!(
                preserve_trailing_newline("a\n", "b\n".to_string()),
                "b\n".to_string()
            );
        }
    }
}
