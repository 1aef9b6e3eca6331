//! The worker pool orchestrator: fan a codemod out across many files.
//!
//! Below [`RunOptions::pool_threshold`] all files run sequentially in the
//! calling task; spinning up workers is not worth paying for small batches.
//! At or above it, files are distributed across a fixed-size pool of tokio
//! tasks. Each worker loads its own codemod instance from the factory, so
//! codemod state (closures, parser caches) never crosses the worker boundary;
//! only primitive configuration does.
//!
//! A thrown error from one file never aborts the run: it becomes that file's
//! `error` outcome, and the orchestrator reports an aggregate failure flag
//! while still returning every outcome. Only a codemod that fails to load, or
//! a `post_process` that raises, fails the whole run.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::codemod::{Codemod, CodemodFactory, CodemodOutcome, OutcomeKind, OutcomeReport};
use crate::error::{RunError, TransformError};
use crate::reconcile::reconcile_source;
use crate::toolkit::AstToolkit;

// ============================================================================
// Run Options
// ============================================================================

/// Per-run configuration. Everything here is primitive on purpose: it is the
/// only state that crosses the worker boundary.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Write modified files back to disk.
    pub write_files: bool,
    /// Report would-be-modified files without writing; also suppresses
    /// `post_process`.
    pub dry_run: bool,
    /// Raw passthrough argument string handed to the codemod's `parse_args`.
    pub codemod_args: Option<String>,
    /// Below this many files, run sequentially in the calling task.
    pub pool_threshold: usize,
    /// Worker task count used at or above the threshold.
    pub worker_count: usize,
    /// Master switch for `post_process`.
    pub run_post_process: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            write_files: true,
            dry_run: false,
            codemod_args: None,
            pool_threshold: 20,
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            run_post_process: true,
        }
    }
}

// ============================================================================
// Run Summary
// ============================================================================

/// Every file's outcome, in completion order, plus partition helpers.
#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<CodemodOutcome>,
}

impl RunSummary {
    /// Paths whose outcome is `modified`. Under `dry_run` this is the
    /// would-be-modified list.
    pub fn modified_paths(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter(|o| o.code_modified())
            .map(|o| o.file_path.as_path())
            .collect()
    }

    pub fn modified_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.code_modified()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.kind, OutcomeKind::Skipped { .. }))
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error().is_some()).count()
    }

    /// True if any file errored. The caller decides whether that fails the
    /// overall run.
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Per-file metadata accumulated from modified and skipped outcomes.
    pub fn meta_by_file(&self) -> BTreeMap<PathBuf, Value> {
        self.outcomes
            .iter()
            .filter_map(|o| o.meta().map(|meta| (o.file_path.clone(), meta.clone())))
            .collect()
    }

    /// Machine-readable reports for all outcomes.
    pub fn reports(&self) -> Vec<OutcomeReport> {
        self.outcomes.iter().map(|o| o.report()).collect()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs one codemod over a resolved list of absolute file paths.
pub struct Orchestrator<K, F> {
    factory: Arc<F>,
    toolkit: Arc<K>,
    options: RunOptions,
}

impl<K, F> Orchestrator<K, F>
where
    K: AstToolkit,
    F: CodemodFactory<K::Tree> + 'static,
{
    pub fn new(factory: F, toolkit: K, options: RunOptions) -> Self {
        Orchestrator {
            factory: Arc::new(factory),
            toolkit: Arc::new(toolkit),
            options,
        }
    }

    /// Process every file and return one outcome per processed file.
    ///
    /// Outcome order is completion order, not input order; each outcome
    /// carries its path for correlation.
    pub async fn run(&self, files: Vec<PathBuf>) -> Result<RunSummary, RunError> {
        // The coordinator's own instance: validates that the codemod loads
        // and that the argument string parses before any fan-out.
        let coordinator = self
            .factory
            .load()
            .map_err(|source| RunError::CodemodLoad { source })?;
        coordinator
            .parse_args(self.options.codemod_args.as_deref())
            .map_err(|source| RunError::InvalidArguments { source })?;

        let ignore = build_ignore_set(coordinator.ignore())?;
        let files: Vec<PathBuf> = files
            .into_iter()
            .filter(|path| {
                let ignored = ignore.is_match(path);
                if ignored {
                    debug!(file = %path.display(), "excluded by codemod ignore pattern");
                }
                !ignored
            })
            .collect();

        info!(
            codemod = coordinator.name(),
            files = files.len(),
            dry_run = self.options.dry_run,
            "starting run"
        );

        let outcomes = if files.len() < self.options.pool_threshold {
            debug!(
                threshold = self.options.pool_threshold,
                "below pool threshold; running sequentially"
            );
            self.run_sequential(&coordinator, files).await
        } else {
            self.run_pooled(files).await?
        };

        let summary = RunSummary { outcomes };
        if summary.has_errors() {
            error!(
                errored = summary.error_count(),
                total = summary.outcomes.len(),
                "run finished with per-file failures"
            );
        }
        if self.options.dry_run {
            info!(
                would_modify = summary.modified_count(),
                "dry run; no files were written"
            );
        }

        if self.options.run_post_process && !self.options.dry_run {
            let modified: Vec<PathBuf> = summary
                .modified_paths()
                .into_iter()
                .map(Path::to_path_buf)
                .collect();
            let meta = summary.meta_by_file();
            coordinator
                .post_process(&modified, &meta)
                .await
                .map_err(|source| RunError::PostProcess { source })?;
        }

        Ok(summary)
    }

    async fn run_sequential(
        &self,
        codemod: &F::Codemod,
        files: Vec<PathBuf>,
    ) -> Vec<CodemodOutcome> {
        let mut outcomes = Vec::with_capacity(files.len());
        for path in files {
            outcomes.push(
                process_file(
                    codemod,
                    self.toolkit.as_ref(),
                    &path,
                    self.options.codemod_args.as_deref(),
                    self.options.write_files && !self.options.dry_run,
                )
                .await,
            );
        }
        outcomes
    }

    async fn run_pooled(&self, files: Vec<PathBuf>) -> Result<Vec<CodemodOutcome>, RunError> {
        let worker_count = self.options.worker_count.min(files.len()).max(1);
        debug!(workers = worker_count, files = files.len(), "fanning out");

        let queue = Arc::new(Mutex::new(files.into_iter().collect::<VecDeque<_>>()));
        let write = self.options.write_files && !self.options.dry_run;
        let mut workers: JoinSet<Result<Vec<CodemodOutcome>, RunError>> = JoinSet::new();

        for worker_id in 0..worker_count {
            let factory = Arc::clone(&self.factory);
            let toolkit = Arc::clone(&self.toolkit);
            let queue = Arc::clone(&queue);
            let raw_args = self.options.codemod_args.clone();
            workers.spawn(async move {
                // Fresh instance per worker; codemod state is not shared
                // across the boundary.
                let codemod = factory
                    .load()
                    .map_err(|source| RunError::CodemodLoad { source })?;
                let mut outcomes = Vec::new();
                loop {
                    let path = {
                        let mut queue = queue.lock().expect("file queue poisoned");
                        queue.pop_front()
                    };
                    let Some(path) = path else { break };
                    debug!(worker = worker_id, file = %path.display(), "processing");
                    outcomes
                        .push(process_file(&codemod, toolkit.as_ref(), &path, raw_args.as_deref(), write).await);
                }
                Ok(outcomes)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(worker_outcomes)) => outcomes.extend(worker_outcomes),
                Ok(Err(err)) => return Err(err),
                Err(join_err) => {
                    return Err(RunError::WorkerPanic {
                        message: join_err.to_string(),
                    })
                }
            }
        }
        Ok(outcomes)
    }
}

// ============================================================================
// Per-File Processing
// ============================================================================

/// Read, reconcile, and (by policy) write back one file. Every failure is
/// captured into the outcome; nothing escapes to abort the run.
async fn process_file<K: AstToolkit>(
    codemod: &impl Codemod<K::Tree>,
    toolkit: &K,
    path: &Path,
    raw_args: Option<&str>,
    write: bool,
) -> CodemodOutcome {
    let source = match tokio::fs::read_to_string(path).await {
        Ok(source) => source,
        Err(err) => {
            return CodemodOutcome::error_outcome(path, TransformError::FileIo { source: err })
        }
    };

    // Per-file, inside the worker: codemods may return non-reusable values.
    let args = match codemod.parse_args(raw_args) {
        Ok(args) => args,
        Err(err) => return CodemodOutcome::error_outcome(path, TransformError::Args { source: err }),
    };

    let reconciled = match reconcile_source(codemod, toolkit, &source, path, args.as_ref()).await {
        Ok(reconciled) => reconciled,
        Err(err) => {
            warn!(file = %path.display(), phase = %err.phase(), "file failed: {err}");
            return CodemodOutcome::error_outcome(path, err);
        }
    };

    if reconciled.code_modified {
        if write {
            if let Err(err) = tokio::fs::write(path, &reconciled.contents).await {
                return CodemodOutcome::error_outcome(path, TransformError::FileIo { source: err });
            }
        }
        CodemodOutcome {
            file_path: path.to_path_buf(),
            kind: OutcomeKind::Modified {
                contents: reconciled.contents,
                meta: reconciled.meta,
            },
        }
    } else {
        CodemodOutcome {
            file_path: path.to_path_buf(),
            kind: OutcomeKind::Skipped {
                contents: reconciled.contents,
                meta: reconciled.meta,
            },
        }
    }
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet, RunError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| RunError::InvalidIgnorePattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|source| RunError::InvalidIgnorePattern {
            pattern: "<combined>".to_string(),
            source,
        })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod ignore_set {
        use super::*;

        #[test]
        fn matches_declared_patterns() {
            let set =
                build_ignore_set(&["**/node_modules/**".to_string(), "**/*.min.js".to_string()])
                    .unwrap();
            assert!(set.is_match("/repo/node_modules/x/index.js"));
            assert!(set.is_match("/repo/dist/app.min.js"));
            assert!(!set.is_match("/repo/src/app.js"));
        }

        #[test]
        fn invalid_pattern_aborts_the_run() {
            let err = build_ignore_set(&["[".to_string()]).unwrap_err();
            assert!(matches!(err, RunError::InvalidIgnorePattern { .. }));
        }

        #[test]
        fn empty_pattern_list_matches_nothing() {
            let set = build_ignore_set(&[]).unwrap();
            assert!(!set.is_match("/repo/src/app.js"));
        }
    }

    mod run_options {
        use super::*;

        #[test]
        fn defaults_write_and_post_process() {
            let options = RunOptions::default();
            assert!(options.write_files);
            assert!(!options.dry_run);
            assert!(options.run_post_process);
            assert!(options.worker_count >= 1);
        }
    }
}
