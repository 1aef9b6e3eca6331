//! Dual-budget sliding-window rate limiter for completion-API codemods.
//!
//! The limiter throttles calls to a remote completion model under two
//! independent rolling-window budgets: a maximum request count and a maximum
//! total estimated-token count per window. Admission uses caller-supplied
//! token estimates; after a dispatched call resolves, the window's token
//! count is reconciled with the call's actual reported usage so estimation
//! error does not compound across a long run.
//!
//! The limiter never holds a backlog of work items. The caller owns the FIFO
//! queue behind a [`WorkSource`]; the limiter peeks the head's estimate, and
//! only consumes the head once admission succeeds, so a deferred request is
//! never lost. Every deferred request is retried at the window boundary;
//! requests are never dropped.
//!
//! Window state is mutated only under the limiter's single lock: concurrent
//! callers serialize through [`attempt_call`](RateLimiter::attempt_call) even
//! when the dispatched calls themselves run concurrently.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

// ============================================================================
// Work Items
// ============================================================================

/// What a dispatched completion call reports back.
#[derive(Debug, Clone, Copy)]
pub struct CompletionUsage {
    /// Actual token consumption, replacing the admission estimate.
    pub tokens_used: u64,
    /// The remote side rejected the call for being over its own rate limit.
    pub rate_limit_reached: bool,
}

/// One unit of work: a thunk plus its caller-estimated token cost.
pub struct Work {
    pub estimated_tokens: u64,
    pub run: Pin<Box<dyn Future<Output = CompletionUsage> + Send + 'static>>,
}

impl Work {
    pub fn new(
        estimated_tokens: u64,
        run: impl Future<Output = CompletionUsage> + Send + 'static,
    ) -> Self {
        Work {
            estimated_tokens,
            run: Box::pin(run),
        }
    }
}

/// The caller-owned FIFO of not-yet-dispatched requests.
///
/// `head_estimate` peeks; `pull` consumes. The limiter calls both under its
/// own lock, so the head cannot change between the peek and the pull as long
/// as all enqueuing goes through the same source.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Token estimate of the request at the head of the queue, if any.
    async fn head_estimate(&self) -> Option<u64>;

    /// Remove and return the head request.
    async fn pull(&self) -> Option<Work>;
}

// ============================================================================
// Limiter
// ============================================================================

/// What one admission attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The head request was dispatched.
    Dispatched,
    /// Budget exhausted; a retry is scheduled at the window boundary.
    Deferred,
    /// The source had nothing waiting.
    Idle,
}

#[derive(Debug, Default)]
struct WindowState {
    /// Set by the first admission into an empty window; opening is idempotent.
    opened_at: Option<Instant>,
    /// Bumped on every window reset; stale completions must not reconcile a
    /// newer window's counters.
    generation: u64,
    requests_in_window: u32,
    tokens_in_window: u64,
    /// The remote reported its own limit; the window is spent regardless of
    /// local counters.
    exhausted: bool,
    /// At most one boundary wake is in flight at a time.
    retry_scheduled: bool,
}

impl WindowState {
    fn maybe_reset(&mut self, now: Instant, window: Duration) {
        if let Some(opened) = self.opened_at {
            if now >= opened + window {
                self.opened_at = None;
                self.generation += 1;
                self.requests_in_window = 0;
                self.tokens_in_window = 0;
                self.exhausted = false;
            }
        }
    }
}

/// Sliding-window scheduler with request-count and token budgets.
pub struct RateLimiter<S> {
    max_requests: u32,
    max_tokens: u64,
    window: Duration,
    source: S,
    state: Mutex<WindowState>,
}

impl<S: WorkSource + 'static> RateLimiter<S> {
    /// One limiter instance owns all window state; no ambient singleton.
    pub fn new(max_requests: u32, max_tokens: u64, window: Duration, source: S) -> Arc<Self> {
        Arc::new(RateLimiter {
            max_requests,
            max_tokens,
            window,
            source,
            state: Mutex::new(WindowState::default()),
        })
    }

    /// Request permission to issue the head unit of work.
    ///
    /// Dispatches immediately when both budgets admit it; otherwise schedules
    /// a retry at the window's reset time and returns [`Admission::Deferred`].
    pub async fn attempt_call(self: &Arc<Self>) -> Admission {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.maybe_reset(now, self.window);

        let Some(estimate) = self.source.head_estimate().await else {
            return Admission::Idle;
        };

        if !self.admits(&state, estimate) {
            debug!(
                estimate,
                requests = state.requests_in_window,
                tokens = state.tokens_in_window,
                exhausted = state.exhausted,
                "deferring request to window boundary"
            );
            self.schedule_retry(&mut state, now);
            return Admission::Deferred;
        }

        let Some(work) = self.source.pull().await else {
            return Admission::Idle;
        };

        if state.opened_at.is_none() {
            state.opened_at = Some(now);
        }
        state.requests_in_window += 1;
        state.tokens_in_window += work.estimated_tokens;
        let generation = state.generation;
        let estimated = work.estimated_tokens;
        drop(state);

        debug!(estimate = estimated, "dispatching completion request");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let usage = work.run.await;
            this.settle(generation, estimated, usage).await;
        });
        Admission::Dispatched
    }

    /// Requests currently counted against the open window.
    pub async fn requests_in_window(&self) -> u32 {
        self.state.lock().await.requests_in_window
    }

    /// Tokens currently counted against the open window (reconciled).
    pub async fn tokens_in_window(&self) -> u64 {
        self.state.lock().await.tokens_in_window
    }

    fn admits(&self, state: &WindowState, estimate: u64) -> bool {
        if state.exhausted || state.requests_in_window >= self.max_requests {
            return false;
        }
        if state.tokens_in_window + estimate <= self.max_tokens {
            return true;
        }
        // An estimate bigger than the whole token budget would defer forever.
        // An empty window is as good as it gets, so admit it there and let
        // the remote side be the judge.
        if state.requests_in_window == 0 && state.tokens_in_window == 0 {
            warn!(
                estimate,
                max_tokens = self.max_tokens,
                "estimate exceeds the per-window token budget; admitting into an empty window"
            );
            return true;
        }
        false
    }

    /// Schedule a single wake at the window's reset time. The wake drains
    /// every admissible head, preserving FIFO order.
    fn schedule_retry(self: &Arc<Self>, state: &mut WindowState, now: Instant) {
        if state.retry_scheduled {
            return;
        }
        state.retry_scheduled = true;
        let deadline = match state.opened_at {
            Some(opened) => opened + self.window,
            None => now + self.window,
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            this.state.lock().await.retry_scheduled = false;
            this.drain().await;
        });
    }

    async fn drain(self: &Arc<Self>) {
        while self.attempt_call().await == Admission::Dispatched {}
    }

    /// Reconcile a completed call's actual usage into the admitting window.
    async fn settle(self: &Arc<Self>, generation: u64, estimated: u64, usage: CompletionUsage) {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            // The admitting window has already reset; its counters are gone.
            return;
        }
        if usage.tokens_used != estimated {
            state.tokens_in_window =
                state.tokens_in_window.saturating_sub(estimated) + usage.tokens_used;
            debug!(
                estimated,
                actual = usage.tokens_used,
                tokens = state.tokens_in_window,
                "reconciled window tokens with actual usage"
            );
        }
        if usage.rate_limit_reached {
            warn!("remote reported its rate limit; treating the window as exhausted");
            state.exhausted = true;
            let now = Instant::now();
            self.schedule_retry(&mut state, now);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
