//! Change-signal protocol: how a codemod declares "I changed this file".
//!
//! Diffing syntax trees to detect "nothing actually changed" is unreliable
//! across plugin toolkits, so codemods may opt in to explicit signaling
//! instead. The protocol is a three-state machine:
//!
//! ```text
//! Unarmed --arm()--> Armed --fire()--> Fired
//! ```
//!
//! - `Unarmed` and never touched: the reconciler falls back to best-effort
//!   text comparison.
//! - `Armed` but never `Fired`: the codemod only inspected the file; whatever
//!   the print stage would produce is discarded and the original text is
//!   returned verbatim. This protects against cosmetic re-printing noise.
//! - `fire()` without a prior `arm()` is a protocol violation, fatal for the
//!   file.
//!
//! The state lives in a [`ChangeSession`] handed to the codemod's plugin
//! factory and visitor, rather than in closures over mutable booleans, so the
//! reconciler can resolve the signal as an explicit value after the walk.

use serde_json::Value;

use crate::error::TransformError;

// ============================================================================
// Signal States
// ============================================================================

/// The three protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeSignal {
    /// No signal given; change detection falls back to text comparison.
    #[default]
    Unarmed,
    /// The codemod declared it will signal changes explicitly.
    Armed,
    /// The codemod declared this invocation mutated the tree.
    Fired,
}

/// What the reconciler should do after the visitor has walked the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalResolution {
    /// No signal was given; diff the printed text against the original.
    BestEffort,
    /// Armed but never fired: return the original text verbatim.
    ForcedUnchanged,
    /// Armed and fired: print and report the result.
    Changed,
}

// ============================================================================
// Session
// ============================================================================

/// Per-invocation protocol state plus codemod-attached result metadata.
///
/// One session is created per file per invocation and threaded through plugin
/// acquisition and the visitor walk. It is never shared across files.
#[derive(Debug, Default)]
pub struct ChangeSession {
    signal: ChangeSignal,
    violated: bool,
    meta: Option<Value>,
}

impl ChangeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare intent to signal tree changes explicitly.
    ///
    /// Idempotent; arming an already armed or fired session is a no-op.
    pub fn arm(&mut self) {
        if self.signal == ChangeSignal::Unarmed {
            self.signal = ChangeSignal::Armed;
        }
    }

    /// Declare that this invocation mutated the tree.
    ///
    /// Firing an unarmed session records a protocol violation; the violation
    /// is surfaced by [`resolve`](Self::resolve) rather than here, because
    /// the codemod calls this from inside its visitor where it has no way to
    /// propagate a runner error.
    pub fn fire(&mut self) {
        match self.signal {
            ChangeSignal::Armed | ChangeSignal::Fired => self.signal = ChangeSignal::Fired,
            ChangeSignal::Unarmed => self.violated = true,
        }
    }

    /// Attach an arbitrary value to the file's outcome.
    pub fn set_result_meta(&mut self, meta: Value) {
        self.meta = Some(meta);
    }

    /// Current protocol state.
    pub fn signal(&self) -> ChangeSignal {
        self.signal
    }

    /// Take the attached metadata, leaving the session empty.
    pub fn take_meta(&mut self) -> Option<Value> {
        self.meta.take()
    }

    /// Resolve the signal after the visitor walk.
    ///
    /// A recorded fire-before-arm violation always wins, regardless of what
    /// the visitor changed.
    pub fn resolve(&self) -> Result<SignalResolution, TransformError> {
        if self.violated {
            return Err(TransformError::fire_before_arm());
        }
        Ok(match self.signal {
            ChangeSignal::Unarmed => SignalResolution::BestEffort,
            ChangeSignal::Armed => SignalResolution::ForcedUnchanged,
            ChangeSignal::Fired => SignalResolution::Changed,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod transitions {
        use super::*;

        #[test]
        fn starts_unarmed() {
            let session = ChangeSession::new();
            assert_eq!(session.signal(), ChangeSignal::Unarmed);
        }

        #[test]
        fn arm_then_fire_reaches_fired() {
            let mut session = ChangeSession::new();
            session.arm();
            assert_eq!(session.signal(), ChangeSignal::Armed);
            session.fire();
            assert_eq!(session.signal(), ChangeSignal::Fired);
        }

        #[test]
        fn arm_is_idempotent() {
            let mut session = ChangeSession::new();
            session.arm();
            session.arm();
            assert_eq!(session.signal(), ChangeSignal::Armed);
            session.fire();
            session.arm();
            assert_eq!(session.signal(), ChangeSignal::Fired);
        }
    }

    mod resolution {
        use super::*;

        #[test]
        fn unarmed_resolves_to_best_effort() {
            let session = ChangeSession::new();
            assert_eq!(session.resolve().unwrap(), SignalResolution::BestEffort);
        }

        #[test]
        fn armed_without_fire_forces_unchanged() {
            let mut session = ChangeSession::new();
            session.arm();
            assert_eq!(session.resolve().unwrap(), SignalResolution::ForcedUnchanged);
        }

        #[test]
        fn armed_and_fired_resolves_to_changed() {
            let mut session = ChangeSession::new();
            session.arm();
            session.fire();
            assert_eq!(session.resolve().unwrap(), SignalResolution::Changed);
        }

        #[test]
        fn fire_without_arm_is_a_protocol_error() {
            let mut session = ChangeSession::new();
            session.fire();
            let err = session.resolve().unwrap_err();
            assert!(matches!(err, TransformError::Protocol { .. }));
        }

        #[test]
        fn late_arm_does_not_clear_a_violation() {
            let mut session = ChangeSession::new();
            session.fire();
            session.arm();
            assert!(session.resolve().is_err());
        }
    }

    mod metadata {
        use super::*;

        #[test]
        fn meta_survives_forced_unchanged_resolution() {
            let mut session = ChangeSession::new();
            session.arm();
            session.set_result_meta(json!({"inspected": true}));
            assert_eq!(session.resolve().unwrap(), SignalResolution::ForcedUnchanged);
            assert_eq!(session.take_meta(), Some(json!({"inspected": true})));
            assert_eq!(session.take_meta(), None);
        }
    }
}
