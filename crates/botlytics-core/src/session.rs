//! Session windowing — pure continue-vs-roll decision logic.
//!
//! Given a user's last-known activity and a new event's timestamp, decide
//! whether the event belongs to the existing session or starts a new one.
//! No I/O happens here; the orchestrator feeds in state read from the user
//! pointer and acts on the returned decision.
//!
//! A session id doubles as a recoverable timestamp: when the orchestrator
//! discovers that a session record referenced by a user pointer was never
//! durably written, [`recover_start_time`] reconstructs the start time from
//! the id itself so the creation write can be re-issued under the same id.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::KeyError;
use crate::row_key::{self, KeyFactory};

/// Default idle window: one hour.
pub const DEFAULT_SESSION_WINDOW_MS: u64 = 3_600_000;

/// State consumed by a windowing decision, read from the user pointer.
#[derive(Debug, Clone, Default)]
pub struct WindowState {
    /// Current session id on the pointer, if any.
    pub previous_session_id: Option<String>,
    /// Last interactive activity, milliseconds since the epoch.
    pub last_interaction_ms: Option<u64>,
    /// System-generated events must not start or extend a session.
    pub non_interactive: bool,
}

/// Outcome of a windowing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDecision {
    /// The session the interaction belongs to.
    pub session_id: String,
    /// Set only when a new session was rolled; `None` means continuation
    /// and no new session record is needed.
    pub started_at_ms: Option<u64>,
}

impl SessionDecision {
    /// True when this decision rolled a new session.
    #[must_use]
    pub fn rolled(&self) -> bool {
        self.started_at_ms.is_some()
    }
}

/// Decides session continuity against a configurable idle window.
///
/// The window is runtime-mutable and takes effect on the next decision
/// only; in-flight sessions are never re-evaluated.
#[derive(Debug)]
pub struct SessionWindower {
    window_ms: AtomicU64,
}

impl SessionWindower {
    #[must_use]
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms: AtomicU64::new(window_ms),
        }
    }

    /// Current idle window in milliseconds.
    #[must_use]
    pub fn window_ms(&self) -> u64 {
        self.window_ms.load(Ordering::Relaxed)
    }

    /// Replace the idle window. Effective on the next decision.
    pub fn set_window_ms(&self, window_ms: u64) {
        self.window_ms.store(window_ms, Ordering::Relaxed);
    }

    /// Decide whether `now_ms` continues the previous session or rolls a
    /// new one.
    ///
    /// Rules, in order:
    /// 1. No previous session: roll.
    /// 2. Non-interactive, or elapsed idle time within the window
    ///    (inclusive boundary — a session is still alive at exactly the
    ///    cutoff): continue.
    /// 3. Otherwise: roll.
    ///
    /// A pointer carrying a session id but no last-interaction timestamp is
    /// treated as an expired window: there is nothing for the window to
    /// extend, so interactive traffic rolls. A clock running backwards
    /// yields elapsed 0 and therefore continuation.
    pub fn decide(
        &self,
        factory: &mut KeyFactory,
        state: &WindowState,
        now_ms: u64,
    ) -> SessionDecision {
        if let Some(previous) = &state.previous_session_id {
            let alive = match state.last_interaction_ms {
                Some(last) => now_ms.saturating_sub(last) <= self.window_ms(),
                None => false,
            };
            if state.non_interactive || alive {
                return SessionDecision {
                    session_id: previous.clone(),
                    started_at_ms: None,
                };
            }
        }
        SessionDecision {
            session_id: factory.next_session_id(now_ms),
            started_at_ms: Some(now_ms),
        }
    }
}

impl Default for SessionWindower {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_WINDOW_MS)
    }
}

/// Reconstruct a session's start time from its identifier.
///
/// Used when the session record is absent despite a pointer referencing it
/// (the original creation write was lost): decoding the id is the sole
/// source of truth, and the re-issued creation write keeps the same id so a
/// logical session holds one id for its whole lifetime.
pub fn recover_start_time(session_id: &str) -> Result<u64, KeyError> {
    row_key::decode_timestamp(session_id)
}
