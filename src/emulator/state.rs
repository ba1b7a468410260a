//! Engine session states.

use std::sync::Mutex;

use strum::{Display, EnumIter};

/// Lifecycle state of a [`crate::emulator::Session`].
///
/// ```text
/// NotStarted ──boot──▶ Starting ──page loaded──▶ Ready ◀──────┐
///                         │                      │  ▲        │
///                    boot failure             execute │      hide
///                         ▼                      ▼  │        │
///                       Error ◀──work failed── Executing   Hidden
/// ```
///
/// `Error` and `Hidden` still accept executions; `shutdown` returns to `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum SessionState {
    /// No engine thread
    NotStarted,
    /// The engine thread is loading a page
    Starting,
    /// A page is loaded and no work is running
    Ready,
    /// A posted unit of work is running
    Executing,
    /// The last boot or unit of work failed
    Error,
    /// The session was hidden; engine and registrations persist
    Hidden,
}

impl SessionState {
    /// Returns `true` if a page is loaded and work can be posted.
    #[must_use]
    pub fn accepts_work(self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Executing | SessionState::Error | SessionState::Hidden
        )
    }
}

#[derive(Debug)]
struct Phase {
    state: SessionState,
    page_ready: bool,
}

/// The state of a session plus whether its engine has a page.
#[derive(Debug)]
pub(crate) struct StateCell {
    phase: Mutex<Phase>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        StateCell {
            phase: Mutex::new(Phase {
                state: SessionState::NotStarted,
                page_ready: false,
            }),
        }
    }

    pub(crate) fn get(&self) -> SessionState {
        lock!(self.phase).state
    }

    pub(crate) fn page_ready(&self) -> bool {
        lock!(self.phase).page_ready
    }

    /// Moves to `state`, logging the transition.
    pub(crate) fn set(&self, state: SessionState) {
        let mut phase = lock!(self.phase);
        if phase.state != state {
            log::info!("session state {} -> {}", phase.state, state);
            phase.state = state;
        }
    }

    pub(crate) fn set_page_ready(&self, ready: bool) {
        lock!(self.phase).page_ready = ready;
    }

    /// Moves to `to` only if the current state is one of `from`.
    pub(crate) fn transition(&self, from: &[SessionState], to: SessionState) -> bool {
        let mut phase = lock!(self.phase);
        if !from.contains(&phase.state) {
            return false;
        }
        if phase.state != to {
            log::info!("session state {} -> {}", phase.state, to);
            phase.state = to;
        }
        true
    }
}
