//! Session lifecycle state machine using rust-fsm.
//!
//! The machine is the single authority on which lifecycle steps are legal;
//! the controller consumes inputs and maps illegal transitions to errors
//! instead of deriving state from storage checks.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐  TokenRestored / LoginCompleted  ┌─────────────────┐
//! │ Unauthenticated │ ───────────────────────────────► │  Authenticated  │
//! └─────────────────┘                                  └───────┬─────────┘
//!          ▲                                                   │
//!          │ RefreshRejected          RefreshStarted │         │ LogoutRequested
//!          │                                         ▼         ▼
//!          │                                ┌────────────┐ ┌────────────┐
//!          ├─────────────────────────────── │ Refreshing │ │ LoggingOut │
//!          │                                └──────┬─────┘ └─────┬──────┘
//!          │     RefreshSucceeded / RefreshDeferred │            │
//!          │              (back to Authenticated) ◄─┘            │
//!          └─────────────────────────────────────────────────────┘
//!                              LogoutComplete
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Define the FSM using rust-fsm's declarative macro. This generates a module
// `session_machine` with:
// - session_machine::State (enum)
// - session_machine::Input (enum)
// - session_machine::StateMachine (type alias)
// - session_machine::Impl (trait impl)
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unauthenticated)

    Unauthenticated => {
        TokenRestored => Authenticated,
        LoginCompleted => Authenticated
    },
    Authenticated => {
        // A second login replaces the current session
        LoginCompleted => Authenticated,
        RefreshStarted => Refreshing,
        LogoutRequested => LoggingOut
    },
    Refreshing => {
        RefreshSucceeded => Authenticated,
        // Provider unreachable: the session is kept and the refresh is
        // postponed to the caller's next attempt
        RefreshDeferred => Authenticated,
        RefreshRejected => Unauthenticated
    },
    LoggingOut => {
        LogoutComplete => Unauthenticated
    }
}

// Re-export the generated types with clearer names
pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally observable session state.
///
/// Refresh and logout are atomic from the caller's perspective, so the
/// internal `Refreshing`/`LoggingOut` machine states collapse onto
/// `Authenticated` here: the session still holds a token until the
/// operation reaches a definitive outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No token held; the user must log in.
    Unauthenticated,
    /// A token is held and usable for protected calls.
    Authenticated,
}

impl SessionState {
    /// Returns true if the session holds a token.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unauthenticated => SessionState::Unauthenticated,
            SessionMachineState::Authenticated
            | SessionMachineState::Refreshing
            | SessionMachineState::LoggingOut => SessionState::Authenticated,
        }
    }
}
