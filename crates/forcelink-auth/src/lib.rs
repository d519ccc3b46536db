//! OAuth2 session management for Salesforce-style identity providers.
//!
//! This crate provides:
//! - Implicit-grant login via redirect detection over an embedded browser
//!   surface
//! - Redirect-fragment parsing into a persistent token record
//! - Session management with token refresh against the provider's token
//!   endpoint and explicit FSM-based state tracking
//! - Integration with a pluggable single-slot token store

mod client;
mod config;
mod error;
mod fsm;
mod redirect;
mod session;
mod store;
mod token;

pub use client::{classify_protected_response, RefreshOutcome, RefreshResponse, SessionClient};
pub use config::{ConnectedApp, Environment};
pub use error::{AuthError, AuthResult};
pub use fsm::session_machine;
pub use fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionState};
pub use redirect::{BrowserSurface, RedirectWatcher};
pub use session::{SessionController, SessionStateCallback};
pub use store::TokenStore;
pub use token::{is_redirect_reached, parse_login_redirect, AuthToken};
