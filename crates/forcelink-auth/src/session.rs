//! Session controller: login completion, refresh-on-demand and logout.
//!
//! One `SessionController` instance is owned by the host application and
//! shared by reference; there is no process-wide state. Mutating operations
//! are serialized on an internal lock so overlapping calls can never
//! interleave their read-modify-write of the persisted token.

use crate::client::{RefreshOutcome, SessionClient};
use crate::config::ConnectedApp;
use crate::error::{AuthError, AuthResult};
use crate::fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionState};
use crate::store::TokenStore;
use crate::token::AuthToken;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Callback type for session state change notifications.
pub type SessionStateCallback = Box<dyn Fn(SessionState) + Send + Sync>;

struct Shared {
    fsm: SessionMachine,
    token: Option<AuthToken>,
}

enum TokenUpdate {
    Keep,
    Set(AuthToken),
    Clear,
}

/// Owner of the session lifecycle.
///
/// Holds the current token, drives the lifecycle state machine and keeps the
/// persisted blob in step with the in-memory record. Read-only queries see
/// either the pre- or post-operation state, never a partial token.
pub struct SessionController {
    app: ConnectedApp,
    store: TokenStore,
    client: SessionClient,
    /// Serializes mutating operations, held across the network await.
    op_lock: tokio::sync::Mutex<()>,
    /// Atomic snapshot read by queries and committed to by operations.
    shared: Mutex<Shared>,
    state_callback: Mutex<Option<SessionStateCallback>>,
}

impl SessionController {
    /// Create a controller for the given connected app.
    pub fn new(app: ConnectedApp, store: TokenStore, client: SessionClient) -> Self {
        Self {
            app,
            store,
            client,
            op_lock: tokio::sync::Mutex::new(()),
            shared: Mutex::new(Shared {
                fsm: SessionMachine::new(),
                token: None,
            }),
            state_callback: Mutex::new(None),
        }
    }

    /// Set a callback to be notified of session state changes.
    pub fn set_state_callback(&self, callback: SessionStateCallback) {
        let mut cb = self.state_callback.lock().unwrap();
        *cb = Some(callback);
    }

    /// The connected app this controller authenticates against.
    pub fn connected_app(&self) -> &ConnectedApp {
        &self.app
    }

    /// Current externally observable session state.
    pub fn state(&self) -> SessionState {
        let shared = self.shared.lock().unwrap();
        SessionState::from(shared.fsm.state())
    }

    /// True if a user has logged in and has not logged out.
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Snapshot of the current token record.
    pub fn current_token(&self) -> Option<AuthToken> {
        self.shared.lock().unwrap().token.clone()
    }

    /// Bearer token for protected-resource calls.
    pub fn access_token(&self) -> AuthResult<String> {
        let shared = self.shared.lock().unwrap();
        shared
            .token
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Authorization URL the login browser surface should load.
    pub fn authorization_url(&self, device_id: &str) -> String {
        self.app.authorization_url(device_id)
    }

    /// Load a previously persisted session at startup.
    ///
    /// Returns true if a stored token was found and the session is now
    /// authenticated.
    pub async fn restore(&self) -> AuthResult<bool> {
        let _op = self.op_lock.lock().await;
        let before = self.state();

        let token = match self.store.load()? {
            Some(token) => token,
            None => {
                debug!("No stored session token found");
                return Ok(false);
            }
        };

        {
            let mut shared = self.shared.lock().unwrap();
            if *shared.fsm.state() == SessionMachineState::Unauthenticated {
                Self::consume(&mut shared, &SessionMachineInput::TokenRestored)?;
            }
            shared.token = Some(token);
        }
        self.notify_if_changed(before);

        info!("Stored session restored");
        Ok(true)
    }

    /// Persist a freshly parsed login token and mark the session
    /// authenticated. No network call is made.
    pub async fn complete_login(&self, token: AuthToken) -> AuthResult<()> {
        let _op = self.op_lock.lock().await;
        let before = self.state();

        info!(uid = %token.uid(), "Login completed");

        {
            let mut shared = self.shared.lock().unwrap();
            Self::consume(&mut shared, &SessionMachineInput::LoginCompleted)?;
            self.store.save(Some(&token))?;
            shared.token = Some(token);
        }
        self.notify_if_changed(before);

        Ok(())
    }

    /// Refresh the session against the identity provider.
    ///
    /// On acceptance the merged token is persisted and returned. On
    /// rejection the session is cleared and `RefreshFailed` is surfaced; the
    /// user must log in again. When the provider is unreachable nothing
    /// changes and the same `Unreachable` error is surfaced on every retry.
    pub async fn refresh_session(&self) -> AuthResult<AuthToken> {
        let _op = self.op_lock.lock().await;
        let before = self.state();

        let token = match self.current_or_stored_token()? {
            Some(token) => token,
            None => return Err(AuthError::NotAuthenticated),
        };

        let outcome = self.client.refresh(&self.app, &token.refresh_token).await;

        // State is committed only once the call has a definitive outcome; a
        // caller dropping the future mid-flight leaves the session untouched.
        let result = match outcome {
            Ok(RefreshOutcome::Accepted(response)) => {
                let refreshed = token.apply_refresh(&response);
                self.commit_refresh(
                    &token,
                    &SessionMachineInput::RefreshSucceeded,
                    TokenUpdate::Set(refreshed.clone()),
                )?;
                info!(uid = %refreshed.uid(), "Session token refreshed");
                Ok(refreshed)
            }
            Ok(RefreshOutcome::Rejected { status, body }) => {
                self.commit_refresh(
                    &token,
                    &SessionMachineInput::RefreshRejected,
                    TokenUpdate::Clear,
                )?;
                warn!(status, "Token refresh rejected; session cleared");
                Err(AuthError::RefreshFailed { status, body })
            }
            Err(err) => {
                self.commit_refresh(
                    &token,
                    &SessionMachineInput::RefreshDeferred,
                    TokenUpdate::Keep,
                )?;
                debug!(error = %err, "Token refresh deferred");
                Err(err)
            }
        };

        self.notify_if_changed(before);
        result
    }

    /// Log the user out.
    ///
    /// The access token is revoked best-effort; local logout completes even
    /// when the revoke call fails. A no-op when no session exists.
    pub async fn logout(&self) -> AuthResult<()> {
        let _op = self.op_lock.lock().await;
        let before = self.state();

        let token = match self.current_or_stored_token()? {
            Some(token) => token,
            None => {
                debug!("Logout requested with no active session");
                return Ok(());
            }
        };

        if let Err(err) = self.client.revoke(&self.app, &token.access_token).await {
            warn!(error = %err, "Token revocation failed; continuing local logout");
        }

        {
            let mut shared = self.shared.lock().unwrap();
            // Tolerant: the token may have come straight from storage while
            // the machine never saw a login.
            let _ = shared.fsm.consume(&SessionMachineInput::LogoutRequested);
            let _ = shared.fsm.consume(&SessionMachineInput::LogoutComplete);
            self.store.save(None)?;
            shared.token = None;
        }
        self.notify_if_changed(before);

        info!("Logged out");
        Ok(())
    }

    /// Current in-memory token, falling back to storage when the controller
    /// has not restored one yet.
    fn current_or_stored_token(&self) -> AuthResult<Option<AuthToken>> {
        {
            let shared = self.shared.lock().unwrap();
            if let Some(token) = &shared.token {
                return Ok(Some(token.clone()));
            }
        }
        self.store.load()
    }

    /// Apply the outcome of a refresh in one atomic commit: restore the
    /// machine first when the token came straight from storage, then walk
    /// it through the refresh transitions and update token and store.
    fn commit_refresh(
        &self,
        token: &AuthToken,
        terminal: &SessionMachineInput,
        update: TokenUpdate,
    ) -> AuthResult<()> {
        let mut shared = self.shared.lock().unwrap();

        if *shared.fsm.state() == SessionMachineState::Unauthenticated {
            Self::consume(&mut shared, &SessionMachineInput::TokenRestored)?;
            shared.token = Some(token.clone());
        }
        Self::consume(&mut shared, &SessionMachineInput::RefreshStarted)?;
        Self::consume(&mut shared, terminal)?;

        match update {
            TokenUpdate::Keep => {}
            TokenUpdate::Set(new_token) => {
                self.store.save(Some(&new_token))?;
                shared.token = Some(new_token);
            }
            TokenUpdate::Clear => {
                self.store.save(None)?;
                shared.token = None;
            }
        }

        Ok(())
    }

    fn consume(shared: &mut Shared, input: &SessionMachineInput) -> AuthResult<()> {
        shared.fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                shared.fsm.state()
            ))
        })?;
        Ok(())
    }

    fn notify_if_changed(&self, before: SessionState) {
        let now = self.state();
        if now == before {
            return;
        }

        debug!(from = ?before, to = ?now, "Session state changed");

        let cb = self.state_callback.lock().unwrap();
        if let Some(callback) = cb.as_ref() {
            callback(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::parse_login_redirect;
    use forcelink_store::{StoreResult, TokenSlot};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Shared in-memory slot so tests can inspect the raw persisted blob.
    #[derive(Clone, Default)]
    struct SharedSlot {
        value: Arc<Mutex<Option<String>>>,
    }

    impl SharedSlot {
        fn new() -> Self {
            Self::default()
        }

        fn raw(&self) -> Option<String> {
            self.value.lock().unwrap().clone()
        }
    }

    impl TokenSlot for SharedSlot {
        fn get(&self) -> StoreResult<Option<String>> {
            Ok(self.value.lock().unwrap().clone())
        }

        fn set(&self, value: &str) -> StoreResult<()> {
            *self.value.lock().unwrap() = Some(value.to_string());
            Ok(())
        }
    }

    const REDIRECT: &str = "https://app.example.com/cb#access_token=AT1\
        &refresh_token=RT1&id=https://login.x.com/id/00D/005&issued_at=1\
        &signature=sig&token_type=Bearer&instance_url=https://inst.x.com\
        &scope=api+web";

    fn sample_token() -> AuthToken {
        parse_login_redirect(REDIRECT)
    }

    fn refresh_body() -> serde_json::Value {
        serde_json::json!({
            "id": "https://login.x.com/id/00D/005",
            "issued_at": "2",
            "instance_url": "https://inst2.x.com",
            "signature": "sig2",
            "access_token": "AT2",
            "token_type": "Bearer",
            "scope": "api+web"
        })
    }

    fn controller_for(refresh_base: &str, slot: SharedSlot) -> SessionController {
        let app = ConnectedApp::with_refresh_endpoint(
            "https://na1.example.com",
            refresh_base.to_string(),
            "client-id",
            "client-secret",
            "https://app.example.com/cb",
            vec!["api".to_string(), "web".to_string()],
        )
        .unwrap();
        SessionController::new(app, TokenStore::new(Box::new(slot)), SessionClient::new())
    }

    fn offline_controller(slot: SharedSlot) -> SessionController {
        // Nothing listens on port 1
        controller_for("http://127.0.0.1:1/", slot)
    }

    #[tokio::test]
    async fn test_restore_with_empty_store() {
        let controller = offline_controller(SharedSlot::new());
        assert!(!controller.restore().await.unwrap());
        assert!(!controller.is_authenticated());
        assert_eq!(controller.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_restore_with_stored_token() {
        let slot = SharedSlot::new();
        let controller = offline_controller(slot.clone());
        controller.complete_login(sample_token()).await.unwrap();

        let controller = offline_controller(slot);
        assert!(controller.restore().await.unwrap());
        assert!(controller.is_authenticated());
        assert_eq!(controller.current_token().unwrap().access_token, "AT1");
    }

    #[tokio::test]
    async fn test_complete_login_persists_and_authenticates() {
        let slot = SharedSlot::new();
        let controller = offline_controller(slot.clone());

        assert!(!controller.is_authenticated());
        controller.complete_login(sample_token()).await.unwrap();

        assert!(controller.is_authenticated());
        assert_eq!(controller.access_token().unwrap(), "AT1");
        assert!(slot.raw().unwrap().contains("AT1"));
    }

    #[tokio::test]
    async fn test_refresh_without_token() {
        let controller = offline_controller(SharedSlot::new());
        let err = controller.refresh_session().await.unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
        assert!(!controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_success_merges_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(refresh_body()))
            .mount(&server)
            .await;

        let slot = SharedSlot::new();
        let controller = controller_for(&format!("{}/", server.uri()), slot.clone());
        controller.complete_login(sample_token()).await.unwrap();

        let refreshed = controller.refresh_session().await.unwrap();
        assert_eq!(refreshed.access_token, "AT2");
        assert_eq!(refreshed.refresh_token, "RT1");
        assert_eq!(refreshed.instance_url, "https://inst2.x.com");
        assert!(controller.is_authenticated());

        // The persisted blob reflects the refreshed token
        let raw = slot.raw().unwrap();
        assert!(raw.contains("AT2"));
        assert!(raw.contains("RT1"));
    }

    #[tokio::test]
    async fn test_refresh_uses_stored_token_without_restore() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(refresh_body()))
            .mount(&server)
            .await;

        let slot = SharedSlot::new();
        let seeded = offline_controller(slot.clone());
        seeded.complete_login(sample_token()).await.unwrap();

        // Fresh controller, no restore() call
        let controller = controller_for(&format!("{}/", server.uri()), slot);
        let refreshed = controller.refresh_session().await.unwrap();
        assert_eq!(refreshed.access_token, "AT2");
        assert!(controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_rejection_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let slot = SharedSlot::new();
        let controller = controller_for(&format!("{}/", server.uri()), slot.clone());
        controller.complete_login(sample_token()).await.unwrap();

        let err = controller.refresh_session().await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed { status: 401, .. }));
        assert!(err.requires_login());

        assert!(!controller.is_authenticated());
        assert!(controller.current_token().is_none());
        // Cleared slot loads as no token
        let store = TokenStore::new(Box::new(slot));
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_unreachable_preserves_session() {
        let slot = SharedSlot::new();
        let controller = offline_controller(slot.clone());
        controller.complete_login(sample_token()).await.unwrap();
        let raw_before = slot.raw();

        let err = controller.refresh_session().await.unwrap_err();
        assert!(err.is_unreachable());
        assert!(controller.is_authenticated());
        assert_eq!(slot.raw(), raw_before);

        // Repeated attempts surface the same outcome with no state change
        let err = controller.refresh_session().await.unwrap_err();
        assert!(err.is_unreachable());
        assert!(controller.is_authenticated());
        assert_eq!(slot.raw(), raw_before);
    }

    #[tokio::test]
    async fn test_logout_revokes_and_clears() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/revoke"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let slot = SharedSlot::new();
        let controller = controller_for(&format!("{}/", server.uri()), slot.clone());
        controller.complete_login(sample_token()).await.unwrap();

        controller.logout().await.unwrap();
        assert!(!controller.is_authenticated());
        assert!(controller.current_token().is_none());
        assert_eq!(slot.raw(), Some(String::new()));
    }

    #[tokio::test]
    async fn test_logout_completes_when_revoke_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/revoke"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let controller = controller_for(&format!("{}/", server.uri()), SharedSlot::new());
        controller.complete_login(sample_token()).await.unwrap();

        controller.logout().await.unwrap();
        assert!(!controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_without_session_is_noop() {
        let controller = offline_controller(SharedSlot::new());
        controller.logout().await.unwrap();
        assert!(!controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_and_logout_never_interleave() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(refresh_body())
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/revoke"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
            .mount(&server)
            .await;

        let slot = SharedSlot::new();
        let controller =
            Arc::new(controller_for(&format!("{}/", server.uri()), slot.clone()));
        controller.complete_login(sample_token()).await.unwrap();
        let original = slot.raw().unwrap();

        let refresher = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.refresh_session().await })
        };
        let logouter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.logout().await })
        };
        let _ = refresher.await.unwrap();
        logouter.await.unwrap().unwrap();

        // Whatever the interleaving, the slot holds a complete state: the
        // original blob, the refreshed blob, or cleared.
        let raw = slot.raw().unwrap();
        let refreshed = sample_token()
            .apply_refresh(&serde_json::from_value(refresh_body()).unwrap())
            .to_json()
            .unwrap();
        assert!(
            raw.is_empty() || raw == original || raw == refreshed,
            "slot left in partial state: {raw}"
        );
    }

    #[tokio::test]
    async fn test_state_callback_notified() {
        let slot = SharedSlot::new();
        let controller = offline_controller(slot);

        let seen: Arc<Mutex<Vec<SessionState>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        controller.set_state_callback(Box::new(move |state| {
            sink.lock().unwrap().push(state);
        }));

        controller.complete_login(sample_token()).await.unwrap();
        // Unreachable refresh: no state change, no notification
        let _ = controller.refresh_session().await;
        controller.logout().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![SessionState::Authenticated, SessionState::Unauthenticated]
        );
    }

    #[tokio::test]
    async fn test_authorization_url_delegates_to_app() {
        let controller = offline_controller(SharedSlot::new());
        let url = controller.authorization_url("device-9");
        assert!(url.starts_with("https://na1.example.com/services/oauth2/authorize?"));
        assert!(url.contains("&scope=api%20web&"));
        assert!(url.ends_with("&device_id=device-9"));
    }
}
