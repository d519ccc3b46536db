//! HTTP client for the identity provider's token endpoints.

use crate::config::ConnectedApp;
use crate::error::{AuthError, AuthResult};
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Body of a successful token refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub id: String,
    pub issued_at: String,
    pub instance_url: String,
    pub signature: String,
    pub access_token: String,
    pub token_type: String,
    /// Space- or plus-delimited scope string, re-split by the token codec
    pub scope: String,
}

/// Definitive outcome of a refresh call that reached the provider.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// HTTP 200 with a parsable body; the session continues
    Accepted(RefreshResponse),
    /// The provider answered with anything else; the refresh token is
    /// considered permanently invalid
    Rejected { status: u16, body: String },
}

/// Client for the identity provider's refresh and revoke endpoints.
#[derive(Clone, Default)]
pub struct SessionClient {
    http_client: reqwest::Client,
}

impl SessionClient {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Transport-level failures (DNS, connect, timeout) return
    /// `AuthError::Unreachable` and must be handled without discarding the
    /// session; any HTTP answer other than a parsable 200 is a rejection.
    pub async fn refresh(
        &self,
        app: &ConnectedApp,
        refresh_token: &str,
    ) -> AuthResult<RefreshOutcome> {
        let url = app.token_endpoint();

        debug!(url = %url, "Refreshing session token");

        let response = self
            .http_client
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", app.client_id()),
                ("client_secret", app.client_secret()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = %status,
                body_summary = %summarize_response_body(&body),
                "Token refresh rejected by identity provider"
            );
            return Ok(RefreshOutcome::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(classify_transport)?;
        let parsed: RefreshResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(
                body_summary = %summarize_response_body(&body),
                "Token refresh returned 200 with an unparsable body"
            );
            AuthError::Json(e)
        })?;

        debug!("Token refresh accepted");
        Ok(RefreshOutcome::Accepted(parsed))
    }

    /// Revoke an access token. Callers treat failures as best-effort.
    pub async fn revoke(&self, app: &ConnectedApp, access_token: &str) -> AuthResult<()> {
        let url = app.revoke_endpoint();

        debug!(url = %url, "Revoking access token");

        let response = self
            .http_client
            .post(&url)
            .form(&[("token", access_token)])
            .send()
            .await
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = %status,
                body_summary = %summarize_response_body(&body),
                "Token revocation was not accepted"
            );
            return Err(AuthError::ServerUnsuccessful {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Map a protected-resource response onto the session error taxonomy:
/// 401 means the access token must be refreshed, any other non-2xx is
/// surfaced as-is and is not an auth failure.
pub fn classify_protected_response(status: u16, body: &str) -> AuthResult<()> {
    if status == 401 {
        return Err(AuthError::SessionExpired);
    }
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(AuthError::ServerUnsuccessful {
            status,
            body: body.to_string(),
        })
    }
}

fn classify_transport(err: reqwest::Error) -> AuthError {
    if err.is_connect() || err.is_timeout() {
        AuthError::Unreachable(err)
    } else {
        AuthError::Http(err)
    }
}
