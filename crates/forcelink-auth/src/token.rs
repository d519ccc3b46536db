//! Session token record and redirect/refresh parsing.
//!
//! A login produces a redirect to the configured URI with all token fields
//! carried in the URL fragment. Parsing is total: unparsable input yields
//! empty fields, never an error, so a malformed redirect surfaces as a token
//! that fails downstream authentication rather than a crash in the browser
//! callback path.

use crate::client::RefreshResponse;
use crate::config::ConnectedApp;
use crate::error::AuthResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token issued by the identity provider for one authenticated user.
///
/// `refresh_token` is set once at login and never rotated by the provider;
/// every other credential field is overwritten wholesale on refresh. The
/// community fields are blank for non-community logins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    /// Pre-fragment portion of the callback URL, captured at parse time
    pub redirect_uri: String,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub community_url: String,
    #[serde(default)]
    pub community_id: String,
    pub signature: String,
    /// Granted scopes, split from the provider's `+`-delimited string
    pub scope: Vec<String>,
    pub instance_url: String,
    /// Full identity-service URL; the user id is derived from it
    pub identity_url: String,
    pub token_type: String,
    pub issued_at: String,
}

impl AuthToken {
    /// End-user id: the path segment after the last `/` of the identity URL,
    /// or the whole value when there is no usable slash. Derived on every
    /// call so it can never drift from `identity_url`.
    pub fn uid(&self) -> &str {
        let url = &self.identity_url;
        match url.rfind('/') {
            Some(pos) if pos + 1 < url.len() => &url[pos + 1..],
            _ => url,
        }
    }

    /// Copy of this token with the credential fields replaced from a refresh
    /// response. `refresh_token`, `redirect_uri` and the community fields are
    /// untouched.
    pub fn apply_refresh(&self, response: &RefreshResponse) -> AuthToken {
        let mut refreshed = self.clone();
        refreshed.access_token = response.access_token.clone();
        refreshed.token_type = response.token_type.clone();
        refreshed.identity_url = response.id.clone();
        refreshed.issued_at = response.issued_at.clone();
        refreshed.instance_url = response.instance_url.clone();
        refreshed.signature = response.signature.clone();
        refreshed.scope = split_scope(&response.scope);
        refreshed
    }

    /// Serialize for the token store.
    pub fn to_json(&self) -> AuthResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a stored token.
    pub fn from_json(raw: &str) -> AuthResult<AuthToken> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// True iff `url` is the configured login redirect. Case-sensitive prefix
/// match, no normalization.
pub fn is_redirect_reached(app: &ConnectedApp, url: &str) -> bool {
    url.starts_with(app.redirect_uri())
}

/// Parse a login redirect URL into a token.
///
/// Everything before the first `#` is the captured redirect URI; the
/// fragment is `&`-separated `key=value` pairs with keys and values
/// percent-decoded independently. Missing keys map to empty fields.
pub fn parse_login_redirect(url: &str) -> AuthToken {
    let (redirect_uri, fragment) = match url.split_once('#') {
        Some((before, after)) => (before, after),
        None => (url, ""),
    };

    let mut vars: HashMap<String, String> = HashMap::new();
    for pair in fragment.split('&') {
        let mut parts = pair.split('=');
        let first = parts.next().unwrap_or("");
        let last = parts.last().unwrap_or(first);
        vars.insert(percent_decode(first), percent_decode(last));
    }

    let field = |key: &str| vars.get(key).cloned().unwrap_or_default();

    AuthToken {
        redirect_uri: redirect_uri.to_string(),
        access_token: field("access_token"),
        refresh_token: field("refresh_token"),
        community_url: field("sfdc_community_url"),
        community_id: field("sfdc_community_id"),
        signature: field("signature"),
        scope: vars.get("scope").map(|s| split_scope(s)).unwrap_or_default(),
        instance_url: field("instance_url"),
        identity_url: field("id"),
        token_type: field("token_type"),
        issued_at: field("issued_at"),
    }
}

fn split_scope(raw: &str) -> Vec<String> {
    raw.split('+').map(str::to_string).collect()
}

/// Decode `%XX` escapes. `+` is left alone: the scope grammar splits on the
/// literal character after decoding.
fn percent_decode(s: &str) -> String {
    let mut bytes = Vec::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                bytes.push(byte);
            }
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }

    String::from_utf8_lossy(&bytes).to_string()
}
