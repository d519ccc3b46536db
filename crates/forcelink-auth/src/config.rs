//! Connected-app configuration.

use crate::error::{AuthError, AuthResult};
use url::Url;

const AUTHORIZE_PATH: &str = "/services/oauth2/authorize";
const TOKEN_PATH: &str = "services/oauth2/token";
const REVOKE_PATH: &str = "services/oauth2/revoke";

/// Identity provider environment. Selects the fixed auth base URL used for
/// token refresh and revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Sandbox,
}

impl Environment {
    /// Base URL of the environment's auth server. Always ends with `/`.
    pub fn auth_base(&self) -> &'static str {
        match self {
            Environment::Production => "https://login.salesforce.com/",
            Environment::Sandbox => "https://test.salesforce.com/",
        }
    }
}

/// Immutable OAuth client configuration supplied by the host application.
#[derive(Debug, Clone)]
pub struct ConnectedApp {
    endpoint: String,
    refresh_base: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scope: Vec<String>,
}

impl ConnectedApp {
    /// Create a connected app for the given environment.
    ///
    /// `endpoint` is the API server base URL and must not end with a forward
    /// slash. The token refresh and revoke endpoints are derived from
    /// `environment`.
    pub fn new(
        environment: Environment,
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: Vec<String>,
    ) -> AuthResult<Self> {
        Self::build(
            endpoint.into(),
            environment.auth_base().to_string(),
            client_id.into(),
            client_secret.into(),
            redirect_uri.into(),
            scope,
        )
    }

    /// Create a connected app with an explicit refresh endpoint instead of an
    /// environment selection. The endpoint must end with a forward slash.
    pub fn with_refresh_endpoint(
        endpoint: impl Into<String>,
        refresh_token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: Vec<String>,
    ) -> AuthResult<Self> {
        let refresh_base = refresh_token_endpoint.into();
        if !refresh_base.ends_with('/') {
            return Err(AuthError::Config(
                "The refreshTokenEndpoint must end with a forward slash.".to_string(),
            ));
        }
        Url::parse(&refresh_base).map_err(|e| {
            AuthError::Config(format!("refresh token endpoint is not a valid URL: {e}"))
        })?;

        Self::build(
            endpoint.into(),
            refresh_base,
            client_id.into(),
            client_secret.into(),
            redirect_uri.into(),
            scope,
        )
    }

    fn build(
        endpoint: String,
        refresh_base: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        scope: Vec<String>,
    ) -> AuthResult<Self> {
        if endpoint.ends_with('/') {
            return Err(AuthError::Config(
                "The endpoint must not end with a forward slash.".to_string(),
            ));
        }
        Url::parse(&endpoint)
            .map_err(|e| AuthError::Config(format!("endpoint is not a valid URL: {e}")))?;
        Url::parse(&redirect_uri)
            .map_err(|e| AuthError::Config(format!("redirect URI is not a valid URL: {e}")))?;

        Ok(Self {
            endpoint,
            refresh_base,
            client_id,
            client_secret,
            redirect_uri,
            scope,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// Token refresh endpoint on the auth server.
    pub fn token_endpoint(&self) -> String {
        format!("{}{}", self.refresh_base, TOKEN_PATH)
    }

    /// Token revocation endpoint on the auth server.
    pub fn revoke_endpoint(&self) -> String {
        format!("{}{}", self.refresh_base, REVOKE_PATH)
    }

    /// Build the authorization URL an embedded browser should load to start
    /// the login flow.
    ///
    /// Scopes are joined with a literal `%20`, order preserved; the whole
    /// `scope` parameter is omitted when the list is empty.
    pub fn authorization_url(&self, device_id: &str) -> String {
        let mut url = String::new();
        url.push_str(&self.endpoint);
        url.push_str(AUTHORIZE_PATH);
        url.push_str("?display=touch");
        url.push_str("&response_type=token");
        url.push_str(&format!("&client_id={}", self.client_id));

        if !self.scope.is_empty() {
            url.push_str(&format!("&scope={}", self.scope.join("%20")));
        }

        url.push_str(&format!("&redirect_uri={}", self.redirect_uri));
        url.push_str(&format!("&device_id={}", device_id));
        url
    }
}
