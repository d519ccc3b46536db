//! Login-redirect detection over an embedded browser surface.

use crate::config::ConnectedApp;
use crate::token::{self, AuthToken};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Contract of the embedded browser used to display the login page.
///
/// The core never touches rendering; it issues `load` and reacts to the
/// navigation events the host feeds into the watcher.
pub trait BrowserSurface {
    /// Navigate the browser to a URL.
    fn load(&self, url: &str);

    /// Stop loading further content.
    fn stop_loading(&self);
}

/// Watches navigation events for the configured redirect URI and delivers
/// the parsed token to a single subscriber, at most once per login attempt.
pub struct RedirectWatcher {
    app: ConnectedApp,
    tx: Option<oneshot::Sender<AuthToken>>,
}

impl RedirectWatcher {
    /// Create a watcher and the receiver the login completion handler
    /// awaits.
    pub fn new(app: ConnectedApp) -> (Self, oneshot::Receiver<AuthToken>) {
        let (tx, rx) = oneshot::channel();
        (Self { app, tx: Some(tx) }, rx)
    }

    /// Point the browser at the provider's login page.
    pub fn open_login_page<S: BrowserSurface + ?Sized>(&self, surface: &S, device_id: &str) {
        let url = self.app.authorization_url(device_id);
        debug!(url = %url, "Loading login page");
        surface.load(&url);
    }

    /// Feed one "page navigation started" event from the browser surface.
    ///
    /// On the first URL matching the redirect URI the fragment is parsed,
    /// the token is emitted and the surface is told to stop loading. Later
    /// events are ignored.
    pub fn on_navigation_started<S: BrowserSurface + ?Sized>(&mut self, surface: &S, url: &str) {
        if self.tx.is_none() {
            return;
        }
        if !token::is_redirect_reached(&self.app, url) {
            return;
        }

        let parsed = token::parse_login_redirect(url);
        info!(uid = %parsed.uid(), "Login redirect reached");

        if let Some(tx) = self.tx.take() {
            let _ = tx.send(parsed);
        }
        surface.stop_loading();
    }

    /// True once a redirect has been detected and delivered.
    pub fn has_fired(&self) -> bool {
        self.tx.is_none()
    }
}
