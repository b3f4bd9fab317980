//! Process-wide authentication state.
//!
//! The hub owns one [`AuthState`] cell (a `watch` channel). It starts in
//! `Pending`, is settled by a single session poll, and then follows provider
//! events. Readers hold a `watch::Receiver` and see every distinct state;
//! a state equal to the current one is never republished.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use green_basket_core::{AuthEvent, AuthState};

use super::client::{AuthClient, Subscription};

/// Default pause between signing out and leaving the page.
pub const DEFAULT_SIGN_OUT_DELAY: Duration = Duration::from_millis(300);

/// Where the hub sends the user after signing out.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Navigator that only logs (headless use).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        debug!(path, "navigate");
    }
}

/// Owner of the shared auth state.
///
/// Dropping the hub stops the event listener and releases its subscription.
pub struct SessionHub {
    state: watch::Sender<AuthState>,
    client: Arc<AuthClient>,
    navigator: Arc<dyn Navigator>,
    sign_out_delay: Duration,
    listener: JoinHandle<()>,
}

impl SessionHub {
    /// Subscribe to provider events, then poll the session once.
    ///
    /// A `code` (or `token`) query parameter on `current_url` is exchanged
    /// for a session first; if that fails or there is none, the stored
    /// session decides. Events that arrive during the poll are applied after
    /// its result, in order.
    pub async fn start(
        client: Arc<AuthClient>,
        current_url: Option<&Url>,
        navigator: Arc<dyn Navigator>,
        sign_out_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Pending);
        let subscription = client.on_auth_state_change();

        let polled = poll(&client, current_url).await;
        info!(authenticated = polled.is_authenticated(), "initial auth state");
        publish(&state, polled);

        let listener = tokio::spawn(listen(subscription, state.clone()));

        Self {
            state,
            client,
            navigator,
            sign_out_delay,
            listener,
        }
    }

    /// Receiver for state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn client(&self) -> &Arc<AuthClient> {
        &self.client
    }

    /// Sign out.
    ///
    /// Local artifacts are cleared and `Unauthenticated` is published before
    /// this returns. Provider revocation runs in the background, and the
    /// navigator is sent to `/` once the sign-out delay has passed. The
    /// returned handle completes after both.
    pub async fn sign_out(&self) -> JoinHandle<()> {
        let tokens = self.client.clear_local().await;
        publish(&self.state, AuthState::Unauthenticated);

        let revoke = tokens.map(|tokens| {
            let client = Arc::clone(&self.client);
            tokio::spawn(async move { client.revoke(&tokens).await })
        });

        let navigator = Arc::clone(&self.navigator);
        let delay = self.sign_out_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            navigator.navigate("/");
            if let Some(revoke) = revoke {
                if let Err(e) = revoke.await {
                    warn!(error = %e, "sign-out revocation task failed");
                }
            }
        })
    }
}

impl Drop for SessionHub {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn poll(client: &AuthClient, current_url: Option<&Url>) -> AuthState {
    if let Some(code) = current_url.and_then(auth_code) {
        match client.exchange_code_for_session(&code).await {
            Ok(user) => return AuthState::Authenticated(user),
            Err(e) => warn!(error = %e, "code exchange failed; falling back to stored session"),
        }
    }

    match client.get_session().await {
        Ok(session) => AuthState::from_session(session.as_ref().map(|s| &s.user)),
        Err(e) => {
            warn!(error = %e, "session poll failed");
            AuthState::Unauthenticated
        }
    }
}

/// `code` or `token` from the query string.
fn auth_code(url: &Url) -> Option<String> {
    let pairs: Vec<_> = url.query_pairs().collect();
    ["code", "token"].iter().find_map(|key| {
        pairs
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.to_string())
    })
}

async fn listen(mut subscription: Subscription, state: watch::Sender<AuthState>) {
    while let Some(change) = subscription.recv().await {
        let next = match change.event {
            AuthEvent::SignedIn | AuthEvent::TokenRefreshed | AuthEvent::UserUpdated => {
                AuthState::after_event(change.event, change.user.as_ref())
            }
            AuthEvent::SignedOut | AuthEvent::SessionInvalid => AuthState::Unauthenticated,
            // Carry no state change of their own
            AuthEvent::InitialSession | AuthEvent::PasswordRecovery => continue,
        };
        publish(&state, next);
    }
}

/// Replace the state unless it is unchanged.
fn publish(state: &watch::Sender<AuthState>, next: AuthState) {
    state.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}
