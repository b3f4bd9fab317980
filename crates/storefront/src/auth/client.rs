//! Client-side owner of the provider session.
//!
//! One `AuthClient` per process holds the current tokens and user, mirrors
//! them to an optional token file, and broadcasts an [`AuthChange`] whenever
//! the session changes. The session hub and terminal commands build on it.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use green_basket_core::{AuthEvent, AuthUser, Email};

use crate::identity::pkce::PkcePair;
use crate::identity::{
    IdentityError, IdentityProvider, ProviderSession, SessionTokens, SignUpOutcome,
};

/// Listener queue depth; slower listeners skip ahead.
const EVENT_CAPACITY: usize = 32;

/// A session change pushed to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub user: Option<AuthUser>,
}

/// A registered auth-change listener.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) releases it.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<AuthChange>,
}

impl Subscription {
    /// Next change, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<AuthChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth listener lagged; skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop listening.
    pub fn unsubscribe(self) {}
}

/// What the token file holds.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredAuth {
    #[serde(default)]
    session: Option<ProviderSession>,
    /// PKCE verifier for a sign-up whose confirmation link is still pending.
    #[serde(default)]
    code_verifier: Option<String>,
}

/// Provider session owner with change notifications.
pub struct AuthClient {
    provider: Arc<dyn IdentityProvider>,
    stored: Mutex<StoredAuth>,
    token_file: Option<PathBuf>,
    events: broadcast::Sender<AuthChange>,
}

impl AuthClient {
    /// Client with an in-memory session only.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            provider,
            stored: Mutex::new(StoredAuth::default()),
            token_file: None,
            events,
        }
    }

    /// Client whose session is kept in `path` across runs.
    ///
    /// A missing or unreadable file starts the client signed out.
    pub async fn with_token_file(provider: Arc<dyn IdentityProvider>, path: PathBuf) -> Self {
        let stored = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring unreadable token file");
                StoredAuth::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredAuth::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read token file");
                StoredAuth::default()
            }
        };

        let mut client = Self::new(provider);
        client.stored = Mutex::new(stored);
        client.token_file = Some(path);
        client
    }

    /// The provider this client talks to.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Register for session changes.
    #[must_use]
    pub fn on_auth_state_change(&self) -> Subscription {
        Subscription {
            rx: self.events.subscribe(),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Stored user, without asking the provider.
    pub async fn current_user(&self) -> Option<AuthUser> {
        self.stored
            .lock()
            .await
            .session
            .as_ref()
            .map(|session| session.user.clone())
    }

    /// The current session, refreshed first when its access token expired.
    ///
    /// A refresh the provider rejects clears the session and emits
    /// `SessionInvalid`; `Ok(None)` then means signed out.
    ///
    /// # Errors
    ///
    /// Returns the provider error when the refresh fails for another reason.
    pub async fn get_session(&self) -> Result<Option<ProviderSession>, IdentityError> {
        let mut stored = self.stored.lock().await;
        let Some(session) = stored.session.clone() else {
            return Ok(None);
        };
        if !session.tokens.is_expired() {
            return Ok(Some(session));
        }

        match self.provider.refresh_session(&session.tokens.refresh_token).await {
            Ok(fresh) => {
                stored.session = Some(fresh.clone());
                self.persist(&stored).await;
                self.emit(AuthEvent::TokenRefreshed, Some(fresh.user.clone()));
                Ok(Some(fresh))
            }
            Err(e) if e.is_session_gone() => {
                info!(error = %e, "stored session rejected");
                stored.session = None;
                self.persist(&stored).await;
                self.emit(AuthEvent::SessionInvalid, None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// The current user, checked with the provider.
    ///
    /// # Errors
    ///
    /// Returns the provider error for anything but a rejected session.
    pub async fn get_user(&self) -> Result<Option<AuthUser>, IdentityError> {
        let mut stored = self.stored.lock().await;
        let Some(tokens) = stored.session.as_ref().map(|s| s.tokens.clone()) else {
            return Ok(None);
        };

        match crate::identity::resolve_session(self.provider.as_ref(), &tokens).await? {
            Some(fresh) => {
                let user = fresh.user.clone();
                if fresh.tokens != tokens {
                    stored.session = Some(fresh);
                    self.persist(&stored).await;
                    self.emit(AuthEvent::TokenRefreshed, Some(user.clone()));
                } else {
                    stored.session = Some(fresh);
                }
                Ok(Some(user))
            }
            None => {
                stored.session = None;
                self.persist(&stored).await;
                self.emit(AuthEvent::SessionInvalid, None);
                Ok(None)
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns the provider error (e.g. invalid credentials).
    pub async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthUser, IdentityError> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        Ok(self.install(session, AuthEvent::SignedIn).await)
    }

    /// Create an account. The PKCE verifier for the confirmation link is
    /// kept locally until [`AuthClient::exchange_code_for_session`].
    ///
    /// # Errors
    ///
    /// Returns the provider error.
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        redirect_to: &str,
    ) -> Result<SignUpOutcome, IdentityError> {
        let pkce = PkcePair::generate();
        let outcome = self
            .provider
            .sign_up(email, password, redirect_to, Some(&pkce.challenge))
            .await?;

        {
            let mut stored = self.stored.lock().await;
            stored.code_verifier = Some(pkce.verifier);
            self.persist(&stored).await;
        }

        if let Some(session) = outcome.session.clone() {
            self.install(session, AuthEvent::SignedIn).await;
        }
        Ok(outcome)
    }

    /// Trade a confirmation-link code for a session.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::MissingVerifier`] when no sign-up is pending
    /// here, or the provider error.
    pub async fn exchange_code_for_session(&self, code: &str) -> Result<AuthUser, IdentityError> {
        let verifier = self
            .stored
            .lock()
            .await
            .code_verifier
            .clone()
            .ok_or(IdentityError::MissingVerifier)?;

        let session = self.provider.exchange_code_for_session(code, &verifier).await?;
        {
            let mut stored = self.stored.lock().await;
            stored.code_verifier = None;
        }
        Ok(self.install(session, AuthEvent::SignedIn).await)
    }

    /// Change the signed-in user's password.
    ///
    /// # Errors
    ///
    /// Returns the provider error, or `SessionRejected` when signed out.
    pub async fn update_password(&self, password: &str) -> Result<AuthUser, IdentityError> {
        let session = self
            .get_session()
            .await?
            .ok_or_else(|| IdentityError::SessionRejected("not signed in".to_owned()))?;
        let user = self
            .provider
            .update_password(&session.tokens.access_token, password)
            .await?;

        let mut stored = self.stored.lock().await;
        if let Some(current) = stored.session.as_mut() {
            current.user = user.clone();
        }
        self.persist(&stored).await;
        self.emit(AuthEvent::UserUpdated, Some(user.clone()));
        Ok(user)
    }

    /// Sign out: drop local artifacts, then revoke at the provider.
    ///
    /// Revocation is best-effort; failures are logged.
    pub async fn sign_out(&self) {
        if let Some(tokens) = self.clear_local().await {
            self.revoke(&tokens).await;
        }
    }

    /// Forget the local session and emit `SignedOut`. Returns the tokens so
    /// the caller can revoke them.
    pub async fn clear_local(&self) -> Option<SessionTokens> {
        let mut stored = self.stored.lock().await;
        let session = stored.session.take();
        stored.code_verifier = None;
        self.persist(&stored).await;
        drop(stored);

        self.emit(AuthEvent::SignedOut, None);
        session.map(|s| s.tokens)
    }

    /// Revoke tokens at the provider, best-effort.
    pub async fn revoke(&self, tokens: &SessionTokens) {
        if let Err(e) = self.provider.sign_out(&tokens.access_token).await {
            warn!(error = %e, "provider sign-out failed");
        }
    }

    async fn install(&self, session: ProviderSession, event: AuthEvent) -> AuthUser {
        let user = session.user.clone();
        {
            let mut stored = self.stored.lock().await;
            stored.session = Some(session);
            self.persist(&stored).await;
        }
        self.emit(event, Some(user.clone()));
        user
    }

    fn emit(&self, event: AuthEvent, user: Option<AuthUser>) {
        debug!(?event, "auth change");
        // No listeners is fine
        let _ = self.events.send(AuthChange { event, user });
    }

    async fn persist(&self, stored: &StoredAuth) {
        let Some(path) = &self.token_file else {
            return;
        };

        let result = async {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            let text = serde_json::to_string(stored).map_err(std::io::Error::other)?;
            tokio::fs::write(path, text).await
        }
        .await;

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to write token file");
        }
    }
}
