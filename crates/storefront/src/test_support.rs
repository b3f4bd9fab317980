//! Scriptable identity provider for unit tests.

#![allow(clippy::unwrap_used)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use green_basket_core::{AuthUser, Email, UserId};

use crate::identity::{
    IdentityError, IdentityProvider, ProviderSession, SessionTokens, SignUpOutcome, UserSummary,
};

pub fn user(email: &str) -> AuthUser {
    AuthUser {
        id: UserId::parse(&format!("user-{email}")).unwrap(),
        email: Email::parse(email).ok(),
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        last_sign_in_at: None,
    }
}

pub fn tokens(tag: &str) -> SessionTokens {
    SessionTokens {
        access_token: format!("access-{tag}"),
        refresh_token: format!("refresh-{tag}"),
        expires_in: Some(3600),
        obtained_at: Utc::now().timestamp(),
    }
}

/// Accepts `access-valid`, refreshes `refresh-valid`, exchanges code `good`.
#[derive(Default)]
pub struct StubIdentity {
    pub healthy: Mutex<bool>,
    pub sign_outs: AtomicUsize,
    pub refreshes: AtomicUsize,
    /// How long a code exchange takes.
    pub exchange_delay: Mutex<Duration>,
}

impl StubIdentity {
    pub fn new() -> Self {
        Self {
            healthy: Mutex::new(true),
            ..Self::default()
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        if let Ok(mut flag) = self.healthy.lock() {
            *flag = healthy;
        }
    }

    fn session(tag: &str) -> ProviderSession {
        ProviderSession {
            tokens: tokens(tag),
            user: user("jane@example.com"),
        }
    }
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn sign_in_with_password(
        &self,
        _email: &Email,
        password: &str,
    ) -> Result<ProviderSession, IdentityError> {
        if password == "correct-horse1!" {
            Ok(Self::session("valid"))
        } else {
            Err(IdentityError::Api {
                status: 400,
                message: "Invalid login credentials".to_owned(),
            })
        }
    }

    async fn sign_up(
        &self,
        email: &Email,
        _password: &str,
        _redirect_to: &str,
        _code_challenge: Option<&str>,
    ) -> Result<SignUpOutcome, IdentityError> {
        Ok(SignUpOutcome {
            user: Some(user(email.as_str())),
            session: None,
        })
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        _verifier: &str,
    ) -> Result<ProviderSession, IdentityError> {
        let delay = self.exchange_delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if code == "good" {
            Ok(Self::session("valid"))
        } else {
            Err(IdentityError::Api {
                status: 403,
                message: "Email link is invalid or has expired".to_owned(),
            })
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, IdentityError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if refresh_token == "refresh-valid" {
            Ok(Self::session("valid"))
        } else {
            Err(IdentityError::SessionRejected("Invalid Refresh Token".to_owned()))
        }
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, IdentityError> {
        if access_token == "access-valid" {
            Ok(user("jane@example.com"))
        } else {
            Err(IdentityError::SessionRejected("invalid JWT".to_owned()))
        }
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), IdentityError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resend_signup(&self, _email: &Email, _redirect_to: &str) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn update_password(
        &self,
        access_token: &str,
        _password: &str,
    ) -> Result<AuthUser, IdentityError> {
        self.get_user(access_token).await
    }

    async fn list_users(&self, _filter: &str) -> Result<Vec<UserSummary>, IdentityError> {
        Ok(Vec::new())
    }

    async fn delete_user(&self, _id: &UserId) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn health(&self) -> Result<(), IdentityError> {
        let healthy = self.healthy.lock().map(|flag| *flag).unwrap_or(false);
        if healthy {
            Ok(())
        } else {
            Err(IdentityError::Api {
                status: 503,
                message: "project paused".to_owned(),
            })
        }
    }
}
