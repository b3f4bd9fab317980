//! Authentication state as seen by the storefront.
//!
//! The identity provider pushes events (`SIGNED_IN`, `TOKEN_REFRESHED`, ...)
//! and answers session polls; both are folded into one [`AuthState`] value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Email, UserId};

/// The signed-in user, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Provider user id.
    pub id: UserId,
    /// Primary email, when the provider has one.
    pub email: Option<Email>,
    /// Account creation time.
    pub created_at: DateTime<Utc>,
    /// Last successful sign-in.
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl AuthUser {
    /// Avatar initials derived from the email (`U` when there is none).
    #[must_use]
    pub fn initials(&self) -> String {
        crate::types::initials_or_default(self.email.as_ref())
    }
}

/// Process-wide authentication status.
///
/// `Pending` is only ever the initial value: it covers the window before the
/// first session poll has answered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "user", rename_all = "snake_case")]
pub enum AuthState {
    /// The first session poll has not completed yet.
    #[default]
    Pending,
    /// A provider session exists for this user.
    Authenticated(AuthUser),
    /// No session.
    Unauthenticated,
}

impl AuthState {
    /// State implied by a session poll result.
    #[must_use]
    pub fn from_session(user: Option<&AuthUser>) -> Self {
        user.map_or(Self::Unauthenticated, |user| Self::Authenticated(user.clone()))
    }

    /// State implied by a provider event and the user attached to it.
    #[must_use]
    pub fn after_event(event: AuthEvent, user: Option<&AuthUser>) -> Self {
        if event.ends_session() {
            Self::Unauthenticated
        } else {
            Self::from_session(user)
        }
    }

    /// The signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&AuthUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Pending | Self::Unauthenticated => None,
        }
    }

    /// Whether the first poll has answered.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether a user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Session change notifications pushed by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    /// Emitted once for the session found at startup.
    InitialSession,
    /// Password sign-in or code exchange succeeded.
    SignedIn,
    /// The session was ended locally or at the provider.
    SignedOut,
    /// Tokens were rotated.
    TokenRefreshed,
    /// Profile or password changed.
    UserUpdated,
    /// A password-recovery link was followed.
    PasswordRecovery,
    /// The stored session was rejected by the provider.
    SessionInvalid,
}

impl AuthEvent {
    /// Whether this event means there is no longer a session.
    #[must_use]
    pub const fn ends_session(self) -> bool {
        matches!(self, Self::SignedOut | Self::SessionInvalid)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            id: UserId::parse("0b6f7d64-3b8e-4b0e-9d0a-6a3f0c2d1e11").unwrap(),
            email: Some(Email::parse("jane.doe@example.com").unwrap()),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            last_sign_in_at: None,
        }
    }

    #[test]
    fn test_default_is_pending() {
        assert_eq!(AuthState::default(), AuthState::Pending);
        assert!(!AuthState::Pending.is_resolved());
    }

    #[test]
    fn test_from_session() {
        let u = user();
        assert_eq!(
            AuthState::from_session(Some(&u)),
            AuthState::Authenticated(u)
        );
        assert_eq!(AuthState::from_session(None), AuthState::Unauthenticated);
    }

    #[test]
    fn test_sign_out_events_drop_the_user() {
        let u = user();
        for event in [AuthEvent::SignedOut, AuthEvent::SessionInvalid] {
            assert_eq!(
                AuthState::after_event(event, Some(&u)),
                AuthState::Unauthenticated
            );
        }
    }

    #[test]
    fn test_session_events_carry_user() {
        let u = user();
        for event in [
            AuthEvent::InitialSession,
            AuthEvent::SignedIn,
            AuthEvent::TokenRefreshed,
            AuthEvent::UserUpdated,
            AuthEvent::PasswordRecovery,
        ] {
            let state = AuthState::after_event(event, Some(&u));
            assert_eq!(state.user().map(|u| u.id.as_str()), Some(u.id.as_str()));
            assert_eq!(
                AuthState::after_event(event, None),
                AuthState::Unauthenticated
            );
        }
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(AuthState::Unauthenticated).unwrap();
        assert_eq!(json["status"], "unauthenticated");

        let json = serde_json::to_value(AuthState::Authenticated(user())).unwrap();
        assert_eq!(json["status"], "authenticated");
        assert_eq!(json["user"]["email"], "jane.doe@example.com");
    }

    #[test]
    fn test_event_names() {
        assert_eq!(
            serde_json::to_string(&AuthEvent::TokenRefreshed).unwrap(),
            "\"TOKEN_REFRESHED\""
        );
    }

    #[test]
    fn test_initials() {
        assert_eq!(user().initials(), "JD");
        let anonymous = AuthUser {
            email: None,
            ..user()
        };
        assert_eq!(anonymous.initials(), "U");
    }
}
