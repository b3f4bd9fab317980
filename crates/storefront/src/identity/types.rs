//! Session and user types for the identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use green_basket_core::{AuthUser, Email, UserId};

use super::IdentityError;

/// Tokens issued by the provider for one session.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokens {
    /// Bearer token for user-scoped calls.
    pub access_token: String,
    /// Single-use token for rotating the pair.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: Option<i64>,
    /// Unix timestamp when the tokens were obtained.
    pub obtained_at: i64,
}

impl SessionTokens {
    /// Check if the access token is expired (with 60s buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_in.is_some_and(|expires_in| {
            let now = Utc::now().timestamp();
            let expires_at = self.obtained_at + expires_in;
            now >= (expires_at - 60)
        })
    }
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// A live provider session: tokens plus the user they belong to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSession {
    pub tokens: SessionTokens,
    pub user: AuthUser,
}

/// Result of a sign-up call.
///
/// With email confirmation enabled the provider returns only the user; the
/// session arrives later through the confirmation link.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: Option<AuthUser>,
    pub session: Option<ProviderSession>,
}

/// Admin view of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub email: Option<Email>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// User object as returned by `/auth/v1/user` and friends.
#[derive(Debug, Deserialize)]
pub(super) struct WireUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl WireUser {
    pub(super) fn into_auth_user(self) -> Result<AuthUser, IdentityError> {
        let id = UserId::parse(&self.id)
            .map_err(|_| IdentityError::InvalidResponse("user without an id".to_owned()))?;

        Ok(AuthUser {
            id,
            // Phone-only accounts have an empty email
            email: self.email.as_deref().and_then(|e| Email::parse(e).ok()),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            last_sign_in_at: self.last_sign_in_at,
        })
    }

    pub(super) fn into_summary(self) -> Option<UserSummary> {
        Some(UserSummary {
            id: UserId::parse(&self.id).ok()?,
            email: self.email.as_deref().and_then(|e| Email::parse(e).ok()),
        })
    }
}

/// Token grant response.
#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: WireUser,
}

impl TokenResponse {
    pub(super) fn into_session(self) -> Result<ProviderSession, IdentityError> {
        Ok(ProviderSession {
            tokens: SessionTokens {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                expires_in: self.expires_in,
                obtained_at: Utc::now().timestamp(),
            },
            user: self.user.into_auth_user()?,
        })
    }
}

/// Sign-up returns either a full token response (auto-confirm) or a bare user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum SignUpResponse {
    Session(TokenResponse),
    User(WireUser),
}

/// Admin user listing.
#[derive(Debug, Deserialize)]
pub(super) struct UserList {
    #[serde(default)]
    pub users: Vec<WireUser>,
}

/// Error body. Different endpoints use different field names.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorBody {
    pub msg: Option<String>,
    pub message: Option<String>,
    pub error_description: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

impl ErrorBody {
    pub(super) fn message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
            .or(self.error_code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_expiry_buffer() {
        let now = Utc::now().timestamp();
        let fresh = SessionTokens {
            access_token: "a".to_owned(),
            refresh_token: "r".to_owned(),
            expires_in: Some(3600),
            obtained_at: now,
        };
        assert!(!fresh.is_expired());

        let nearly = SessionTokens {
            obtained_at: now - 3590,
            ..fresh.clone()
        };
        assert!(nearly.is_expired());

        let open_ended = SessionTokens {
            expires_in: None,
            obtained_at: 0,
            ..fresh
        };
        assert!(!open_ended.is_expired());
    }

    #[test]
    fn test_tokens_debug_redacts() {
        let tokens = SessionTokens {
            access_token: "very-secret-access".to_owned(),
            refresh_token: "very-secret-refresh".to_owned(),
            expires_in: None,
            obtained_at: 0,
        };
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_token_response_into_session() {
        let body = r#"{
            "access_token": "at",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt",
            "user": {
                "id": "0b6f7d64-3b8e-4b0e-9d0a-6a3f0c2d1e11",
                "email": "jane@example.com",
                "created_at": "2025-01-02T03:04:05.123456Z",
                "last_sign_in_at": null
            }
        }"#;
        let session = serde_json::from_str::<TokenResponse>(body)
            .unwrap()
            .into_session()
            .unwrap();
        assert_eq!(session.tokens.access_token, "at");
        assert_eq!(session.user.email.unwrap().as_str(), "jane@example.com");
    }

    #[test]
    fn test_sign_up_response_shapes() {
        let bare = r#"{"id":"u1","email":"a@b.co","created_at":"2025-01-02T03:04:05Z"}"#;
        assert!(matches!(
            serde_json::from_str::<SignUpResponse>(bare).unwrap(),
            SignUpResponse::User(_)
        ));

        let full = r#"{"access_token":"a","refresh_token":"r","user":{"id":"u1"}}"#;
        assert!(matches!(
            serde_json::from_str::<SignUpResponse>(full).unwrap(),
            SignUpResponse::Session(_)
        ));
    }

    #[test]
    fn test_error_body_message_precedence() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#)
                .unwrap();
        assert_eq!(body.message().unwrap(), "Invalid login credentials");

        let body: ErrorBody =
            serde_json::from_str(r#"{"code":422,"msg":"User already registered"}"#).unwrap();
        assert_eq!(body.message().unwrap(), "User already registered");
    }

    #[test]
    fn test_user_without_id_is_invalid() {
        let user = WireUser {
            id: String::new(),
            email: None,
            created_at: None,
            last_sign_in_at: None,
        };
        assert!(user.into_auth_user().is_err());
    }
}
