//! Supabase Auth (`GoTrue`) REST client.
//!
//! # Endpoints
//!
//! ```text
//! POST   /auth/v1/token?grant_type=password       sign in
//! POST   /auth/v1/token?grant_type=refresh_token  refresh
//! POST   /auth/v1/token?grant_type=pkce           confirmation-link code exchange
//! POST   /auth/v1/signup?redirect_to=...          sign up
//! POST   /auth/v1/resend?redirect_to=...          resend confirmation
//! GET    /auth/v1/user                            current user
//! PUT    /auth/v1/user                            change password
//! POST   /auth/v1/logout                          revoke session
//! GET    /auth/v1/admin/users?filter=...          admin listing (service role)
//! DELETE /auth/v1/admin/users/{id}                admin delete (service role)
//! GET    /auth/v1/health                          health
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use green_basket_core::{AuthUser, Email, UserId};

use super::types::{ErrorBody, SignUpResponse, TokenResponse, UserList, WireUser};
use super::{IdentityError, IdentityProvider, ProviderSession, SignUpOutcome, UserSummary};
use crate::config::SupabaseConfig;

/// Page size for admin user lookups.
const ADMIN_PAGE_SIZE: &str = "50";

/// Client for the Supabase Auth REST API.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    client: reqwest::Client,
    auth_url: String,
    anon_key: String,
    service_role_key: SecretString,
}

impl SupabaseClient {
    /// Create a new client.
    #[must_use]
    pub fn new(config: &SupabaseConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), config)
    }

    /// Create a client on a preconfigured `reqwest::Client` (timeouts, proxies).
    #[must_use]
    pub fn with_http_client(client: reqwest::Client, config: &SupabaseConfig) -> Self {
        Self {
            inner: Arc::new(SupabaseClientInner {
                client,
                auth_url: format!("{}/auth/v1", config.url.trim_end_matches('/')),
                anon_key: config.anon_key.clone(),
                service_role_key: config.service_role_key.clone(),
            }),
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, IdentityError> {
        let mut url = Url::parse(&format!("{}{path}", self.inner.auth_url))
            .map_err(|e| IdentityError::InvalidResponse(format!("bad endpoint URL: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Request with the public key.
    fn public(&self, method: reqwest::Method, url: Url) -> RequestBuilder {
        self.inner
            .client
            .request(method, url)
            .header("apikey", &self.inner.anon_key)
    }

    /// Request on behalf of a signed-in user.
    fn as_user(&self, method: reqwest::Method, url: Url, access_token: &str) -> RequestBuilder {
        self.public(method, url).bearer_auth(access_token)
    }

    /// Request with the service-role key (admin endpoints).
    fn as_admin(&self, method: reqwest::Method, url: Url) -> RequestBuilder {
        let key = self.inner.service_role_key.expose_secret();
        self.inner
            .client
            .request(method, url)
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<ProviderSession, IdentityError> {
        let url = self.endpoint("/token", &[("grant_type", grant_type)])?;
        let response = self
            .public(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = parse_json(response, RejectAs::Session).await?;
        token.into_session()
    }
}

/// How to classify 4xx responses.
#[derive(Clone, Copy)]
enum RejectAs {
    /// Token-bearing calls: 401/403 (and bad refresh grants) mean the session is gone.
    Session,
    /// Everything else: surface the provider's message.
    Api,
}

async fn check(response: Response, reject_as: RejectAs) -> Result<Response, IdentityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::message)
        .unwrap_or_else(|| format!("request failed ({status})"));

    let session_gone = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        || (status == StatusCode::BAD_REQUEST && message.to_lowercase().contains("refresh token"));

    if matches!(reject_as, RejectAs::Session) && session_gone {
        return Err(IdentityError::SessionRejected(message));
    }

    Err(IdentityError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn parse_json<T: DeserializeOwned>(
    response: Response,
    reject_as: RejectAs,
) -> Result<T, IdentityError> {
    let response = check(response, reject_as).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| IdentityError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<ProviderSession, IdentityError> {
        // Wrong credentials come back as 400 with a message meant for the form
        let url = self.endpoint("/token", &[("grant_type", "password")])?;
        let response = self
            .public(reqwest::Method::POST, url)
            .json(&json!({ "email": email.as_str(), "password": password }))
            .send()
            .await?;
        let token: TokenResponse = parse_json(response, RejectAs::Api).await?;
        token.into_session()
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        redirect_to: &str,
        code_challenge: Option<&str>,
    ) -> Result<SignUpOutcome, IdentityError> {
        let url = self.endpoint("/signup", &[("redirect_to", redirect_to)])?;
        let mut body = json!({ "email": email.as_str(), "password": password });
        if let (Some(challenge), Some(map)) = (code_challenge, body.as_object_mut()) {
            map.insert("code_challenge".to_owned(), json!(challenge));
            map.insert("code_challenge_method".to_owned(), json!("s256"));
        }

        let response = self
            .public(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await?;

        match parse_json::<SignUpResponse>(response, RejectAs::Api).await? {
            SignUpResponse::Session(token) => {
                let session = token.into_session()?;
                Ok(SignUpOutcome {
                    user: Some(session.user.clone()),
                    session: Some(session),
                })
            }
            SignUpResponse::User(user) => Ok(SignUpOutcome {
                user: Some(user.into_auth_user()?),
                session: None,
            }),
        }
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<ProviderSession, IdentityError> {
        self.token_grant(
            "pkce",
            json!({ "auth_code": code, "code_verifier": verifier }),
        )
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, IdentityError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, IdentityError> {
        let url = self.endpoint("/user", &[])?;
        let response = self
            .as_user(reqwest::Method::GET, url, access_token)
            .send()
            .await?;
        let user: WireUser = parse_json(response, RejectAs::Session).await?;
        user.into_auth_user()
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let url = self.endpoint("/logout", &[])?;
        let response = self
            .as_user(reqwest::Method::POST, url, access_token)
            .send()
            .await?;
        check(response, RejectAs::Session).await?;
        Ok(())
    }

    async fn resend_signup(&self, email: &Email, redirect_to: &str) -> Result<(), IdentityError> {
        let url = self.endpoint("/resend", &[("redirect_to", redirect_to)])?;
        let response = self
            .public(reqwest::Method::POST, url)
            .json(&json!({ "type": "signup", "email": email.as_str() }))
            .send()
            .await?;
        check(response, RejectAs::Api).await?;
        Ok(())
    }

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<AuthUser, IdentityError> {
        let url = self.endpoint("/user", &[])?;
        let response = self
            .as_user(reqwest::Method::PUT, url, access_token)
            .json(&json!({ "password": password }))
            .send()
            .await?;
        // 422 "New password should be different..." must reach the form
        let user: WireUser = parse_json(response, RejectAs::Session).await?;
        user.into_auth_user()
    }

    async fn list_users(&self, filter: &str) -> Result<Vec<UserSummary>, IdentityError> {
        let url = self.endpoint(
            "/admin/users",
            &[("page", "1"), ("per_page", ADMIN_PAGE_SIZE), ("filter", filter)],
        )?;
        let response = self.as_admin(reqwest::Method::GET, url).send().await?;
        let list: UserList = parse_json(response, RejectAs::Api).await?;
        Ok(list
            .users
            .into_iter()
            .filter_map(WireUser::into_summary)
            .collect())
    }

    async fn delete_user(&self, id: &UserId) -> Result<(), IdentityError> {
        let url = self.endpoint(&format!("/admin/users/{id}"), &[])?;
        let response = self.as_admin(reqwest::Method::DELETE, url).send().await?;
        check(response, RejectAs::Api).await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), IdentityError> {
        let url = self.endpoint("/health", &[])?;
        let response = self.public(reqwest::Method::GET, url).send().await?;
        check(response, RejectAs::Api).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> SupabaseClient {
        SupabaseClient::new(&SupabaseConfig {
            url: "https://abcd.supabase.co/".to_owned(),
            anon_key: "anon".to_owned(),
            service_role_key: SecretString::from("service"),
        })
    }

    #[test]
    fn test_endpoint_joins_base_and_query() {
        let url = client()
            .endpoint("/signup", &[("redirect_to", "https://shop.test/auth/callback?email=a@b.co")])
            .unwrap();
        assert_eq!(url.path(), "/auth/v1/signup");
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "redirect_to");
        assert_eq!(value, "https://shop.test/auth/callback?email=a@b.co");
    }

    #[test]
    fn test_endpoint_without_query() {
        let url = client().endpoint("/user", &[]).unwrap();
        assert_eq!(url.as_str(), "https://abcd.supabase.co/auth/v1/user");
    }
}
