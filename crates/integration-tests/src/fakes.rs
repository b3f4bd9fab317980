//! In-memory stand-ins for the identity and catalog providers.
//!
//! They keep just enough state to behave like the real services across a
//! test: accounts, live token pairs, pending confirmation codes and the
//! checkout sessions that were requested.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use green_basket_core::{
    AuthUser, CurrencyCode, Email, Price, PriceId, Product, ProductId, ProductPrice, UserId,
};
use green_basket_storefront::catalog::{Catalog, CatalogError, CheckoutRequest, CheckoutSession};
use green_basket_storefront::identity::{
    IdentityError, IdentityProvider, ProviderSession, SessionTokens, SignUpOutcome, UserSummary,
    pkce,
};

// =============================================================================
// Identity
// =============================================================================

struct Account {
    user: AuthUser,
    password: String,
    confirmed: bool,
}

/// A sign-up as the provider received it.
#[derive(Debug, Clone)]
pub struct SignUpCall {
    pub email: String,
    pub redirect_to: String,
    /// Code carried by the confirmation link.
    pub code: String,
}

#[derive(Default)]
struct IdentityData {
    accounts: Vec<Account>,
    access: HashMap<String, UserId>,
    refresh: HashMap<String, UserId>,
    codes: HashMap<String, (UserId, Option<String>)>,
    sign_ups: Vec<SignUpCall>,
    resent: Vec<String>,
}

impl IdentityData {
    fn account(&self, id: &UserId) -> Option<&Account> {
        self.accounts.iter().find(|a| &a.user.id == id)
    }

    fn account_by_email(&self, email: &Email) -> Option<&Account> {
        self.accounts.iter().find(|a| {
            a.user
                .email
                .as_ref()
                .is_some_and(|e| e.as_str().eq_ignore_ascii_case(email.as_str()))
        })
    }

    fn forget_tokens(&mut self, id: &UserId) {
        self.access.retain(|_, owner| owner != id);
        self.refresh.retain(|_, owner| owner != id);
    }
}

/// Supabase-shaped identity provider living in memory.
///
/// Tokens are `access-<n>` / `refresh-<n>`; refresh tokens are single use.
/// Sign-ups stay unconfirmed until their code is exchanged, unless
/// [`FakeIdentity::set_auto_confirm`] is on.
pub struct FakeIdentity {
    data: Mutex<IdentityData>,
    counter: AtomicUsize,
    healthy: AtomicBool,
    auto_confirm: AtomicBool,
    sign_outs: AtomicUsize,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(IdentityData::default()),
            counter: AtomicUsize::new(1),
            healthy: AtomicBool::new(true),
            auto_confirm: AtomicBool::new(false),
            sign_outs: AtomicUsize::new(0),
        }
    }

    fn data(&self) -> MutexGuard<'_, IdentityData> {
        self.data.lock().unwrap()
    }

    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    fn issue(&self, data: &mut IdentityData, id: &UserId) -> Option<ProviderSession> {
        let n = self.next();
        let tokens = SessionTokens {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
            expires_in: Some(3600),
            obtained_at: Utc::now().timestamp(),
        };
        data.access.insert(tokens.access_token.clone(), id.clone());
        data.refresh.insert(tokens.refresh_token.clone(), id.clone());

        let user = data.account(id)?.user.clone();
        Some(ProviderSession { tokens, user })
    }

    fn create(
        &self,
        data: &mut IdentityData,
        email: &Email,
        password: &str,
        confirmed: bool,
    ) -> AuthUser {
        let n = self.next();
        let user = AuthUser {
            id: UserId::parse(&format!("00000000-0000-4000-8000-{n:012}")).unwrap(),
            email: Some(email.clone()),
            created_at: Utc::now(),
            last_sign_in_at: None,
        };
        data.accounts.push(Account {
            user: user.clone(),
            password: password.to_owned(),
            confirmed,
        });
        user
    }

    /// Add a confirmed account.
    pub fn with_user(&self, email: &str, password: &str) -> AuthUser {
        let email = Email::parse(email).unwrap();
        let mut data = self.data();
        self.create(&mut data, &email, password, true)
    }

    /// Whether an account exists for `email`.
    pub fn has_account(&self, email: &str) -> bool {
        let email = Email::parse(email).unwrap();
        self.data().account_by_email(&email).is_some()
    }

    /// The current password for `email`.
    pub fn password_of(&self, email: &str) -> Option<String> {
        let email = Email::parse(email).unwrap();
        self.data().account_by_email(&email).map(|a| a.password.clone())
    }

    /// The most recent sign-up.
    pub fn last_sign_up(&self) -> Option<SignUpCall> {
        self.data().sign_ups.last().cloned()
    }

    /// Emails a confirmation was resent to.
    pub fn resent(&self) -> Vec<String> {
        self.data().resent.clone()
    }

    /// Reject every access token while leaving refresh tokens valid, as if
    /// they had all expired.
    pub fn expire_access_tokens(&self) {
        self.data().access.clear();
    }

    /// Revoke every token pair, as if the sessions were ended elsewhere.
    pub fn revoke_all(&self) {
        let mut data = self.data();
        data.access.clear();
        data.refresh.clear();
    }

    /// Number of live access tokens.
    pub fn live_sessions(&self) -> usize {
        self.data().access.len()
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Return a session straight from sign-up.
    pub fn set_auto_confirm(&self, on: bool) {
        self.auto_confirm.store(on, Ordering::SeqCst);
    }
}

fn api(status: u16, message: &str) -> IdentityError {
    IdentityError::Api {
        status,
        message: message.to_owned(),
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<ProviderSession, IdentityError> {
        let mut data = self.data();
        let (id, confirmed) = match data.account_by_email(email) {
            Some(account) if account.password == password => {
                (account.user.id.clone(), account.confirmed)
            }
            _ => return Err(api(400, "Invalid login credentials")),
        };
        if !confirmed {
            return Err(api(400, "Email not confirmed"));
        }
        self.issue(&mut data, &id)
            .ok_or_else(|| api(400, "Invalid login credentials"))
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        redirect_to: &str,
        code_challenge: Option<&str>,
    ) -> Result<SignUpOutcome, IdentityError> {
        let auto_confirm = self.auto_confirm.load(Ordering::SeqCst);
        let mut data = self.data();
        if data.account_by_email(email).is_some() {
            return Err(api(422, "User already registered"));
        }

        let user = self.create(&mut data, email, password, auto_confirm);
        if auto_confirm {
            let session = self.issue(&mut data, &user.id);
            return Ok(SignUpOutcome {
                user: Some(user),
                session,
            });
        }

        let code = format!("code-{}", self.next());
        data.codes.insert(
            code.clone(),
            (user.id.clone(), code_challenge.map(str::to_owned)),
        );
        data.sign_ups.push(SignUpCall {
            email: email.as_str().to_owned(),
            redirect_to: redirect_to.to_owned(),
            code,
        });

        Ok(SignUpOutcome {
            user: Some(user),
            session: None,
        })
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<ProviderSession, IdentityError> {
        let mut data = self.data();
        let Some((id, challenge)) = data.codes.remove(code) else {
            return Err(api(403, "Email link is invalid or has expired"));
        };
        if challenge.is_some_and(|c| c != pkce::challenge_for(verifier)) {
            return Err(api(403, "code challenge does not match previously saved code verifier"));
        }

        if let Some(account) = data.accounts.iter_mut().find(|a| a.user.id == id) {
            account.confirmed = true;
        }
        self.issue(&mut data, &id)
            .ok_or_else(|| api(404, "User not found"))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, IdentityError> {
        let mut data = self.data();
        let Some(id) = data.refresh.remove(refresh_token) else {
            return Err(IdentityError::SessionRejected(
                "Invalid Refresh Token: Refresh Token Not Found".to_owned(),
            ));
        };
        self.issue(&mut data, &id)
            .ok_or_else(|| IdentityError::SessionRejected("User not found".to_owned()))
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, IdentityError> {
        let data = self.data();
        data.access
            .get(access_token)
            .and_then(|id| data.account(id))
            .map(|account| account.user.clone())
            .ok_or_else(|| IdentityError::SessionRejected("invalid JWT".to_owned()))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        let mut data = self.data();
        if let Some(id) = data.access.get(access_token).cloned() {
            data.forget_tokens(&id);
        }
        Ok(())
    }

    async fn resend_signup(&self, email: &Email, _redirect_to: &str) -> Result<(), IdentityError> {
        self.data().resent.push(email.as_str().to_owned());
        Ok(())
    }

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<AuthUser, IdentityError> {
        let mut data = self.data();
        let Some(id) = data.access.get(access_token).cloned() else {
            return Err(IdentityError::SessionRejected("invalid JWT".to_owned()));
        };
        let Some(account) = data.accounts.iter_mut().find(|a| a.user.id == id) else {
            return Err(api(404, "User not found"));
        };
        if account.password == password {
            return Err(api(
                422,
                "New password should be different from the old password.",
            ));
        }
        account.password = password.to_owned();
        Ok(account.user.clone())
    }

    async fn list_users(&self, filter: &str) -> Result<Vec<UserSummary>, IdentityError> {
        let needle = filter.to_lowercase();
        Ok(self
            .data()
            .accounts
            .iter()
            .filter(|a| {
                a.user
                    .email
                    .as_ref()
                    .is_some_and(|e| e.as_str().to_lowercase().contains(&needle))
            })
            .map(|a| UserSummary {
                id: a.user.id.clone(),
                email: a.user.email.clone(),
            })
            .collect())
    }

    async fn delete_user(&self, id: &UserId) -> Result<(), IdentityError> {
        let mut data = self.data();
        data.accounts.retain(|a| &a.user.id != id);
        data.forget_tokens(id);
        Ok(())
    }

    async fn health(&self) -> Result<(), IdentityError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(api(503, "project paused"))
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A product priced in minor units; `None` leaves it without a fixed price.
pub fn product(id: &str, name: &str, category: &str, minor: Option<u64>) -> Product {
    Product {
        id: ProductId::parse(id).unwrap(),
        name: name.to_owned(),
        description: Some(format!("{name}, fresh this week")),
        images: vec![format!("https://files.stripe.test/{id}.jpg")],
        category: Some(category.to_owned()),
        default_price: Some(ProductPrice {
            id: PriceId::parse(&format!("price_{id}")).unwrap(),
            unit_amount: minor.map(Price::from_minor),
            currency: CurrencyCode::default(),
        }),
    }
}

/// Fixed product list plus a record of requested checkouts.
pub struct FakeCatalog {
    products: Vec<Product>,
    checkouts: Mutex<Vec<CheckoutRequest>>,
}

impl Default for FakeCatalog {
    /// Kale (3.50), carrots (1.99) and an unpriced gift box.
    fn default() -> Self {
        Self::with_products(vec![
            product("prod_kale", "Curly Kale", "Greens", Some(350)),
            product("prod_carrots", "Carrots", "Roots", Some(199)),
            product("prod_giftbox", "Gift Box", "Gifts", None),
        ])
    }
}

impl FakeCatalog {
    #[must_use]
    pub fn with_products(products: Vec<Product>) -> Self {
        Self {
            products,
            checkouts: Mutex::new(Vec::new()),
        }
    }

    /// Checkout sessions requested so far.
    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.checkouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.products.clone())
    }

    async fn get_product(&self, id: &ProductId) -> Result<Product, CatalogError> {
        self.products
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, CatalogError> {
        let mut checkouts = self.checkouts.lock().unwrap();
        checkouts.push(request.clone());
        let id = format!("cs_test_{}", checkouts.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.test/c/pay/{id}"),
            id,
        })
    }
}
