//! In-process storefront plus a cookie-carrying client.
//!
//! ```rust,ignore
//! let app = TestApp::new();
//! let browser = app.browser();
//! let cart = browser.post_json("/cart/add", &json!({"product_id": "prod_kale"})).await;
//! assert_eq!(cart.status, StatusCode::OK);
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use green_basket_core::{CurrencyCode, RouteRules};
use green_basket_storefront::auth::DEFAULT_SIGN_OUT_DELAY;
use green_basket_storefront::cart::{CartPersister, CartRegistry, CartStorage, MemoryCartStorage};
use green_basket_storefront::config::{StorefrontConfig, StripeConfig, SupabaseConfig};
use green_basket_storefront::db::MemoryOrderStore;
use green_basket_storefront::liveness::{BackendMonitor, BackendStatus, DEFAULT_PROBE_INTERVAL};
use green_basket_storefront::middleware::{SESSION_COOKIE_NAME, create_session_layer};
use green_basket_storefront::routes;
use green_basket_storefront::state::{AppParts, AppState};

use crate::fakes::{FakeCatalog, FakeIdentity};

/// Public URL the test storefront believes it is served from.
pub const BASE_URL: &str = "http://shop.test";

static NEXT_CLIENT: AtomicU32 = AtomicU32::new(1);

/// Configuration with placeholder secrets; nothing in it is dialled.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused@localhost/green_basket_test".to_owned()),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: BASE_URL.to_owned(),
        session_secret: SecretString::from("k".repeat(64)),
        supabase: SupabaseConfig {
            url: "http://supabase.test".to_owned(),
            anon_key: "anon-test-key".to_owned(),
            service_role_key: SecretString::from("service-role-test-key".to_owned()),
        },
        stripe: StripeConfig {
            secret_key: SecretString::from("sk_test_placeholder".to_owned()),
            currency: CurrencyCode::default(),
        },
        probe_interval: DEFAULT_PROBE_INTERVAL,
        sign_out_redirect_delay: DEFAULT_SIGN_OUT_DELAY,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// Poll `check` for up to two seconds.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

// =============================================================================
// App
// =============================================================================

/// Builder for [`TestApp`].
pub struct TestAppBuilder {
    identity: Arc<FakeIdentity>,
    catalog: Arc<FakeCatalog>,
    backend: BackendStatus,
}

impl TestAppBuilder {
    #[must_use]
    pub fn identity(mut self, identity: FakeIdentity) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: FakeCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    #[must_use]
    pub fn backend(mut self, status: BackendStatus) -> Self {
        self.backend = status;
        self
    }

    /// Must run inside a Tokio runtime (the cart writer is spawned here).
    #[must_use]
    pub fn build(self) -> TestApp {
        TestApp::assemble(
            self.identity,
            self.catalog,
            MemoryOrderStore::new(),
            Arc::new(MemoryCartStorage::new()),
            MemoryStore::default(),
            self.backend,
        )
    }
}

/// A storefront wired to fakes and in-memory stores.
///
/// Cloning the router shares one state, so every [`Browser`] from the same
/// app sees the same cart registry and rate limiters.
pub struct TestApp {
    router: Router,
    pub identity: Arc<FakeIdentity>,
    pub catalog: Arc<FakeCatalog>,
    pub orders: MemoryOrderStore,
    pub cart_slots: Arc<MemoryCartStorage>,
    sessions: MemoryStore,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// Default fakes, backend online.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            identity: Arc::new(FakeIdentity::new()),
            catalog: Arc::new(FakeCatalog::default()),
            backend: BackendStatus::Online,
        }
    }

    fn assemble(
        identity: Arc<FakeIdentity>,
        catalog: Arc<FakeCatalog>,
        orders: MemoryOrderStore,
        cart_slots: Arc<MemoryCartStorage>,
        sessions: MemoryStore,
        backend: BackendStatus,
    ) -> Self {
        let config = test_config();
        let storage: Arc<dyn CartStorage> = cart_slots.clone();
        let (persister, _writer) = CartPersister::spawn(Arc::clone(&storage));

        let state = AppState::from_parts(AppParts {
            config: config.clone(),
            pool: None,
            identity: identity.clone(),
            catalog: catalog.clone(),
            orders: Arc::new(orders.clone()),
            carts: CartRegistry::new(storage, persister),
            backend: BackendMonitor::fixed(backend),
            rules: RouteRules::default(),
        });
        let router = routes::app(state, create_session_layer(sessions.clone(), &config));

        Self {
            router,
            identity,
            catalog,
            orders,
            cart_slots,
            sessions,
        }
    }

    /// A fresh process over the same providers, sessions and durable
    /// stores. In-memory cart stores start empty and hydrate again.
    #[must_use]
    pub fn restart(&self) -> Self {
        Self::assemble(
            Arc::clone(&self.identity),
            Arc::clone(&self.catalog),
            self.orders.clone(),
            Arc::clone(&self.cart_slots),
            self.sessions.clone(),
            BackendStatus::Online,
        )
    }

    /// A new client with no cookie and its own source address.
    #[must_use]
    pub fn browser(&self) -> Browser {
        let n = NEXT_CLIENT.fetch_add(1, Ordering::SeqCst);
        Browser {
            router: self.router.clone(),
            ip: Ipv4Addr::from(0x0A00_0000 + n).to_string(),
            cookie: Mutex::new(None),
        }
    }

    /// Wait for a durable cart slot whose payload satisfies `check`.
    pub async fn persisted_cart(&self, check: impl Fn(&str) -> bool) -> Option<String> {
        for _ in 0..100 {
            for slot in self.cart_slots.slots().await {
                match self.cart_slots.get(&slot).await {
                    Some(payload) if check(&payload) => return Some(payload),
                    _ => {}
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        None
    }
}

// =============================================================================
// Browser
// =============================================================================

/// Client that keeps the session cookie between requests.
pub struct Browser {
    router: Router,
    ip: String,
    cookie: Mutex<Option<String>>,
}

impl Browser {
    /// The same client (cookie and address) talking to another instance.
    #[must_use]
    pub fn switch_to(&self, app: &TestApp) -> Self {
        Self {
            router: app.router.clone(),
            ip: self.ip.clone(),
            cookie: Mutex::new(self.session_cookie()),
        }
    }

    /// `gb_session=<id>` if the server has set one.
    #[must_use]
    pub fn session_cookie(&self) -> Option<String> {
        self.cookie.lock().unwrap().clone()
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    /// POST with an empty body.
    pub async fn post(&self, path: &str) -> TestResponse {
        self.send(Request::post(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> TestResponse {
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Sign in through the form, asserting it succeeds.
    pub async fn sign_in(&self, email: &str, password: &str) {
        let response = self
            .post_form("/login", &[("email", email), ("password", password)])
            .await;
        assert_eq!(response.status, StatusCode::OK, "sign-in failed: {}", response.text());
    }

    /// Send `request` with this client's cookie and forwarded address.
    pub async fn send(&self, mut request: Request<Body>) -> TestResponse {
        let headers = request.headers_mut();
        if !headers.contains_key("x-forwarded-for") {
            headers.insert("x-forwarded-for", HeaderValue::from_str(&self.ip).unwrap());
        }
        if let Some(cookie) = self.session_cookie() {
            headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
        }

        let response = self.router.clone().oneshot(request).await.unwrap();
        self.remember_cookie(response.headers());

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    fn remember_cookie(&self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            let pair = value.split(';').next().unwrap_or_default().trim();
            let Some((name, id)) = pair.split_once('=') else {
                continue;
            };
            if name != SESSION_COOKIE_NAME {
                continue;
            }

            let expired = id.is_empty() || value.contains("Max-Age=0");
            *self.cookie.lock().unwrap() = (!expired).then(|| pair.to_owned());
        }
    }
}

// =============================================================================
// Response
// =============================================================================

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("not JSON ({e}): {}", self.text()))
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// `Location` of a redirect.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// `redirect_to` of a successful form post.
    #[must_use]
    pub fn redirect_to(&self) -> Option<String> {
        self.json()["redirect_to"].as_str().map(str::to_owned)
    }

    /// Messages for `field` in a `422` validation body.
    #[must_use]
    pub fn field_errors(&self, field: &str) -> Vec<String> {
        self.json()["errors"][field]
            .as_array()
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|m| m.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }
}
