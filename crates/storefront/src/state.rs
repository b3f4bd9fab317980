//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::task::JoinHandle;

use green_basket_core::RouteRules;

use crate::cart::{CartPersister, CartRegistry, CartStorage};
use crate::catalog::{Catalog, StripeClient};
use crate::config::StorefrontConfig;
use crate::db::{OrderStore, PgCartStorage, PgOrderStore};
use crate::identity::{IdentityProvider, SupabaseClient};
use crate::liveness::{BackendMonitor, MonitorGuard};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like provider clients, cart stores and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    identity: Arc<dyn IdentityProvider>,
    catalog: Arc<dyn Catalog>,
    orders: Arc<dyn OrderStore>,
    carts: CartRegistry,
    backend: BackendMonitor,
    rules: RouteRules,
}

/// Everything the state is built from.
///
/// Production wiring goes through [`AppState::new`]; tests assemble the
/// parts directly with in-memory stores and fake providers.
pub struct AppParts {
    pub config: StorefrontConfig,
    pub pool: Option<PgPool>,
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Arc<dyn Catalog>,
    pub orders: Arc<dyn OrderStore>,
    pub carts: CartRegistry,
    pub backend: BackendMonitor,
    pub rules: RouteRules,
}

/// Background tasks owned by `main`.
///
/// The cart writer finishes once every state handle is dropped, after
/// flushing queued snapshots; the monitor stops when its guard drops.
pub struct BackgroundTasks {
    pub cart_writer: JoinHandle<()>,
    pub monitor: MonitorGuard,
}

impl AppState {
    /// Wire the production state: Supabase, Stripe and Postgres.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> (Self, BackgroundTasks) {
        let identity: Arc<dyn IdentityProvider> = Arc::new(SupabaseClient::new(&config.supabase));
        let catalog: Arc<dyn Catalog> = Arc::new(StripeClient::new(&config.stripe));
        let orders: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(pool.clone()));

        let storage: Arc<dyn CartStorage> = Arc::new(PgCartStorage::new(pool.clone()));
        let (persister, cart_writer) = CartPersister::spawn(Arc::clone(&storage));
        let carts = CartRegistry::new(storage, persister);

        let (backend, monitor) = BackendMonitor::spawn(Arc::clone(&identity), config.probe_interval);

        let state = Self::from_parts(AppParts {
            config,
            pool: Some(pool),
            identity,
            catalog,
            orders,
            carts,
            backend,
            rules: RouteRules::default(),
        });

        (
            state,
            BackgroundTasks {
                cart_writer,
                monitor,
            },
        )
    }

    /// Build the state from already-constructed parts.
    #[must_use]
    pub fn from_parts(parts: AppParts) -> Self {
        let AppParts {
            config,
            pool,
            identity,
            catalog,
            orders,
            carts,
            backend,
            rules,
        } = parts;

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                identity,
                catalog,
                orders,
                carts,
                backend,
                rules,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get the database connection pool, if the state has one.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Get the identity provider.
    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    /// Get the catalog provider.
    #[must_use]
    pub fn catalog(&self) -> &dyn Catalog {
        self.inner.catalog.as_ref()
    }

    /// Get the order history store.
    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.orders.as_ref()
    }

    /// Get the per-device cart stores.
    #[must_use]
    pub fn carts(&self) -> &CartRegistry {
        &self.inner.carts
    }

    /// Get the backend liveness monitor.
    #[must_use]
    pub fn backend(&self) -> &BackendMonitor {
        &self.inner.backend
    }

    /// Get the route gate rules.
    #[must_use]
    pub fn rules(&self) -> &RouteRules {
        &self.inner.rules
    }

    /// Clone of the identity provider handle, for background tasks.
    #[must_use]
    pub fn identity_handle(&self) -> Arc<dyn IdentityProvider> {
        Arc::clone(&self.inner.identity)
    }
}
