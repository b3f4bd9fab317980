//! Terminal shopper commands.
//!
//! # Usage
//!
//! ```bash
//! gb-cli shop cart show
//! gb-cli shop cart add prod_123 -q 2
//! gb-cli shop cart remove prod_123
//! gb-cli shop cart clear
//!
//! gb-cli shop login -e jane@example.com -p 'secret1!'
//! gb-cli shop register -e jane@example.com -p 'secret1!'
//! gb-cli shop confirm 'https://shop.example/auth/callback?code=...'
//! gb-cli shop password -p 'newsecret2!'
//! gb-cli shop whoami
//! gb-cli shop logout
//!
//! gb-cli shop status
//! gb-cli shop orders
//! ```
//!
//! # Environment Variables
//!
//! - `GB_DATA_DIR` - local cart slot and token file (default `.green-basket`)
//! - `SUPABASE_URL`, `SUPABASE_ANON_KEY`, `SUPABASE_SERVICE_ROLE_KEY` - identity provider
//! - `STRIPE_SECRET_KEY`, `STRIPE_CURRENCY` - catalog (for `cart add`)
//! - `STOREFRONT_DATABASE_URL` - order history (for `orders`)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use green_basket_core::validation::password_problems;
use green_basket_core::{AuthState, CurrencyCode, Email, ProductId};
use green_basket_storefront::auth::{AuthClient, DEFAULT_SIGN_OUT_DELAY, LogNavigator, SessionHub};
use green_basket_storefront::cart::{
    CartPersister, CartStorage, CartStore, CartView, FileCartStorage, LOCAL_SLOT,
};
use green_basket_storefront::catalog::{Catalog, CatalogError, StripeClient};
use green_basket_storefront::config::{
    ConfigError, StripeConfig, SupabaseConfig, get_database_url,
};
use green_basket_storefront::db::{self, OrderStore, PgOrderStore, RepositoryError};
use green_basket_storefront::identity::{IdentityError, IdentityProvider, SupabaseClient};
use green_basket_storefront::liveness;

/// Default data directory, relative to the working directory.
const DEFAULT_DATA_DIR: &str = ".green-basket";

/// Token file name inside the data directory.
const TOKEN_FILE: &str = "session.json";

/// How long `login` waits for the hub to pick up the new session.
const AUTH_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur while shopping from the terminal.
#[derive(Debug, Error)]
pub enum ShopError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid product id: {0}")]
    InvalidProduct(String),

    #[error("{0} has no fixed price and can't be added to the cart")]
    Unpriced(String),

    #[error("Password rejected: {0}")]
    WeakPassword(String),

    #[error("Invalid confirmation link: {0}")]
    InvalidLink(#[from] url::ParseError),

    #[error("Not signed in. Run `gb-cli shop login` first.")]
    NotSignedIn,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Cart subcommands.
#[derive(Debug, Clone)]
pub enum CartAction {
    Show,
    Add { product_id: String, quantity: u32 },
    Remove { product_id: String },
    Clear,
}

/// The data directory from `GB_DATA_DIR`.
fn data_dir() -> PathBuf {
    std::env::var_os("GB_DATA_DIR").map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from)
}

fn identity_provider() -> Result<Arc<dyn IdentityProvider>, ShopError> {
    let config = SupabaseConfig::from_env()?;
    Ok(Arc::new(SupabaseClient::new(&config)))
}

async fn auth_client() -> Result<Arc<AuthClient>, ShopError> {
    let provider = identity_provider()?;
    let client = AuthClient::with_token_file(provider, data_dir().join(TOKEN_FILE)).await;
    Ok(Arc::new(client))
}

async fn start_hub(current_url: Option<&Url>) -> Result<SessionHub, ShopError> {
    let client = auth_client().await?;
    Ok(SessionHub::start(client, current_url, Arc::new(LogNavigator), DEFAULT_SIGN_OUT_DELAY).await)
}

fn parse_email(raw: &str) -> Result<Email, ShopError> {
    Email::parse(raw).map_err(|_| ShopError::InvalidEmail(raw.to_owned()))
}

fn check_password(password: &str) -> Result<(), ShopError> {
    let problems = password_problems(password);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ShopError::WeakPassword(problems.join("; ")))
    }
}

// =============================================================================
// Cart
// =============================================================================

/// Run a cart command against the local slot.
///
/// The write-through queue is flushed before this returns.
///
/// # Errors
///
/// Returns an error if the product can't be looked up (for `add`) or the
/// writer task dies.
pub async fn cart(action: CartAction) -> Result<(), ShopError> {
    dotenvy::dotenv().ok();

    let storage: Arc<dyn CartStorage> = Arc::new(FileCartStorage::new(data_dir()));
    let (persister, writer) = CartPersister::spawn(Arc::clone(&storage));
    let store = CartStore::new(LOCAL_SLOT, persister);
    store.hydrate(storage.as_ref()).await;

    let view = match action {
        CartAction::Show => store.view().await,
        CartAction::Add {
            product_id,
            quantity,
        } => {
            let id = ProductId::parse(&product_id)
                .map_err(|_| ShopError::InvalidProduct(product_id.clone()))?;
            let stripe = StripeConfig::from_env()?;
            let catalog = StripeClient::new(&stripe);
            let product = catalog.get_product(&id).await?;
            let item = product
                .to_line_item(quantity)
                .ok_or_else(|| ShopError::Unpriced(product.name.clone()))?;
            store.add_product(item).await
        }
        CartAction::Remove { product_id } => {
            let id = ProductId::parse(&product_id)
                .map_err(|_| ShopError::InvalidProduct(product_id.clone()))?;
            store.remove_product(&id).await
        }
        CartAction::Clear => store.clear_cart().await,
    };

    print_cart(&view);

    // Last persister handle goes with the store; the writer drains and exits
    drop(store);
    writer.await?;
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cart(view: &CartView) {
    let currency = CurrencyCode::new(
        &std::env::var("STRIPE_CURRENCY").unwrap_or_else(|_| "usd".to_owned()),
    );

    if view.items.is_empty() {
        println!("Your cart is empty.");
        return;
    }

    for item in &view.items {
        println!(
            "{:>3} x {:<30} {:>10}  ({})",
            item.quantity,
            item.name,
            item.subtotal().display(&currency),
            item.id
        );
    }
    println!("{} item(s), total {}", view.item_count, view.total.display(&currency));
}

// =============================================================================
// Auth
// =============================================================================

/// Sign in and keep the session in the token file.
///
/// # Errors
///
/// Returns the provider error for bad credentials or outages.
#[allow(clippy::print_stdout)]
pub async fn login(email: &str, password: &str) -> Result<(), ShopError> {
    dotenvy::dotenv().ok();
    let email = parse_email(email)?;

    let hub = start_hub(None).await?;
    let mut states = hub.subscribe();
    hub.client().sign_in_with_password(&email, password).await?;

    // The hub follows the SignedIn event on its own task
    let settled = tokio::time::timeout(
        AUTH_SETTLE_TIMEOUT,
        states.wait_for(AuthState::is_authenticated),
    )
    .await
    .is_ok_and(|changed| changed.is_ok());
    if !settled {
        tracing::warn!("auth state did not settle in time");
    }

    println!("Signed in as {email}");
    Ok(())
}

/// Create an account; the confirmation link is finished with `confirm`.
///
/// # Errors
///
/// Returns an error for an invalid email or weak password, or the provider
/// error.
#[allow(clippy::print_stdout)]
pub async fn register(email: &str, password: &str, redirect_to: &str) -> Result<(), ShopError> {
    dotenvy::dotenv().ok();
    let email = parse_email(email)?;
    check_password(password)?;

    let client = auth_client().await?;
    let outcome = client.sign_up(&email, password, redirect_to).await?;

    if outcome.session.is_some() {
        println!("Account created and signed in as {email}");
    } else {
        println!("Check {email} for a confirmation link, then run `gb-cli shop confirm <link>`.");
    }
    Ok(())
}

/// Finish a sign-up from the confirmation link it emailed.
///
/// # Errors
///
/// Returns an error if the link doesn't parse. A link that doesn't yield a
/// session leaves the user signed out and says so.
#[allow(clippy::print_stdout)]
pub async fn confirm(link: &str) -> Result<(), ShopError> {
    dotenvy::dotenv().ok();
    let url = Url::parse(link)?;

    let hub = start_hub(Some(&url)).await?;
    match hub.current() {
        AuthState::Authenticated(user) => println!(
            "Email confirmed. Signed in as {}",
            user.email.as_ref().map_or("(no email)", Email::as_str)
        ),
        _ => println!("That link could not be used. Request a new one and try again."),
    }
    Ok(())
}

/// Change the signed-in user's password.
///
/// # Errors
///
/// Returns an error for a weak password or when signed out.
#[allow(clippy::print_stdout)]
pub async fn change_password(password: &str) -> Result<(), ShopError> {
    dotenvy::dotenv().ok();
    check_password(password)?;

    let client = auth_client().await?;
    client.update_password(password).await?;
    println!("Password changed.");
    Ok(())
}

/// Sign out locally and at the provider.
///
/// # Errors
///
/// Returns an error if the identity provider isn't configured.
#[allow(clippy::print_stdout)]
pub async fn logout() -> Result<(), ShopError> {
    dotenvy::dotenv().ok();

    let hub = start_hub(None).await?;
    let done = hub.sign_out().await;
    done.await?;
    println!("Signed out.");
    Ok(())
}

/// Show who is signed in.
///
/// # Errors
///
/// Returns an error if the identity provider isn't configured.
#[allow(clippy::print_stdout)]
pub async fn whoami() -> Result<(), ShopError> {
    dotenvy::dotenv().ok();

    let hub = start_hub(None).await?;
    match hub.current() {
        AuthState::Authenticated(user) => {
            let email = user.email.as_ref().map_or("(no email)", Email::as_str);
            println!("[{}] {email}", user.initials());
            println!("id:           {}", user.id);
            println!("member since: {}", user.created_at.format("%Y-%m-%d"));
        }
        _ => println!("Not signed in."),
    }
    Ok(())
}

// =============================================================================
// Status and orders
// =============================================================================

/// Probe the identity backend once.
///
/// # Errors
///
/// Returns an error if the identity provider isn't configured.
#[allow(clippy::print_stdout)]
pub async fn status() -> Result<(), ShopError> {
    dotenvy::dotenv().ok();

    let provider = identity_provider()?;
    let status = liveness::probe(provider.as_ref()).await;
    match status.banner() {
        Some(banner) => println!("{banner}"),
        None => println!("Backend online."),
    }
    Ok(())
}

/// List the signed-in user's orders, newest first.
///
/// # Errors
///
/// Returns an error when signed out or the database is unreachable.
#[allow(clippy::print_stdout)]
pub async fn orders() -> Result<(), ShopError> {
    dotenvy::dotenv().ok();

    let client = auth_client().await?;
    let user = client.get_user().await?.ok_or(ShopError::NotSignedIn)?;

    let pool = db::create_pool(&get_database_url("STOREFRONT_DATABASE_URL")?).await?;
    let orders = PgOrderStore::new(pool).list_for_user(&user.id).await?;

    if orders.is_empty() {
        println!("No orders yet.");
        return Ok(());
    }

    let currency = CurrencyCode::default();
    for order in orders {
        println!(
            "{}  {}  {:>10}  {} line(s)",
            order.created_at.format("%Y-%m-%d %H:%M"),
            order.id,
            order.total.display(&currency),
            order.items.len()
        );
    }
    Ok(())
}
