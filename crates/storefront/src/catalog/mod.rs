//! Catalog and payments provider integration (Stripe).
//!
//! Products, prices and checkout sessions all live at the provider. The
//! storefront reads the product list, looks up single products and creates
//! hosted checkout sessions from cart lines.

mod stripe;

pub use stripe::StripeClient;

use async_trait::async_trait;
use thiserror::Error;

use green_basket_core::{CartLineItem, CurrencyCode, Product, ProductId};

/// Errors from the catalog provider.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned an error.
    #[error("catalog API error ({status}): {message}")]
    Api {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// Product does not exist.
    #[error("product not found: {0}")]
    NotFound(String),

    /// Response body did not have the expected shape.
    #[error("invalid catalog response: {0}")]
    InvalidResponse(String),
}

/// Parameters for a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub items: Vec<CartLineItem>,
    pub currency: CurrencyCode,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
}

/// A created checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page to send the shopper to.
    pub url: String,
}

/// Operations the storefront needs from the catalog provider.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every active product, with default prices expanded.
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError>;

    /// A single product.
    async fn get_product(&self, id: &ProductId) -> Result<Product, CatalogError>;

    /// Start a hosted checkout for the given lines.
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, CatalogError>;
}
