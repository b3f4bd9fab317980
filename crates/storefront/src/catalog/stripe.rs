//! Stripe REST client for products and checkout sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use green_basket_core::{CurrencyCode, Price, PriceId, Product, ProductId, ProductPrice};

use super::{Catalog, CatalogError, CheckoutRequest, CheckoutSession};
use crate::config::StripeConfig;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Products per list page (Stripe's maximum).
const PAGE_LIMIT: &str = "100";

/// Metadata key holding a product's category.
const CATEGORY_METADATA_KEY: &str = "Category";

/// Cache key for the full product list.
const PRODUCTS_KEY: &str = "products";

/// Client for the Stripe API.
///
/// The product list is cached for 5 minutes.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    base_url: String,
    secret_key: SecretString,
    products: Cache<&'static str, Arc<Vec<Product>>>,
}

impl StripeClient {
    /// Create a new client.
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self::with_base_url(config, API_BASE)
    }

    /// Create a client against another base URL (e.g. a local mock).
    #[must_use]
    pub fn with_base_url(config: &StripeConfig, base_url: &str) -> Self {
        Self {
            inner: Arc::new(StripeClientInner {
                client: reqwest::Client::new(),
                base_url: base_url.trim_end_matches('/').to_owned(),
                secret_key: config.secret_key.clone(),
                products: Cache::builder()
                    .max_capacity(1)
                    .time_to_live(Duration::from_secs(300)) // 5 minutes
                    .build(),
            }),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CatalogError> {
        let mut url = url::Url::parse(&format!("{}{path}", self.inner.base_url))
            .map_err(|e| CatalogError::InvalidResponse(format!("bad endpoint URL: {e}")))?;
        url.query_pairs_mut().extend_pairs(query);

        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(self.inner.secret_key.expose_secret())
            .send()
            .await?;
        parse_json(response).await
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, CatalogError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(message));
        }
        return Err(CatalogError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| CatalogError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl Catalog for StripeClient {
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        if let Some(cached) = self.inner.products.get(PRODUCTS_KEY).await {
            return Ok(cached.as_ref().clone());
        }

        let mut products = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut query = vec![
                ("active", "true"),
                ("limit", PAGE_LIMIT),
                ("expand[]", "data.default_price"),
            ];
            if let Some(cursor) = starting_after.as_deref() {
                query.push(("starting_after", cursor));
            }

            let page: ProductList = self.get("/products", &query).await?;
            starting_after = page.data.last().map(|p| p.id.clone());
            products.extend(page.data.into_iter().filter_map(WireProduct::into_product));

            if !page.has_more || starting_after.is_none() {
                break;
            }
        }

        tracing::debug!(count = products.len(), "Fetched catalog products");
        self.inner
            .products
            .insert(PRODUCTS_KEY, Arc::new(products.clone()))
            .await;
        Ok(products)
    }

    async fn get_product(&self, id: &ProductId) -> Result<Product, CatalogError> {
        let wire: WireProduct = self
            .get(
                &format!("/products/{}", urlencode_path(id.as_str())),
                &[("expand[]", "default_price")],
            )
            .await?;
        wire.into_product()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, CatalogError> {
        let response = self
            .inner
            .client
            .post(format!("{}/checkout/sessions", self.inner.base_url))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .form(&checkout_form(request))
            .send()
            .await?;

        let session: WireCheckoutSession = parse_json(response).await?;
        let url = session.url.ok_or_else(|| {
            CatalogError::InvalidResponse("checkout session without a URL".to_owned())
        })?;

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }
}

/// Form body for `POST /v1/checkout/sessions`, one `price_data` per line.
fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_owned(), "payment".to_owned()),
        ("payment_method_types[0]".to_owned(), "card".to_owned()),
        ("success_url".to_owned(), request.success_url.clone()),
        ("cancel_url".to_owned(), request.cancel_url.clone()),
    ];

    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_owned(), email.clone()));
    }

    for (i, item) in request.items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.as_str().to_owned(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        if let Some(image) = &item.image_url {
            form.push((
                format!("{prefix}[price_data][product_data][images][0]"),
                image.clone(),
            ));
        }
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_price.minor().to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }

    form
}

fn urlencode_path(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ProductList {
    data: Vec<WireProduct>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct WireProduct {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    default_price: Option<WireDefaultPrice>,
}

/// `default_price` is an id unless expanded.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireDefaultPrice {
    Expanded(WirePrice),
    Id(String),
}

#[derive(Debug, Deserialize)]
struct WirePrice {
    id: String,
    #[serde(default)]
    unit_amount: Option<i64>,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct WireCheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

impl WireProduct {
    fn into_product(self) -> Option<Product> {
        let default_price = match self.default_price {
            Some(WireDefaultPrice::Expanded(price)) => Some(ProductPrice {
                id: PriceId::parse(&price.id).ok()?,
                unit_amount: price
                    .unit_amount
                    .and_then(|amount| u64::try_from(amount).ok())
                    .map(Price::from_minor),
                currency: CurrencyCode::new(&price.currency),
            }),
            Some(WireDefaultPrice::Id(_)) | None => None,
        };

        Some(Product {
            id: ProductId::parse(&self.id).ok()?,
            name: self.name,
            description: self.description.filter(|d| !d.trim().is_empty()),
            images: self.images,
            category: self.metadata.get(CATEGORY_METADATA_KEY).cloned(),
            default_price,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use green_basket_core::CartLineItem;

    use super::*;

    #[test]
    fn test_expanded_product_conversion() {
        let body = r#"{
            "id": "prod_123",
            "object": "product",
            "name": "Curly Kale",
            "description": "",
            "images": ["https://files.example/kale.png"],
            "metadata": {"Category": " Greens "},
            "default_price": {"id": "price_1", "unit_amount": 450, "currency": "usd"}
        }"#;
        let product = serde_json::from_str::<WireProduct>(body)
            .unwrap()
            .into_product()
            .unwrap();

        assert_eq!(product.id.as_str(), "prod_123");
        assert_eq!(product.description, None);
        assert_eq!(product.category.as_deref(), Some(" Greens "));
        assert_eq!(product.unit_amount(), Some(Price::from_minor(450)));
    }

    #[test]
    fn test_unexpanded_price_has_no_amount() {
        let body = r#"{"id":"prod_1","name":"Kale","default_price":"price_1"}"#;
        let product = serde_json::from_str::<WireProduct>(body)
            .unwrap()
            .into_product()
            .unwrap();
        assert!(product.default_price.is_none());
    }

    #[test]
    fn test_checkout_form_fields() {
        let request = CheckoutRequest {
            items: vec![CartLineItem {
                id: ProductId::parse("prod_1").unwrap(),
                name: "Kale".to_owned(),
                unit_price: Price::from_minor(450),
                image_url: None,
                quantity: 3,
            }],
            currency: CurrencyCode::default(),
            success_url: "https://shop.test/success".to_owned(),
            cancel_url: "https://shop.test/checkout".to_owned(),
            customer_email: None,
        };

        let form: HashMap<_, _> = checkout_form(&request).into_iter().collect();
        assert_eq!(form["mode"], "payment");
        assert_eq!(form["payment_method_types[0]"], "card");
        assert_eq!(form["line_items[0][price_data][currency]"], "usd");
        assert_eq!(form["line_items[0][price_data][product_data][name]"], "Kale");
        assert_eq!(form["line_items[0][price_data][unit_amount]"], "450");
        assert_eq!(form["line_items[0][quantity]"], "3");
        assert_eq!(form["success_url"], "https://shop.test/success");
        assert!(!form.contains_key("customer_email"));
    }
}
