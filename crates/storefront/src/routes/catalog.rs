//! Catalog route handlers.
//!
//! Products come straight from the catalog provider (cached briefly by the
//! client); filtering and category grouping use the pure helpers in core.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use green_basket_core::{Product, ProductId, catalog};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Query parameters for product search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

/// List all products.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog().list_products().await?))
}

/// Show a single product.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Product>> {
    let id = ProductId::parse(&id).map_err(|_| AppError::NotFound(id))?;
    Ok(Json(state.catalog().get_product(&id).await?))
}

/// Sorted, distinct category names.
#[instrument(skip(state))]
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    let products = state.catalog().list_products().await?;
    Ok(Json(catalog::categories(&products)))
}

/// Products in one category.
#[instrument(skip(state))]
pub async fn category(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Product>>> {
    let products = state.catalog().list_products().await?;
    Ok(Json(
        catalog::in_category(&products, &name)
            .into_iter()
            .cloned()
            .collect(),
    ))
}

/// Products matching a free-text query.
#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Product>>> {
    let products = state.catalog().list_products().await?;
    Ok(Json(
        catalog::search(&products, &query.query)
            .into_iter()
            .cloned()
            .collect(),
    ))
}
