//! Product types and catalog filtering.
//!
//! Products come from the payments provider's catalog. Categories are free-form
//! metadata, so comparisons trim and ignore case.

use serde::{Deserialize, Serialize};

use crate::cart::CartLineItem;
use crate::types::{CurrencyCode, Price, PriceId, ProductId};

/// A purchasable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub default_price: Option<ProductPrice>,
}

/// The price a product is sold at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPrice {
    pub id: PriceId,
    /// Missing for custom or tiered prices.
    pub unit_amount: Option<Price>,
    pub currency: CurrencyCode,
}

impl Product {
    /// Unit price, when the product has a fixed one.
    #[must_use]
    pub fn unit_amount(&self) -> Option<Price> {
        self.default_price.as_ref().and_then(|price| price.unit_amount)
    }

    /// Cart line for `quantity` units of this product.
    ///
    /// Returns `None` when the product has no fixed unit price.
    #[must_use]
    pub fn to_line_item(&self, quantity: u32) -> Option<CartLineItem> {
        Some(CartLineItem {
            id: self.id.clone(),
            name: self.name.clone(),
            unit_price: self.unit_amount()?,
            image_url: self.images.first().cloned(),
            quantity,
        })
    }

    fn category_key(&self) -> Option<String> {
        self.category.as_deref().map(|c| c.trim().to_lowercase())
    }
}

/// Products whose name or description contains `query`, ignoring case.
/// An empty query matches everything.
#[must_use]
pub fn search<'a>(products: &'a [Product], query: &str) -> Vec<&'a Product> {
    let needle = query.trim().to_lowercase();
    products
        .iter()
        .filter(|product| {
            needle.is_empty()
                || product.name.to_lowercase().contains(&needle)
                || product
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Distinct category names, trimmed and sorted.
#[must_use]
pub fn categories(products: &[Product]) -> Vec<String> {
    let mut names: Vec<String> = products
        .iter()
        .filter_map(|product| product.category.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Products in category `name` (trimmed, case-insensitive).
#[must_use]
pub fn in_category<'a>(products: &'a [Product], name: &str) -> Vec<&'a Product> {
    let wanted = name.trim().to_lowercase();
    products
        .iter()
        .filter(|product| product.category_key().is_some_and(|key| key == wanted))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str, category: Option<&str>) -> Product {
        Product {
            id: ProductId::parse(id).unwrap(),
            name: name.to_owned(),
            description: None,
            images: vec![],
            category: category.map(str::to_owned),
            default_price: Some(ProductPrice {
                id: PriceId::parse(&format!("price_{id}")).unwrap(),
                unit_amount: Some(Price::from_minor(250)),
                currency: CurrencyCode::default(),
            }),
        }
    }

    #[test]
    fn test_search_name_and_description() {
        let mut kale = product("p1", "Curly Kale", Some("Greens"));
        kale.description = Some("Fresh from the FARM".to_owned());
        let products = vec![kale, product("p2", "Carrots", None)];

        let hits: Vec<_> = search(&products, "farm").iter().map(|p| p.id.as_str()).collect();
        assert_eq!(hits, ["p1"]);
        let hits: Vec<_> = search(&products, "CARROT").iter().map(|p| p.id.as_str()).collect();
        assert_eq!(hits, ["p2"]);
        assert_eq!(search(&products, "").len(), 2);
    }

    #[test]
    fn test_categories_trimmed_sorted_unique() {
        let products = vec![
            product("p1", "A", Some(" Greens ")),
            product("p2", "B", Some("Fruit")),
            product("p3", "C", Some("Greens")),
            product("p4", "D", None),
        ];
        assert_eq!(categories(&products), ["Fruit", "Greens"]);
    }

    #[test]
    fn test_in_category_ignores_case() {
        let products = vec![
            product("p1", "A", Some(" Greens ")),
            product("p2", "B", Some("Fruit")),
        ];
        let hits: Vec<_> = in_category(&products, "greens")
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(hits, ["p1"]);
    }

    #[test]
    fn test_line_item_uses_first_image() {
        let mut p = product("p1", "Kale", None);
        p.images = vec!["a.png".to_owned(), "b.png".to_owned()];
        let line = p.to_line_item(2).unwrap();
        assert_eq!(line.image_url.as_deref(), Some("a.png"));
        assert_eq!(line.subtotal(), Price::from_minor(500));
    }

    #[test]
    fn test_line_item_needs_unit_amount() {
        let mut p = product("p1", "Kale", None);
        p.default_price = None;
        assert!(p.to_line_item(1).is_none());
    }
}
