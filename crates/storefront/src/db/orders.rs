//! Order records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use green_basket_core::{CartLineItem, NewOrder, Order, OrderId, Price, UserId, newest_first};

use super::RepositoryError;

/// Append-only order history.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Record an order.
    async fn append(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// A user's orders, newest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, RepositoryError>;
}

// =============================================================================
// Postgres
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    items: Json<Vec<CartLineItem>>,
    total: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let user_id = UserId::parse(&row.user_id)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid user id: {e}")))?;
        let total = u64::try_from(row.total)
            .map_err(|_| RepositoryError::DataCorruption(format!("negative total on {}", row.id)))?;

        Ok(Self {
            id: OrderId::new(row.id),
            user_id,
            items: row.items.0,
            total: Price::from_minor(total),
            created_at: row.created_at,
        })
    }
}

/// [`OrderStore`] over `storefront.orders`.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn append(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let total = i64::try_from(order.total.minor())
            .map_err(|_| RepositoryError::DataCorruption("order total out of range".to_owned()))?;

        let row: OrderRow = sqlx::query_as(
            r"
            INSERT INTO storefront.orders (id, user_id, items, total)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, items, total, created_at
            ",
        )
        .bind(OrderId::generate().as_uuid())
        .bind(order.user_id.as_str())
        .bind(Json(&order.items))
        .bind(total)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            r"
            SELECT id, user_id, items, total, created_at
            FROM storefront.orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }
}

// =============================================================================
// Memory
// =============================================================================

/// Process-local order history for tests and database-less runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryOrderStore {
    orders: Arc<RwLock<Vec<Order>>>,
}

impl MemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn append(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let order = Order {
            id: OrderId::generate(),
            user_id: order.user_id,
            items: order.items,
            total: order.total,
            created_at: Utc::now(),
        };
        self.orders.write().await.push(order.clone());
        Ok(order)
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .iter()
            .filter(|order| &order.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut orders);
        Ok(orders)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use green_basket_core::{CartState, ProductId};

    use super::*;

    fn order_for(user: &str, quantity: u32) -> NewOrder {
        let mut cart = CartState::new();
        cart.set_hydrated(true);
        cart.add_product(CartLineItem {
            id: ProductId::parse("p1").unwrap(),
            name: "Kale".to_owned(),
            unit_price: Price::from_minor(450),
            image_url: None,
            quantity,
        });
        NewOrder::from_cart(UserId::parse(user).unwrap(), &cart).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_lists_per_user_newest_first() {
        let store = MemoryOrderStore::new();
        let first = store.append(order_for("u1", 1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.append(order_for("u1", 2)).await.unwrap();
        store.append(order_for("u2", 3)).await.unwrap();

        let orders = store
            .list_for_user(&UserId::parse("u1").unwrap())
            .await
            .unwrap();
        assert_eq!(
            orders.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
        assert_eq!(second.total, Price::from_minor(900));
    }

    #[test]
    fn test_negative_total_is_corruption() {
        let row = OrderRow {
            id: Uuid::new_v4(),
            user_id: "u1".to_owned(),
            items: Json(Vec::new()),
            total: -1,
            created_at: Utc::now(),
        };
        assert!(matches!(
            Order::try_from(row),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}
