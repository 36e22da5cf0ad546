//! Persistence seam.
//!
//! Each resource family has its own repository trait; [`Store`] bundles them
//! so handlers can hold a single `Arc<dyn Store>`. Two implementations ship:
//!
//! - [`postgres::PgStore`] - sqlx over PostgreSQL, used in production.
//! - [`memory::MemoryStore`] - a lock-guarded in-process store for local
//!   development and tests.
//!
//! Operations that touch stock (`place_order`, `cancel_order`) are atomic in
//! both implementations.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    Cart, Category, Order, OrderStatus, Payment, PaymentStatus, Permission, Product, RatingSummary, Review, Role,
    User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not enough stock for {product}: {available} available, {requested} requested")]
    InsufficientStock { product: String, available: i32, requested: i32 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The statuses an order write was computed from. The store compares them
/// with what it holds inside the write and fails with `Conflict`, writing
/// nothing, when another writer got there first. `payment: None` means no
/// payment row existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub order: OrderStatus,
    pub payment: Option<PaymentStatus>,
}

impl Expected {
    pub fn of(order: &Order, payment: Option<&Payment>) -> Self {
        Self { order: order.status, payment: payment.map(|p| p.status) }
    }

    pub(crate) fn stale() -> StoreError { StoreError::Conflict("order was changed by another request".into()) }
}

/// Product listing filters. `page` is 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub in_stock_only: bool,
    pub page: u32,
    pub limit: u32,
}

impl ProductQuery {
    pub fn offset(&self) -> u64 { u64::from(self.page.max(1) - 1) * u64::from(self.limit) }

    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = self.category_id {
            if product.category_id != Some(category) { return false; }
        }
        if let Some(search) = self.search.as_deref() {
            if !product.name.to_lowercase().contains(&search.to_lowercase()) { return false; }
        }
        if self.min_price.is_some_and(|min| product.price < min) { return false; }
        if self.max_price.is_some_and(|max| product.price > max) { return false; }
        !(self.in_stock_only && !product.is_in_stock())
    }
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the username or email is taken.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn update_user(&self, user: &User) -> StoreResult<()>;
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;
    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    /// Looks a user up by email or username.
    async fn user_by_login(&self, login: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
}

#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn insert_permission(&self, permission: &Permission) -> StoreResult<()>;
    async fn update_permission(&self, permission: &Permission) -> StoreResult<()>;
    /// Also detaches the permission from every role.
    async fn delete_permission(&self, id: Uuid) -> StoreResult<bool>;
    async fn list_permissions(&self) -> StoreResult<Vec<Permission>>;
    async fn permissions_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Permission>>;

    async fn insert_role(&self, role: &Role) -> StoreResult<()>;
    async fn update_role(&self, role: &Role) -> StoreResult<()>;
    /// Also detaches the role from every user.
    async fn delete_role(&self, id: Uuid) -> StoreResult<bool>;
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    async fn role_by_id(&self, id: Uuid) -> StoreResult<Option<Role>>;
    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    async fn roles_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Role>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_category(&self, category: &Category) -> StoreResult<()>;
    async fn update_category(&self, category: &Category) -> StoreResult<()>;
    /// Fails with `Conflict` while products still reference the category.
    async fn delete_category(&self, id: Uuid) -> StoreResult<bool>;
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn category_by_id(&self, id: Uuid) -> StoreResult<Option<Category>>;

    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    async fn update_product(&self, product: &Product) -> StoreResult<()>;
    async fn delete_product(&self, id: Uuid) -> StoreResult<bool>;
    async fn product_by_id(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>>;
    /// Newest first.
    async fn search_products(&self, query: &ProductQuery) -> StoreResult<Page<Product>>;

    async fn insert_review(&self, review: &Review) -> StoreResult<()>;
    async fn delete_review(&self, id: Uuid) -> StoreResult<bool>;
    async fn review_by_id(&self, id: Uuid) -> StoreResult<Option<Review>>;
    async fn reviews_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Review>>;
    async fn rating_summary(&self, product_id: Uuid) -> StoreResult<RatingSummary>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_for_user(&self, user_id: Uuid) -> StoreResult<Option<Cart>>;
    /// Upserts the cart and replaces its items.
    async fn save_cart(&self, cart: &Cart) -> StoreResult<()>;
    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order, its items and payment and decrements stock, all or
    /// nothing. Fails with `InsufficientStock` without side effects.
    async fn place_order(&self, order: &Order, payment: &Payment) -> StoreResult<()>;
    /// Persists a cancelled order and its payment and restores stock, only
    /// if the stored statuses still match `expected`.
    async fn cancel_order(&self, order: &Order, payment: &Payment, expected: Expected) -> StoreResult<()>;
    /// Persists order status and payment together, guarded like `cancel_order`.
    async fn save_order(&self, order: &Order, payment: Option<&Payment>, expected: Expected) -> StoreResult<()>;
    async fn order_by_id(&self, id: Uuid) -> StoreResult<Option<Order>>;
    /// Newest first.
    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;
    async fn list_orders(&self, status: Option<OrderStatus>, page: u32, limit: u32) -> StoreResult<Page<Order>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn payment_for_order(&self, order_id: Uuid) -> StoreResult<Option<Payment>>;
    async fn payment_by_id(&self, id: Uuid) -> StoreResult<Option<Payment>>;
    /// Upserts by order id when the stored status is still `expected`
    /// (`None`: no payment stored yet). Fails with `Conflict` otherwise.
    async fn save_payment(&self, payment: &Payment, expected: Option<PaymentStatus>) -> StoreResult<()>;
    async fn list_payments(&self, page: u32, limit: u32) -> StoreResult<Page<Payment>>;
}

/// Everything the application persists.
pub trait Store: UserStore + AccessStore + CatalogStore + CartStore + OrderStore + PaymentStore {}

impl<T> Store for T where T: UserStore + AccessStore + CatalogStore + CartStore + OrderStore + PaymentStore {}

pub(crate) fn page_offset(page: u32, limit: u32) -> u64 { u64::from(page.max(1) - 1) * u64::from(limit) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::ProductDraft;

    #[test]
    fn test_product_query_matches() {
        let category = Uuid::now_v7();
        let product = Product::create(ProductDraft {
            name: "Green Tea".into(), price: 50_000, stock: 0, category_id: Some(category), ..Default::default()
        });

        assert!(ProductQuery::default().matches(&product));
        assert!(ProductQuery { search: Some("TEA".into()), ..Default::default() }.matches(&product));
        assert!(!ProductQuery { category_id: Some(Uuid::now_v7()), ..Default::default() }.matches(&product));
        assert!(!ProductQuery { min_price: Some(60_000), ..Default::default() }.matches(&product));
        assert!(ProductQuery { max_price: Some(50_000), ..Default::default() }.matches(&product));
        assert!(!ProductQuery { in_stock_only: true, ..Default::default() }.matches(&product));
    }

    #[test]
    fn test_offsets() {
        assert_eq!(page_offset(0, 10), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(ProductQuery { page: 2, limit: 12, ..Default::default() }.offset(), 12);
    }
}
