//! PostgreSQL store (sqlx).
//!
//! Queries are built at runtime with `query_as` so the crate compiles without
//! a live database. Schema lives in `migrations/`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    page_offset, AccessStore, CartStore, CatalogStore, Expected, OrderStore, Page, PaymentStore, ProductQuery,
    StoreError, StoreResult, UserStore,
};
use crate::domain::aggregates::{
    Cart, CartItem, Category, Order, OrderItem, OrderStatus, Payment, PaymentStatus, Permission, Product,
    RatingSummary, Review, Role, User,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn attach_items(&self, orders: &mut [Order]) -> StoreResult<()> {
        if orders.is_empty() { return Ok(()); }
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY id")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }
        for order in orders.iter_mut() {
            order.items = by_order.remove(&order.id).unwrap_or_default();
        }
        Ok(())
    }
}

/// Maps unique violations to `Conflict`, naming the clashing field when the
/// constraint tells us which one it was.
fn map_unique(e: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            let message = match db.constraint() {
                Some("users_username_key") => "username already exists".to_string(),
                Some("users_email_key") => "email already exists".to_string(),
                _ => format!("{what} already exists"),
            };
            return StoreError::Conflict(message);
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query("INSERT INTO users (id, username, email, password_hash, full_name, phone, address, role_ids, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(user.id).bind(&user.username).bind(&user.email).bind(&user.password_hash)
            .bind(&user.full_name).bind(&user.phone).bind(&user.address).bind(&user.role_ids)
            .bind(user.created_at).bind(user.updated_at)
            .execute(&self.pool).await.map_err(|e| map_unique(e, "user"))?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let done = sqlx::query("UPDATE users SET email = $2, password_hash = $3, full_name = $4, phone = $5, address = $6, role_ids = $7, updated_at = $8 WHERE id = $1")
            .bind(user.id).bind(&user.email).bind(&user.password_hash).bind(&user.full_name)
            .bind(&user.phone).bind(&user.address).bind(&user.role_ids).bind(user.updated_at)
            .execute(&self.pool).await.map_err(|e| map_unique(e, "user"))?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound("user")); }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn user_by_login(&self, login: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = LOWER($1) OR LOWER(username) = LOWER($1) LIMIT 1")
            .bind(login.trim())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC").fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl AccessStore for PgStore {
    async fn insert_permission(&self, permission: &Permission) -> StoreResult<()> {
        sqlx::query("INSERT INTO permissions (id, key, description, created_at) VALUES ($1, $2, $3, $4)")
            .bind(permission.id).bind(&permission.key).bind(&permission.description).bind(permission.created_at)
            .execute(&self.pool).await.map_err(|e| map_unique(e, "permission"))?;
        Ok(())
    }

    async fn update_permission(&self, permission: &Permission) -> StoreResult<()> {
        let done = sqlx::query("UPDATE permissions SET key = $2, description = $3 WHERE id = $1")
            .bind(permission.id).bind(&permission.key).bind(&permission.description)
            .execute(&self.pool).await.map_err(|e| map_unique(e, "permission"))?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound("permission")); }
        Ok(())
    }

    async fn delete_permission(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE roles SET permission_ids = array_remove(permission_ids, $1) WHERE $1 = ANY(permission_ids)")
            .bind(id).execute(&mut *tx).await?;
        let done = sqlx::query("DELETE FROM permissions WHERE id = $1").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        Ok(sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY key").fetch_all(&self.pool).await?)
    }

    async fn permissions_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Permission>> {
        Ok(sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = ANY($1) ORDER BY key")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_role(&self, role: &Role) -> StoreResult<()> {
        sqlx::query("INSERT INTO roles (id, name, description, permission_ids, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(role.id).bind(&role.name).bind(&role.description).bind(&role.permission_ids).bind(role.created_at)
            .execute(&self.pool).await.map_err(|e| map_unique(e, "role"))?;
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> StoreResult<()> {
        let done = sqlx::query("UPDATE roles SET name = $2, description = $3, permission_ids = $4 WHERE id = $1")
            .bind(role.id).bind(&role.name).bind(&role.description).bind(&role.permission_ids)
            .execute(&self.pool).await.map_err(|e| map_unique(e, "role"))?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound("role")); }
        Ok(())
    }

    async fn delete_role(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET role_ids = array_remove(role_ids, $1) WHERE $1 = ANY(role_ids)")
            .bind(id).execute(&mut *tx).await?;
        let done = sqlx::query("DELETE FROM roles WHERE id = $1").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        Ok(sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name").fetch_all(&self.pool).await?)
    }

    async fn role_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        Ok(sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1").bind(name).fetch_optional(&self.pool).await?)
    }

    async fn roles_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Role>> {
        Ok(sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = ANY($1) ORDER BY name")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        sqlx::query("INSERT INTO categories (id, name, description, created_at) VALUES ($1, $2, $3, $4)")
            .bind(category.id).bind(&category.name).bind(&category.description).bind(category.created_at)
            .execute(&self.pool).await.map_err(|e| map_unique(e, "category"))?;
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> StoreResult<()> {
        let done = sqlx::query("UPDATE categories SET name = $2, description = $3 WHERE id = $1")
            .bind(category.id).bind(&category.name).bind(&category.description)
            .execute(&self.pool).await.map_err(|e| map_unique(e, "category"))?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound("category")); }
        Ok(())
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<bool> {
        let (in_use,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM products WHERE category_id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if in_use { return Err(StoreError::Conflict("category still has products".into())); }
        let done = sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name").fetch_all(&self.pool).await?)
    }

    async fn category_by_id(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        sqlx::query("INSERT INTO products (id, name, description, price, stock, category_id, brand, images, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(product.id).bind(&product.name).bind(&product.description).bind(product.price).bind(product.stock)
            .bind(product.category_id).bind(&product.brand).bind(&product.images).bind(product.created_at).bind(product.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let done = sqlx::query("UPDATE products SET name = $2, description = $3, price = $4, stock = $5, category_id = $6, brand = $7, images = $8, updated_at = $9 WHERE id = $1")
            .bind(product.id).bind(&product.name).bind(&product.description).bind(product.price).bind(product.stock)
            .bind(product.category_id).bind(&product.brand).bind(&product.images).bind(product.updated_at)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound("product")); }
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn product_by_id(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
        Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn search_products(&self, query: &ProductQuery) -> StoreResult<Page<Product>> {
        fn filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, query: &'a ProductQuery) {
            qb.push(" WHERE TRUE");
            if let Some(category) = query.category_id {
                qb.push(" AND category_id = ").push_bind(category);
            }
            if let Some(search) = query.search.as_deref() {
                qb.push(" AND name ILIKE ").push_bind(format!("%{}%", search.replace('%', "\\%").replace('_', "\\_")));
            }
            if let Some(min) = query.min_price {
                qb.push(" AND price >= ").push_bind(min);
            }
            if let Some(max) = query.max_price {
                qb.push(" AND price <= ").push_bind(max);
            }
            if query.in_stock_only {
                qb.push(" AND stock > 0");
            }
        }

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        filters(&mut count, query);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM products");
        filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(query.offset() as i64);
        let items = select.build_query_as::<Product>().fetch_all(&self.pool).await?;
        Ok(Page { items, total })
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        sqlx::query("INSERT INTO reviews (id, product_id, user_id, rating, comment, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(review.id).bind(review.product_id).bind(review.user_id).bind(review.rating)
            .bind(&review.comment).bind(review.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_review(&self, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM reviews WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn review_by_id(&self, id: Uuid) -> StoreResult<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn reviews_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Review>> {
        Ok(sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn rating_summary(&self, product_id: Uuid) -> StoreResult<RatingSummary> {
        let ratings: Vec<(i16,)> = sqlx::query_as("SELECT rating FROM reviews WHERE product_id = $1")
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(RatingSummary::from_ratings(ratings.into_iter().map(|(r,)| r)))
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn cart_for_user(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        let row: Option<(Uuid, DateTime<Utc>, DateTime<Utc>)> =
            sqlx::query_as("SELECT id, created_at, updated_at FROM carts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some((id, created_at, updated_at)) = row else { return Ok(None) };
        let items = sqlx::query_as::<_, CartItem>("SELECT product_id, quantity, unit_price FROM cart_items WHERE cart_id = $1 ORDER BY position")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(Some(Cart { id, user_id, items, created_at, updated_at }))
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO carts (id, user_id, created_at, updated_at) VALUES ($1, $2, $3, $4) ON CONFLICT (user_id) DO UPDATE SET updated_at = EXCLUDED.updated_at")
            .bind(cart.id).bind(cart.user_id).bind(cart.created_at).bind(cart.updated_at)
            .execute(&mut *tx).await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(cart.id).execute(&mut *tx).await?;
        for (position, item) in cart.items.iter().enumerate() {
            sqlx::query("INSERT INTO cart_items (cart_id, product_id, quantity, unit_price, position) VALUES ($1, $2, $3, $4, $5)")
                .bind(cart.id).bind(item.product_id).bind(item.quantity).bind(item.unit_price).bind(position as i32)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = $1)")
            .bind(user_id).execute(&mut *tx).await?;
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE user_id = $1").bind(user_id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn place_order(&self, order: &Order, payment: &Payment) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for item in &order.items {
            let reserved: Option<(i32,)> = sqlx::query_as("UPDATE products SET stock = stock - $1, updated_at = NOW() WHERE id = $2 AND stock >= $1 RETURNING stock")
                .bind(item.quantity)
                .bind(item.product_id)
                .fetch_optional(&mut *tx)
                .await?;
            if reserved.is_none() {
                let current: Option<(String, i32)> = sqlx::query_as("SELECT name, stock FROM products WHERE id = $1")
                    .bind(item.product_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                // dropping the transaction rolls back earlier decrements
                return Err(match current {
                    Some((product, available)) => StoreError::InsufficientStock { product, available, requested: item.quantity },
                    None => StoreError::NotFound("product"),
                });
            }
        }
        sqlx::query("INSERT INTO orders (id, user_id, shipping_address, payment_method, status, total_amount, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(order.id).bind(order.user_id).bind(Json(&order.shipping_address)).bind(order.payment_method)
            .bind(order.status).bind(order.total_amount).bind(order.created_at).bind(order.updated_at)
            .execute(&mut *tx).await?;
        for item in &order.items {
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, product_name, quantity, price) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(item.id).bind(item.order_id).bind(item.product_id).bind(&item.product_name)
                .bind(item.quantity).bind(item.price)
                .execute(&mut *tx).await?;
        }
        upsert_payment(&mut tx, payment, None).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn cancel_order(&self, order: &Order, payment: &Payment, expected: Expected) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        update_order_status(&mut tx, order, expected.order).await?;
        for item in &order.items {
            sqlx::query("UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2")
                .bind(item.quantity)
                .bind(item.product_id)
                .execute(&mut *tx)
                .await?;
        }
        upsert_payment(&mut tx, payment, expected.payment).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_order(&self, order: &Order, payment: Option<&Payment>, expected: Expected) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        update_order_status(&mut tx, order, expected.order).await?;
        if let Some(payment) = payment {
            upsert_payment(&mut tx, payment, expected.payment).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn order_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let Some(order) = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let mut orders = [order];
        self.attach_items(&mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let mut orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        self.attach_items(&mut orders).await?;
        Ok(orders)
    }

    async fn list_orders(&self, status: Option<OrderStatus>, page: u32, limit: u32) -> StoreResult<Page<Order>> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE ($1::order_status IS NULL OR status = $1)")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        let mut items = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE ($1::order_status IS NULL OR status = $1) ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3")
            .bind(status)
            .bind(i64::from(limit))
            .bind(page_offset(page, limit) as i64)
            .fetch_all(&self.pool)
            .await?;
        self.attach_items(&mut items).await?;
        Ok(Page { items, total })
    }
}

/// Concurrent updates of the same row queue on its lock and re-check the
/// status, so only the first writer matches.
async fn update_order_status(tx: &mut sqlx::Transaction<'_, Postgres>, order: &Order, from: OrderStatus) -> StoreResult<()> {
    let done = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 AND status = $4")
        .bind(order.id)
        .bind(order.status)
        .bind(order.updated_at)
        .bind(from)
        .execute(&mut **tx)
        .await?;
    if done.rows_affected() == 0 {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1").bind(order.id).fetch_optional(&mut **tx).await?;
        return Err(if exists.is_some() { Expected::stale() } else { StoreError::NotFound("order") });
    }
    Ok(())
}

/// Inserts, or updates the existing row only while its status is `from`.
/// A `NULL` `from` never matches an existing row.
async fn upsert_payment(tx: &mut sqlx::Transaction<'_, Postgres>, payment: &Payment, from: Option<PaymentStatus>) -> StoreResult<()> {
    let done = sqlx::query(
        "INSERT INTO payments (id, order_id, method, amount, status, transaction_no, bank_code, response_code, paid_at, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (order_id) DO UPDATE SET status = EXCLUDED.status, transaction_no = EXCLUDED.transaction_no, \
         bank_code = EXCLUDED.bank_code, response_code = EXCLUDED.response_code, paid_at = EXCLUDED.paid_at, updated_at = EXCLUDED.updated_at \
         WHERE payments.status = $12",
    )
    .bind(payment.id).bind(payment.order_id).bind(payment.method).bind(payment.amount).bind(payment.status)
    .bind(&payment.transaction_no).bind(&payment.bank_code).bind(&payment.response_code).bind(payment.paid_at)
    .bind(payment.created_at).bind(payment.updated_at).bind(from)
    .execute(&mut **tx)
    .await?;
    if done.rows_affected() == 0 { return Err(Expected::stale()); }
    Ok(())
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn payment_for_order(&self, order_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn payment_by_id(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn save_payment(&self, payment: &Payment, expected: Option<PaymentStatus>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        upsert_payment(&mut tx, payment, expected).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_payments(&self, page: u32, limit: u32) -> StoreResult<Page<Payment>> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payments").fetch_one(&self.pool).await?;
        let items = sqlx::query_as::<_, Payment>("SELECT * FROM payments ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(i64::from(limit))
            .bind(page_offset(page, limit) as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(Page { items, total })
    }
}
