//! In-process store.
//!
//! Every operation takes the single lock, so multi-entity writes such as
//! placing an order are atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    page_offset, AccessStore, CartStore, CatalogStore, Expected, OrderStore, Page, PaymentStore, ProductQuery,
    StoreError, StoreResult, UserStore,
};
use crate::domain::aggregates::{
    Cart, Category, Order, OrderStatus, Payment, PaymentStatus, Permission, Product, RatingSummary, Review, Role, User,
};

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    permissions: HashMap<Uuid, Permission>,
    roles: HashMap<Uuid, Role>,
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    reviews: HashMap<Uuid, Review>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl Inner {
    fn payment_status(&self, order_id: Uuid) -> Option<PaymentStatus> {
        self.payments.values().find(|p| p.order_id == order_id).map(|p| p.status)
    }

    /// Compares stored statuses with `expected`; callers hold the write lock.
    fn check(&self, order_id: Uuid, expected: Expected) -> StoreResult<()> {
        let order = self.orders.get(&order_id).ok_or(StoreError::NotFound("order"))?;
        if order.status != expected.order || self.payment_status(order_id) != expected.payment {
            return Err(Expected::stale());
        }
        Ok(())
    }

    /// One payment per order.
    fn put_payment(&mut self, payment: &Payment) {
        self.payments.retain(|_, p| p.order_id != payment.order_id || p.id == payment.id);
        self.payments.insert(payment.id, payment.clone());
    }
}

fn paginate<T: Clone>(mut items: Vec<T>, page: u32, limit: u32) -> Page<T> {
    let total = items.len() as i64;
    let offset = usize::try_from(page_offset(page, limit)).unwrap_or(usize::MAX);
    let items = if offset >= items.len() { vec![] } else { items.drain(offset..).take(limit as usize).collect() };
    Page { items, total }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.username.eq_ignore_ascii_case(&user.username)) {
            return Err(StoreError::Conflict("username already exists".into()));
        }
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email already exists".into()));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.id != user.id && u.email == user.email) {
            return Err(StoreError::Conflict("email already exists".into()));
        }
        let slot = inner.users.get_mut(&user.id).ok_or(StoreError::NotFound("user"))?;
        *slot = user.clone();
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        inner.carts.remove(&id);
        Ok(inner.users.remove(&id).is_some())
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn user_by_login(&self, login: &str) -> StoreResult<Option<User>> {
        let login = login.trim();
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(login) || u.username.eq_ignore_ascii_case(login))
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.inner.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn insert_permission(&self, permission: &Permission) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.permissions.values().any(|p| p.key == permission.key) {
            return Err(StoreError::Conflict(format!("permission '{}' already exists", permission.key)));
        }
        inner.permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn update_permission(&self, permission: &Permission) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.permissions.values().any(|p| p.id != permission.id && p.key == permission.key) {
            return Err(StoreError::Conflict(format!("permission '{}' already exists", permission.key)));
        }
        let slot = inner.permissions.get_mut(&permission.id).ok_or(StoreError::NotFound("permission"))?;
        *slot = permission.clone();
        Ok(())
    }

    async fn delete_permission(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner.permissions.remove(&id).is_some();
        for role in inner.roles.values_mut() {
            role.permission_ids.retain(|p| *p != id);
        }
        Ok(removed)
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let mut permissions: Vec<Permission> = self.inner.read().await.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(permissions)
    }

    async fn permissions_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Permission>> {
        let inner = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| inner.permissions.get(id).cloned()).collect())
    }

    async fn insert_role(&self, role: &Role) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.roles.values().any(|r| r.name == role.name) {
            return Err(StoreError::Conflict(format!("role '{}' already exists", role.name)));
        }
        inner.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.roles.values().any(|r| r.id != role.id && r.name == role.name) {
            return Err(StoreError::Conflict(format!("role '{}' already exists", role.name)));
        }
        let slot = inner.roles.get_mut(&role.id).ok_or(StoreError::NotFound("role"))?;
        *slot = role.clone();
        Ok(())
    }

    async fn delete_role(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner.roles.remove(&id).is_some();
        for user in inner.users.values_mut() {
            user.role_ids.retain(|r| *r != id);
        }
        Ok(removed)
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.inner.read().await.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn role_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        Ok(self.inner.read().await.roles.get(&id).cloned())
    }

    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self.inner.read().await.roles.values().find(|r| r.name == name).cloned())
    }

    async fn roles_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Role>> {
        let inner = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| inner.roles.get(id).cloned()).collect())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.categories.values().any(|c| c.name.eq_ignore_ascii_case(&category.name)) {
            return Err(StoreError::Conflict(format!("category '{}' already exists", category.name)));
        }
        inner.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.categories.values().any(|c| c.id != category.id && c.name.eq_ignore_ascii_case(&category.name)) {
            return Err(StoreError::Conflict(format!("category '{}' already exists", category.name)));
        }
        let slot = inner.categories.get_mut(&category.id).ok_or(StoreError::NotFound("category"))?;
        *slot = category.clone();
        Ok(())
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.products.values().any(|p| p.category_id == Some(id)) {
            return Err(StoreError::Conflict("category still has products".into()));
        }
        Ok(inner.categories.remove(&id).is_some())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut categories: Vec<Category> = self.inner.read().await.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn category_by_id(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(self.inner.read().await.categories.get(&id).cloned())
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        self.inner.write().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let slot = inner.products.get_mut(&product.id).ok_or(StoreError::NotFound("product"))?;
        *slot = product.clone();
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        inner.reviews.retain(|_, r| r.product_id != id);
        Ok(inner.products.remove(&id).is_some())
    }

    async fn product_by_id(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.inner.read().await.products.get(&id).cloned())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
        let inner = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| inner.products.get(id).cloned()).collect())
    }

    async fn search_products(&self, query: &ProductQuery) -> StoreResult<Page<Product>> {
        let inner = self.inner.read().await;
        let mut matching: Vec<Product> = inner.products.values().filter(|p| query.matches(p)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(paginate(matching, query.page, query.limit))
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        self.inner.write().await.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn delete_review(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.inner.write().await.reviews.remove(&id).is_some())
    }

    async fn review_by_id(&self, id: Uuid) -> StoreResult<Option<Review>> {
        Ok(self.inner.read().await.reviews.get(&id).cloned())
    }

    async fn reviews_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Review>> {
        let inner = self.inner.read().await;
        let mut reviews: Vec<Review> = inner.reviews.values().filter(|r| r.product_id == product_id).cloned().collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn rating_summary(&self, product_id: Uuid) -> StoreResult<RatingSummary> {
        let inner = self.inner.read().await;
        Ok(RatingSummary::from_ratings(
            inner.reviews.values().filter(|r| r.product_id == product_id).map(|r| r.rating),
        ))
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart_for_user(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        Ok(self.inner.read().await.carts.get(&user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        self.inner.write().await.carts.insert(cart.user_id, cart.clone());
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
        if let Some(cart) = self.inner.write().await.carts.get_mut(&user_id) {
            cart.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, order: &Order, payment: &Payment) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        // check everything before touching anything
        for item in &order.items {
            let product = inner.products.get(&item.product_id).ok_or(StoreError::NotFound("product"))?;
            if product.stock < item.quantity {
                return Err(StoreError::InsufficientStock {
                    product: product.name.clone(), available: product.stock, requested: item.quantity,
                });
            }
        }
        for item in &order.items {
            if let Some(product) = inner.products.get_mut(&item.product_id) {
                product.stock -= item.quantity;
            }
        }
        inner.orders.insert(order.id, order.clone());
        inner.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn cancel_order(&self, order: &Order, payment: &Payment, expected: Expected) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.check(order.id, expected)?;
        for item in &order.items {
            // products deleted since the order was placed are skipped
            if let Some(product) = inner.products.get_mut(&item.product_id) {
                product.stock += item.quantity;
            }
        }
        inner.orders.insert(order.id, order.clone());
        inner.put_payment(payment);
        Ok(())
    }

    async fn save_order(&self, order: &Order, payment: Option<&Payment>, expected: Expected) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.check(order.id, expected)?;
        inner.orders.insert(order.id, order.clone());
        if let Some(payment) = payment {
            inner.put_payment(payment);
        }
        Ok(())
    }

    async fn order_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner.orders.values().filter(|o| o.user_id == user_id).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn list_orders(&self, status: Option<OrderStatus>, page: u32, limit: u32) -> StoreResult<Page<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> =
            inner.orders.values().filter(|o| status.map_or(true, |s| o.status == s)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(paginate(orders, page, limit))
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn payment_for_order(&self, order_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.inner.read().await.payments.values().find(|p| p.order_id == order_id).cloned())
    }

    async fn payment_by_id(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.inner.read().await.payments.get(&id).cloned())
    }

    async fn save_payment(&self, payment: &Payment, expected: Option<PaymentStatus>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.payment_status(payment.order_id) != expected { return Err(Expected::stale()); }
        inner.put_payment(payment);
        Ok(())
    }

    async fn list_payments(&self, page: u32, limit: u32) -> StoreResult<Page<Payment>> {
        let mut payments: Vec<Payment> = self.inner.read().await.payments.values().cloned().collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(payments, page, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderLine, PaymentMethod, ProductDraft, ShippingAddress};

    async fn seeded(stock: i32) -> (MemoryStore, Product) {
        let store = MemoryStore::new();
        let product = Product::create(ProductDraft { name: "Mug".into(), price: 1000, stock, ..Default::default() });
        store.insert_product(&product).await.unwrap();
        (store, product)
    }

    fn order_for(product: &Product, quantity: i32) -> (Order, Payment) {
        let line = OrderLine { product_id: product.id, product_name: product.name.clone(), quantity, price: product.price };
        let order = Order::place(Uuid::now_v7(), vec![line], ShippingAddress::default(), PaymentMethod::Cod).unwrap();
        let payment = Payment::for_order(&order);
        (order, payment)
    }

    #[tokio::test]
    async fn test_place_order_decrements_stock() {
        let (store, product) = seeded(5).await;
        let (order, payment) = order_for(&product, 2);
        store.place_order(&order, &payment).await.unwrap();
        assert_eq!(store.product_by_id(product.id).await.unwrap().unwrap().stock, 3);
        assert!(store.payment_for_order(order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_place_order_insufficient_stock_is_atomic() {
        let (store, product) = seeded(1).await;
        let (order, payment) = order_for(&product, 2);
        let err = store.place_order(&order, &payment).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { available: 1, requested: 2, .. }));
        assert_eq!(store.product_by_id(product.id).await.unwrap().unwrap().stock, 1);
        assert!(store.order_by_id(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_cancel_writes_nothing() {
        let (store, product) = seeded(5).await;
        let (order, payment) = order_for(&product, 2);
        store.place_order(&order, &payment).await.unwrap();
        let expected = Expected::of(&order, Some(&payment));

        let (mut first, mut first_payment) = (order.clone(), payment.clone());
        first.cancel(&mut first_payment, chrono::Utc::now(), false).unwrap();
        store.cancel_order(&first, &first_payment, expected).await.unwrap();

        let (mut second, mut second_payment) = (order.clone(), payment.clone());
        second.cancel(&mut second_payment, chrono::Utc::now(), false).unwrap();
        let err = store.cancel_order(&second, &second_payment, expected).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.product_by_id(product.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_save_payment_checks_stored_status() {
        let (store, product) = seeded(5).await;
        let (order, mut payment) = order_for(&product, 1);
        store.place_order(&order, &payment).await.unwrap();

        payment.fail(Some("24".into()));
        assert!(matches!(store.save_payment(&payment, None).await, Err(StoreError::Conflict(_))));
        store.save_payment(&payment, Some(PaymentStatus::Pending)).await.unwrap();
        assert_eq!(store.payment_for_order(order.id).await.unwrap().unwrap().status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let store = MemoryStore::new();
        let mk = |name: &str, email: &str| User::register(
            crate::domain::value_objects::Username::parse(name).unwrap(),
            crate::domain::value_objects::Email::parse(email).unwrap(),
            "hash".into(), None, vec![],
        );
        store.insert_user(&mk("alice", "a@example.com")).await.unwrap();
        assert!(matches!(store.insert_user(&mk("Alice", "b@example.com")).await, Err(StoreError::Conflict(_))));
        assert!(matches!(store.insert_user(&mk("bob", "a@example.com")).await, Err(StoreError::Conflict(_))));
        assert!(store.user_by_login("A@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pagination() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let p = Product::create(ProductDraft { name: format!("P{i}"), price: 1, stock: 1, ..Default::default() });
            store.insert_product(&p).await.unwrap();
        }
        let page = store.search_products(&ProductQuery { page: 2, limit: 2, ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        let page = store.search_products(&ProductQuery { page: 4, limit: 2, ..Default::default() }).await.unwrap();
        assert!(page.items.is_empty());
    }
}
