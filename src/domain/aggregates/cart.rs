//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
}

impl CartItem {
    pub fn line_total(&self) -> i64 { self.unit_price * i64::from(self.quantity) }
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), user_id, items: vec![], created_at: now, updated_at: now }
    }

    pub fn total(&self) -> i64 { self.items.iter().map(CartItem::line_total).sum() }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Adds `quantity` of a product, merging with an existing line and
    /// refreshing its price.
    pub fn add_item(&mut self, product_id: Uuid, quantity: i32, unit_price: i64, available: i32) -> Result<(), CartError> {
        if quantity < 1 { return Err(CartError::InvalidQuantity); }
        let current = self.items.iter().find(|i| i.product_id == product_id).map_or(0, |i| i.quantity);
        let wanted = current.saturating_add(quantity);
        if wanted > available { return Err(CartError::ExceedsStock { available }); }
        match self.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(existing) => { existing.quantity = wanted; existing.unit_price = unit_price; }
            None => self.items.push(CartItem { product_id, quantity, unit_price }),
        }
        self.touch();
        Ok(())
    }

    /// Sets the quantity of a line; zero removes it.
    pub fn update_quantity(&mut self, product_id: Uuid, quantity: i32, available: i32) -> Result<(), CartError> {
        if quantity < 0 { return Err(CartError::InvalidQuantity); }
        if quantity == 0 { return self.remove_item(product_id); }
        if quantity > available { return Err(CartError::ExceedsStock { available }); }
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        item.quantity = quantity;
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("item not found in cart")]
    ItemNotFound,
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("only {available} left in stock")]
    ExceedsStock { available: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new(Uuid::now_v7());
        let p1 = Uuid::now_v7();
        cart.add_item(p1, 2, 10_000, 10).unwrap();
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total(), 20_000);
        cart.add_item(p1, 1, 10_000, 10).unwrap();
        assert_eq!(cart.items[0].quantity, 3); // Merged
    }

    #[test]
    fn test_add_respects_stock() {
        let mut cart = Cart::new(Uuid::now_v7());
        let p1 = Uuid::now_v7();
        cart.add_item(p1, 4, 100, 5).unwrap();
        assert_eq!(cart.add_item(p1, 2, 100, 5), Err(CartError::ExceedsStock { available: 5 }));
        assert_eq!(cart.items[0].quantity, 4);
    }

    #[test]
    fn test_update_and_remove() {
        let mut cart = Cart::new(Uuid::now_v7());
        let p1 = Uuid::now_v7();
        assert_eq!(cart.update_quantity(p1, 1, 5), Err(CartError::ItemNotFound));
        cart.add_item(p1, 1, 100, 5).unwrap();
        cart.update_quantity(p1, 5, 5).unwrap();
        assert_eq!(cart.total(), 500);
        cart.update_quantity(p1, 0, 5).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.remove_item(p1), Err(CartError::ItemNotFound));
    }
}
