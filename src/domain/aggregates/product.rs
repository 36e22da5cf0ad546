//! Catalog: categories, products and reviews

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn create(name: impl Into<String>, description: Option<String>) -> Self {
        Self { id: Uuid::now_v7(), name: name.into(), description, created_at: Utc::now() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable product fields, shared by create and update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductDraft {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
    pub images: Vec<String>,
}

impl Product {
    pub fn create(draft: ProductDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: draft.name, description: draft.description, price: draft.price,
            stock: draft.stock, category_id: draft.category_id, brand: draft.brand, images: draft.images,
            created_at: now, updated_at: now,
        }
    }

    pub fn apply(&mut self, draft: ProductDraft) {
        self.name = draft.name;
        self.description = draft.description;
        self.price = draft.price;
        self.stock = draft.stock;
        self.category_id = draft.category_id;
        self.brand = draft.brand;
        self.images = draft.images;
        self.updated_at = Utc::now();
    }

    pub fn is_in_stock(&self) -> bool { self.stock > 0 }

    pub fn ensure_available(&self, quantity: i32) -> Result<(), ProductError> {
        if quantity > self.stock {
            return Err(ProductError::InsufficientStock { product: self.name.clone(), available: self.stock, requested: quantity });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn create(product_id: Uuid, user_id: Uuid, rating: i16, comment: Option<String>) -> Self {
        Self { id: Uuid::now_v7(), product_id, user_id, rating, comment, created_at: Utc::now() }
    }
}

/// Average rating and count for one product.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average_rating: f64,
    pub review_count: i64,
}

impl RatingSummary {
    pub fn from_ratings(ratings: impl IntoIterator<Item = i16>) -> Self {
        let (sum, count) = ratings.into_iter().fold((0i64, 0i64), |(s, c), r| (s + i64::from(r), c + 1));
        if count == 0 { return Self::default(); }
        let average = (sum as f64 / count as f64 * 10.0).round() / 10.0;
        Self { average_rating: average, review_count: count }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("not enough stock for {product}: {available} available, {requested} requested")]
    InsufficientStock { product: String, available: i32, requested: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_create() {
        let p = Product::create(ProductDraft { name: "Test Product".into(), price: 199_000, stock: 3, ..Default::default() });
        assert_eq!(p.name, "Test Product");
        assert!(p.is_in_stock());
    }

    #[test]
    fn test_availability() {
        let p = Product::create(ProductDraft { name: "P".into(), price: 10, stock: 5, ..Default::default() });
        assert!(p.ensure_available(5).is_ok());
        assert_eq!(
            p.ensure_available(6),
            Err(ProductError::InsufficientStock { product: "P".into(), available: 5, requested: 6 })
        );
    }

    #[test]
    fn test_rating_summary() {
        assert_eq!(RatingSummary::from_ratings(vec![]), RatingSummary::default());
        let s = RatingSummary::from_ratings(vec![5, 4, 4]);
        assert_eq!(s.review_count, 3);
        assert!((s.average_rating - 4.3).abs() < f64::EPSILON);
    }
}
