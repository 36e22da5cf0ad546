//! Aggregates module
pub mod cart;
pub mod order;
pub mod payment;
pub mod product;
pub mod user;

pub use cart::{Cart, CartError, CartItem};
pub use order::{Order, OrderError, OrderItem, OrderLine, OrderStatus, ShippingAddress};
pub use payment::{Payment, PaymentError, PaymentMethod, PaymentStatus};
pub use product::{Category, Product, ProductDraft, ProductError, RatingSummary, Review};
pub use user::{Permission, Role, User};
