//! Permission catalogue and default role grants.

use crate::domain::aggregates::Role;

pub const PRODUCTS_MANAGE: &str = "products:manage";
pub const CATEGORIES_MANAGE: &str = "categories:manage";
pub const ORDERS_MANAGE: &str = "orders:manage";
pub const PAYMENTS_MANAGE: &str = "payments:manage";
pub const REVIEWS_MANAGE: &str = "reviews:manage";
pub const USERS_MANAGE: &str = "users:manage";
pub const ROLES_MANAGE: &str = "roles:manage";
pub const ALL: &str = "all";

/// Seeded at startup, with descriptions.
pub const CATALOGUE: &[(&str, &str)] = &[
    (PRODUCTS_MANAGE, "Create, update and delete products"),
    (CATEGORIES_MANAGE, "Create, update and delete categories"),
    (ORDERS_MANAGE, "View every order and change order status"),
    (PAYMENTS_MANAGE, "View payments and change payment status"),
    (REVIEWS_MANAGE, "Delete any review"),
    (USERS_MANAGE, "Manage user accounts and their roles"),
    (ROLES_MANAGE, "Manage roles and permissions"),
    (ALL, "Every permission"),
];

pub const DEFAULT_ADMIN_PERMISSIONS: &[&str] = &[ALL];

pub const DEFAULT_STAFF_PERMISSIONS: &[&str] =
    &[PRODUCTS_MANAGE, CATEGORIES_MANAGE, ORDERS_MANAGE, PAYMENTS_MANAGE, REVIEWS_MANAGE];

pub const DEFAULT_CUSTOMER_PERMISSIONS: &[&str] = &[];

/// Built-in roles and their default grants.
pub fn default_roles() -> [(&'static str, &'static str, &'static [&'static str]); 3] {
    [
        (Role::ADMIN, "Full access", DEFAULT_ADMIN_PERMISSIONS),
        (Role::STAFF, "Catalog, order and payment operations", DEFAULT_STAFF_PERMISSIONS),
        (Role::CUSTOMER, "Registered shopper", DEFAULT_CUSTOMER_PERMISSIONS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::PermissionKey;

    #[test]
    fn test_catalogue_keys_are_valid() {
        for (key, _) in CATALOGUE {
            assert!(PermissionKey::parse(key).is_ok(), "{key}");
        }
    }

    #[test]
    fn test_default_grants_are_catalogued() {
        for (_, _, grants) in default_roles() {
            for key in grants {
                assert!(CATALOGUE.iter().any(|(k, _)| k == key), "{key}");
            }
        }
    }
}
