//! Role names stored on users and carried in access tokens.

pub const ADMIN: &str = "Admin";
pub const SELLER: &str = "Vendedor";

/// Roles allowed to record and read sales.
pub const SALES: &[&str] = &[ADMIN, SELLER];

/// Roles allowed to touch stock or the catalog directly.
pub const INVENTORY: &[&str] = &[ADMIN];
