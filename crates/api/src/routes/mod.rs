pub mod auth;
pub mod health;
pub mod metrics;
pub mod movements;
pub mod products;
pub mod sales;
