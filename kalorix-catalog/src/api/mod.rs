//! HTTP API handlers for kalorix-catalog

pub mod admin;
pub mod auth;
pub mod health;
pub mod search;

pub use admin::{
    add_product, auto_merge_products, edit_product, hide_product, list_products, merge_products,
};
pub use auth::{admin_gate, AdminCredentials};
pub use health::health_routes;
pub use search::{import_cz_products, import_method_not_allowed, search_foods};
