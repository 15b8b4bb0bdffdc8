//! # Kalorix Common Library
//!
//! Shared code for the Kalorix catalog service:
//! - Error and result types
//! - Bootstrap configuration loading
//! - Database initialization
//! - Product model and EAN set

pub mod config;
pub mod db;
pub mod ean;
pub mod error;
pub mod models;

pub use ean::EanSet;
pub use error::{Error, Result};
pub use models::{NewProduct, Nutrition, Product, ProductChanges};
