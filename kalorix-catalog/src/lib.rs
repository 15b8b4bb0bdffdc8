//! kalorix-catalog library - food nutrition catalog service
//!
//! Public search backed by Open Food Facts, bulk Czech import, and an admin
//! curation surface with duplicate merging.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod pagination;
pub mod source;
pub mod store;

#[cfg(test)]
mod testing;

use api::AdminCredentials;
use ingest::IngestSettings;
use source::CatalogSource;
use store::CatalogStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub source: Arc<dyn CatalogSource>,
    /// `None` rejects every admin request
    pub admin: Option<AdminCredentials>,
    pub ingest: IngestSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        source: Arc<dyn CatalogSource>,
        admin: Option<AdminCredentials>,
        ingest: IngestSettings,
    ) -> Self {
        Self {
            store,
            source,
            admin,
            ingest,
        }
    }
}

/// Build application router
///
/// The admin gate wraps the whole router and checks the path prefix
/// itself, so `/health` and `/api/*` stay public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let admin = Router::new()
        .route(
            "/admin/api/products",
            get(api::list_products).post(api::add_product),
        )
        .route("/admin/api/products/:id", axum::routing::put(api::edit_product))
        .route("/admin/api/products/:id/hide", post(api::hide_product))
        .route("/admin/api/merge", post(api::merge_products))
        .route("/admin/api/auto-merge", post(api::auto_merge_products));

    let public = Router::new()
        .route("/api/search", get(api::search_foods))
        .route(
            "/api/import-cz-products",
            post(api::import_cz_products).fallback(api::import_method_not_allowed),
        )
        .merge(api::health_routes());

    Router::new()
        .merge(admin)
        .merge(public)
        .layer(middleware::from_fn_with_state(state.clone(), api::admin_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
