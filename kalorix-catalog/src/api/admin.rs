//! Curation endpoints under `/admin/api`
//!
//! All routes sit behind the admin gate.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kalorix_common::{EanSet, NewProduct, Product, ProductChanges};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::merge::{self, AutoMergeReport, PairMergeOutcome};
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::store::ProductQuery;
use crate::AppState;

pub const AUTO_MERGE_MESSAGE: &str = "Automatické sjednocení dokončeno";

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub q: Option<String>,
    /// Kept as text so a garbage page number falls back to page 1
    #[serde(default)]
    pub page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub query: String,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_results: usize,
    pub products: Vec<Product>,
}

/// GET /admin/api/products?q=&page=
///
/// Visible products in name order, 20 per page.
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ProductPage>> {
    let term = query.q.unwrap_or_default();
    let requested_page = query
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<i64>().ok())
        .unwrap_or(1);

    let products = state
        .store
        .select(&ProductQuery::visible().with_name_containing(term.clone()))
        .await?;
    let pagination = calculate_pagination(products.len(), requested_page);

    Ok(Json(ProductPage {
        query: term,
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        total_results: products.len(),
        products: pagination.slice(&products).to_vec(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddProductRequest {
    pub name: String,
    pub brand: Option<String>,
    pub kcal: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub image_url: Option<String>,
    pub ean: EanSet,
}

/// POST /admin/api/products
///
/// An empty name is ignored with 204.
pub async fn add_product(
    State(state): State<AppState>,
    Json(request): Json<AddProductRequest>,
) -> ApiResult<Response> {
    let name = request.name.trim();
    if name.is_empty() {
        debug!("Add product ignored: empty name");
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let product = state
        .store
        .insert(&NewProduct {
            name: name.to_string(),
            brand: request.brand,
            kcal: request.kcal,
            protein: request.protein,
            carbs: request.carbs,
            fat: request.fat,
            image_url: request.image_url,
            ean: request.ean,
            hidden: false,
            source_code: None,
        })
        .await?;

    info!(product_id = product.id, name = %product.name, "Product added");
    Ok((StatusCode::CREATED, Json(product)).into_response())
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("product {}", id))
}

/// PUT /admin/api/products/:id
///
/// Absent fields are kept; a nutrition value sent as `null` is cleared.
pub async fn edit_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<ProductChanges>,
) -> ApiResult<Json<Product>> {
    if !state.store.update(id, &changes).await? {
        return Err(not_found(id));
    }

    let product = state.store.find(id).await?.ok_or_else(|| not_found(id))?;
    info!(product_id = id, "Product edited");
    Ok(Json(product))
}

/// POST /admin/api/products/:id/hide
pub async fn hide_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.store.update(id, &ProductChanges::hide()).await? {
        return Err(not_found(id));
    }

    info!(product_id = id, "Product hidden");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(default)]
    pub target_id: Option<i64>,
}

/// POST /admin/api/merge
///
/// Returns the merged target. Requests with a missing body, missing ids,
/// equal ids or unknown products are ignored with 204.
pub async fn merge_products(
    State(state): State<AppState>,
    request: Option<Json<MergeRequest>>,
) -> ApiResult<Response> {
    let Some(Json(MergeRequest {
        source_id: Some(source_id),
        target_id: Some(target_id),
    })) = request
    else {
        debug!("Merge ignored: malformed request");
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    match merge::merge_pair(state.store.as_ref(), source_id, target_id).await? {
        PairMergeOutcome::Merged(product) => Ok(Json(product).into_response()),
        PairMergeOutcome::Skipped(_) => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[derive(Debug, Serialize)]
pub struct AutoMergeResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub report: AutoMergeReport,
}

/// POST /admin/api/auto-merge
pub async fn auto_merge_products(
    State(state): State<AppState>,
) -> ApiResult<Json<AutoMergeResponse>> {
    let report = merge::auto_merge(state.store.as_ref()).await?;
    Ok(Json(AutoMergeResponse {
        message: AUTO_MERGE_MESSAGE,
        report,
    }))
}
