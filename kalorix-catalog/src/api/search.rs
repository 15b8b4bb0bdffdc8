//! Public search and bulk import endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::error::ApiResult;
use crate::ingest::{self, IngestReport};
use crate::source::{RawProduct, CARBS_KEY, FAT_KEY, KCAL_KEY, PROTEIN_KEY};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

/// Search result row for display
#[derive(Debug, Serialize)]
pub struct FoodCard {
    pub code: Option<String>,
    pub name: String,
    pub brand: String,
    pub image_url: String,
    pub kcal: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
}

impl From<&RawProduct> for FoodCard {
    fn from(raw: &RawProduct) -> Self {
        Self {
            code: raw.code().map(str::to_string),
            name: raw.product_name.clone().unwrap_or_default(),
            brand: raw.brands.clone().unwrap_or_default(),
            image_url: raw.image_front_small_url.clone().unwrap_or_default(),
            kcal: raw.nutriment_f64(KCAL_KEY),
            protein: raw.nutriment_f64(PROTEIN_KEY),
            carbs: raw.nutriment_f64(CARBS_KEY),
            fat: raw.nutriment_f64(FAT_KEY),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub term: String,
    pub products: Vec<FoodCard>,
    pub fetched: usize,
    pub unique: usize,
    pub inserted: usize,
    pub already_known: usize,
    pub without_code: usize,
}

impl From<IngestReport> for SearchResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            unique: report.products.len(),
            products: report.products.iter().map(FoodCard::from).collect(),
            term: report.term,
            fetched: report.fetched,
            inserted: report.inserted,
            already_known: report.already_known,
            without_code: report.without_code,
        }
    }
}

/// GET /api/search?q=TERM
///
/// Queries the external source and caches unknown products. A missing or
/// blank term searches the default term.
pub async fn search_foods(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let report = ingest::ingest_search(
        state.source.as_ref(),
        state.store.as_ref(),
        &state.ingest,
        query.q.as_deref(),
    )
    .await?;

    Ok(Json(report.into()))
}

/// POST /api/import-cz-products
pub async fn import_cz_products(State(state): State<AppState>) -> Response {
    match ingest::import_czech_products(
        state.source.as_ref(),
        state.store.as_ref(),
        state.ingest.import_page_size,
    )
    .await
    {
        Ok(inserted) => Json(json!({
            "message": "Import hotov",
            "count": inserted.len(),
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Czech product import failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Nepodařilo se importovat data." })),
            )
                .into_response()
        }
    }
}

/// Any other method on the import route
pub async fn import_method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Použij POST" })),
    )
        .into_response()
}
