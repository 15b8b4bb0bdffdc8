//! Ingestion from the external catalog source
//!
//! Two entry points:
//! - [`ingest_search`]: interactive search. Fetches one page, drops records
//!   whose nutrition values repeat within the batch, and caches products
//!   whose code is not yet known.
//! - [`import_czech_products`]: bulk load of products sold in Czechia.
//!
//! Lookup-then-insert is not atomic. Two concurrent searches can store the
//! same code twice; the merge engine reconciles such duplicates.

use std::collections::HashSet;

use kalorix_common::config::SourceConfig;
use kalorix_common::{EanSet, NewProduct, Product};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::source::{
    CatalogSource, RawProduct, SearchRequest, SourceError, CARBS_KEY, FAT_KEY, KCAL_KEY,
    PROTEIN_KEY,
};
use crate::store::CatalogStore;

/// Placeholder for a missing nutriment in the batch dedup key
pub const MISSING_NUTRIMENT: &str = "N/A";

/// Name given to imported products without one
pub const UNKNOWN_PRODUCT_NAME: &str = "Neznámý produkt";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Catalog source failed: {0}")]
    Source(#[from] SourceError),

    #[error("Catalog store failed: {0}")]
    Store(#[from] kalorix_common::Error),
}

/// Source paging settings used by ingestion
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub default_term: String,
    pub search_page_size: u32,
    pub import_page_size: u32,
}

impl From<&SourceConfig> for IngestSettings {
    fn from(config: &SourceConfig) -> Self {
        Self {
            default_term: config.default_term.clone(),
            search_page_size: config.search_page_size,
            import_page_size: config.import_page_size,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from(&SourceConfig::default())
    }
}

/// Outcome of an interactive search
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub term: String,
    /// Batch after in-memory dedup, in source order
    pub products: Vec<RawProduct>,
    pub fetched: usize,
    pub inserted: usize,
    pub already_known: usize,
    pub without_code: usize,
}

/// Counts from caching a batch into the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub inserted: usize,
    pub already_known: usize,
    pub without_code: usize,
}

/// Batch dedup key: `kcal-protein-carbs-fat` with `N/A` for missing values
pub fn nutrition_key(raw: &RawProduct) -> String {
    [KCAL_KEY, PROTEIN_KEY, CARBS_KEY, FAT_KEY]
        .iter()
        .map(|key| key_part(raw.nutriment(key)))
        .collect::<Vec<_>>()
        .join("-")
}

fn key_part(value: Option<&Value>) -> String {
    match value {
        None => MISSING_NUTRIMENT.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            Some(f) => format!("{}", f),
            None => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

/// Keep the first record for each nutrition key
///
/// Deliberately crude: records with the same values, or with all values
/// unknown, are conflated regardless of their codes.
pub fn dedup_batch(raw: Vec<RawProduct>) -> Vec<RawProduct> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|product| seen.insert(nutrition_key(product)))
        .collect()
}

/// New product seeded from a searched record with a known code
fn searched_product(raw: &RawProduct, code: &str) -> NewProduct {
    NewProduct {
        name: raw.product_name.clone().unwrap_or_default(),
        brand: Some(raw.brands.clone().unwrap_or_default()),
        kcal: raw.nutriment_f64(KCAL_KEY),
        protein: raw.nutriment_f64(PROTEIN_KEY),
        carbs: raw.nutriment_f64(CARBS_KEY),
        fat: raw.nutriment_f64(FAT_KEY),
        image_url: Some(raw.image_front_small_url.clone().unwrap_or_default()),
        ean: EanSet::single(code),
        hidden: false,
        source_code: None,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

/// New product seeded from a bulk import record
fn imported_product(raw: &RawProduct) -> NewProduct {
    NewProduct {
        name: non_empty(&raw.product_name).unwrap_or_else(|| UNKNOWN_PRODUCT_NAME.to_string()),
        brand: Some(non_empty(&raw.brands).unwrap_or_default()),
        kcal: raw.nutriment_f64(KCAL_KEY),
        protein: raw.nutriment_f64(PROTEIN_KEY),
        carbs: raw.nutriment_f64(CARBS_KEY),
        fat: raw.nutriment_f64(FAT_KEY),
        image_url: Some(non_empty(&raw.image_front_small_url).unwrap_or_default()),
        ean: EanSet::new(),
        hidden: false,
        source_code: Some(non_empty(&raw.code).unwrap_or_default()),
    }
}

/// Cache products whose code is not yet in the store
///
/// Records without a code are skipped. Store failures abort the batch.
pub async fn store_new_products(
    store: &dyn CatalogStore,
    products: &[RawProduct],
) -> Result<StoreSummary, IngestError> {
    let mut summary = StoreSummary::default();

    for raw in products {
        let Some(code) = raw.code() else {
            summary.without_code += 1;
            continue;
        };

        if store.find_by_ean(code).await?.is_some() {
            summary.already_known += 1;
            continue;
        }

        let product = store.insert(&searched_product(raw, code)).await?;
        debug!(product_id = product.id, code = %code, "Cached product from source");
        summary.inserted += 1;
    }

    Ok(summary)
}

/// Search the source and cache new products
///
/// A blank term falls back to the configured default term.
pub async fn ingest_search(
    source: &dyn CatalogSource,
    store: &dyn CatalogStore,
    settings: &IngestSettings,
    term: Option<&str>,
) -> Result<IngestReport, IngestError> {
    let term = term
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(settings.default_term.as_str())
        .to_string();

    let raw = source
        .search(&SearchRequest {
            term: Some(term.clone()),
            page_size: settings.search_page_size,
        })
        .await?;
    let fetched = raw.len();

    let products = dedup_batch(raw);
    let summary = store_new_products(store, &products).await?;

    info!(
        term = %term,
        fetched,
        unique = products.len(),
        inserted = summary.inserted,
        already_known = summary.already_known,
        "Search ingested"
    );

    Ok(IngestReport {
        term,
        products,
        fetched,
        inserted: summary.inserted,
        already_known: summary.already_known,
        without_code: summary.without_code,
    })
}

/// Bulk import products sold in Czechia
///
/// All mapped records are inserted in one batch; the inserted rows are
/// returned.
pub async fn import_czech_products(
    source: &dyn CatalogSource,
    store: &dyn CatalogStore,
    limit: u32,
) -> Result<Vec<Product>, IngestError> {
    let raw = source
        .search(&SearchRequest {
            term: None,
            page_size: limit,
        })
        .await?;
    let fetched = raw.len();

    let products: Vec<NewProduct> = raw
        .iter()
        .filter(|p| p.is_sold_in_czechia())
        .map(imported_product)
        .collect();

    let inserted = store.insert_many(&products).await?;
    info!(fetched, inserted = inserted.len(), "Czech product import complete");

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProductQuery;
    use crate::testing::{memory_store, FlakyStore, StaticSource};
    use serde_json::json;

    fn raw(code: &str, nutriments: Value) -> RawProduct {
        serde_json::from_value(json!({
            "code": code,
            "product_name": format!("Produkt {}", code),
            "nutriments": nutriments,
        }))
        .unwrap()
    }

    #[test]
    fn test_nutrition_key_formats_values() {
        let product = raw(
            "1",
            json!({"energy-kcal_100g": 250, "proteins_100g": 9.5, "carbohydrates_100g": "48", "fat_100g": 3.0}),
        );
        assert_eq!(nutrition_key(&product), "250-9.5-48-3");
    }

    #[test]
    fn test_nutrition_key_marks_missing() {
        let product = raw("1", json!({"energy-kcal_100g": null, "fat_100g": 0}));
        assert_eq!(nutrition_key(&product), "N/A-N/A-N/A-0");

        let bare = RawProduct::default();
        assert_eq!(nutrition_key(&bare), "N/A-N/A-N/A-N/A");
    }

    #[test]
    fn test_dedup_keeps_first_of_unknown_records() {
        let batch = vec![
            raw("111", json!({})),
            raw("222", json!({})),
            raw("333", json!({"energy-kcal_100g": 89})),
        ];

        let unique = dedup_batch(batch);
        let codes: Vec<_> = unique.iter().filter_map(|p| p.code()).collect();
        assert_eq!(codes, vec!["111", "333"]);
    }

    #[test]
    fn test_searched_product_defaults() {
        let product = searched_product(&RawProduct::default(), "999");
        assert_eq!(product.name, "");
        assert_eq!(product.brand.as_deref(), Some(""));
        assert_eq!(product.image_url.as_deref(), Some(""));
        assert_eq!(product.kcal, None);
        assert_eq!(product.ean.as_slice(), &["999"]);
        assert!(!product.hidden);
    }

    #[test]
    fn test_imported_product_defaults() {
        let raw: RawProduct = serde_json::from_value(json!({
            "product_name": "",
            "countries_tags": ["en:czech-republic"],
            "nutriments": {"fat_100g": 12}
        }))
        .unwrap();

        let product = imported_product(&raw);
        assert_eq!(product.name, UNKNOWN_PRODUCT_NAME);
        assert_eq!(product.source_code.as_deref(), Some(""));
        assert_eq!(product.fat, Some(12.0));
        assert!(product.ean.is_empty());
    }

    fn two_products() -> StaticSource {
        StaticSource::from_json(json!([
            {"code": "111", "product_name": "Kefír", "countries_tags": ["en:czech-republic"],
             "nutriments": {"energy-kcal_100g": 60}},
            {"code": "222", "product_name": "Podmáslí", "countries_tags": ["en:czech-republic"],
             "nutriments": {"energy-kcal_100g": 40}}
        ]))
    }

    #[tokio::test]
    async fn test_ingest_search_propagates_insert_failure() {
        let store = FlakyStore::new(memory_store().await);
        FlakyStore::set(&store.fail_insert, true);

        let err = ingest_search(&two_products(), &store, &IngestSettings::default(), Some("kefír"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
        assert!(store.inner.select(&ProductQuery::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_search_propagates_lookup_failure() {
        let store = FlakyStore::new(memory_store().await);
        FlakyStore::set(&store.fail_find_by_ean, true);

        let err = ingest_search(&two_products(), &store, &IngestSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
    }

    #[tokio::test]
    async fn test_import_propagates_batch_insert_failure() {
        let store = FlakyStore::new(memory_store().await);
        FlakyStore::set(&store.fail_insert, true);

        let err = import_czech_products(&two_products(), &store, 200)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
        assert!(store.inner.select(&ProductQuery::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_search_stores_unknown_codes() {
        let store = memory_store().await;

        let report = ingest_search(&two_products(), &store, &IngestSettings::default(), None)
            .await
            .unwrap();
        assert_eq!(report.term, "banán");
        assert_eq!(report.inserted, 2);
        assert_eq!(store.find_by_ean("222").await.unwrap().unwrap().name, "Podmáslí");
    }
}
