//! External catalog source (Open Food Facts)
//!
//! Read-only product search over the Open Food Facts `cgi/search.pl`
//! endpoint. Records come back keyed by product code (EAN) with a loosely
//! typed `nutriments` map.
//!
//! # API Reference
//! - Endpoint: https://world.openfoodfacts.org/cgi/search.pl
//! - Documentation: https://openfoodfacts.github.io/openfoodfacts-server/api/

use async_trait::async_trait;
use kalorix_common::config::SourceConfig;
use reqwest::{header, Client};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// User-Agent header (Open Food Facts asks clients to identify themselves)
const USER_AGENT: &str = concat!("Kalorix/", env!("CARGO_PKG_VERSION"), " (kalorix.cz)");

/// Nutriment keys (per 100 g)
pub const KCAL_KEY: &str = "energy-kcal_100g";
pub const PROTEIN_KEY: &str = "proteins_100g";
pub const CARBS_KEY: &str = "carbohydrates_100g";
pub const FAT_KEY: &str = "fat_100g";

/// Country tag of products sold in Czechia
pub const CZECH_COUNTRY_TAG: &str = "en:czech-republic";

/// External source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Catalog source returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse catalog response: {0}")]
    Parse(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// One search call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Free-text term; `None` lists products without a term filter
    pub term: Option<String>,
    pub page_size: u32,
}

/// Raw product record as returned by the source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProduct {
    #[serde(default, deserialize_with = "string_or_number")]
    pub code: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub brands: Option<String>,
    #[serde(default)]
    pub image_front_small_url: Option<String>,
    #[serde(default)]
    pub countries_tags: Option<Vec<String>>,
    #[serde(default)]
    pub nutriments: Option<Map<String, Value>>,
}

impl RawProduct {
    pub fn nutriment(&self, key: &str) -> Option<&Value> {
        self.nutriments
            .as_ref()
            .and_then(|n| n.get(key))
            .filter(|v| !v.is_null())
    }

    /// Nutriment as a number; numeric strings are accepted
    pub fn nutriment_f64(&self, key: &str) -> Option<f64> {
        let value = match self.nutriment(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }

    /// Product code, if present and non-blank
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    pub fn is_sold_in_czechia(&self) -> bool {
        self.countries_tags
            .as_ref()
            .is_some_and(|tags| tags.iter().any(|t| t == CZECH_COUNTRY_TAG))
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Search response envelope
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Option<Vec<RawProduct>>,
}

/// Parse a search response body
pub fn parse_search_response(body: &str) -> Result<Vec<RawProduct>, SourceError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;
    Ok(response.products.unwrap_or_default())
}

/// Read-only product search
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RawProduct>, SourceError>;
}

/// Open Food Facts HTTP client
pub struct OpenFoodFactsClient {
    http_client: Client,
    base_url: String,
    country: String,
    language: String,
}

impl OpenFoodFactsClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            country: config.country.clone(),
            language: config.language.clone(),
        })
    }

    fn query_params(&self, request: &SearchRequest) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(7);
        if let Some(term) = &request.term {
            params.push(("search_terms", term.clone()));
        }
        params.push(("search_simple", "1".to_string()));
        params.push(("action", "process".to_string()));
        params.push(("json", "1".to_string()));
        params.push(("page_size", request.page_size.to_string()));
        params.push(("country", self.country.clone()));
        params.push(("lc", self.language.clone()));
        params
    }
}

#[async_trait]
impl CatalogSource for OpenFoodFactsClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RawProduct>, SourceError> {
        debug!(term = ?request.term, page_size = request.page_size, "Querying Open Food Facts");

        let url = format!("{}/cgi/search.pl", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&self.query_params(request))
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        let products = parse_search_response(&body)?;

        debug!(count = products.len(), "Open Food Facts search complete");
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "count": 2,
        "products": [
            {
                "code": "8594001021499",
                "product_name": "Banán",
                "brands": "Chiquita",
                "image_front_small_url": "https://images.example/banan.jpg",
                "countries_tags": ["en:czech-republic", "en:slovakia"],
                "nutriments": {
                    "energy-kcal_100g": 89,
                    "proteins_100g": "1,1",
                    "carbohydrates_100g": 22.8,
                    "fat_100g": null
                }
            },
            {
                "code": 4011,
                "product_name": null
            }
        ]
    }"#;

    #[test]
    fn test_parse_search_response() {
        let products = parse_search_response(SAMPLE).unwrap();
        assert_eq!(products.len(), 2);

        let banana = &products[0];
        assert_eq!(banana.code(), Some("8594001021499"));
        assert_eq!(banana.product_name.as_deref(), Some("Banán"));
        assert_eq!(banana.nutriment_f64(KCAL_KEY), Some(89.0));
        assert_eq!(banana.nutriment_f64(PROTEIN_KEY), Some(1.1));
        assert_eq!(banana.nutriment_f64(CARBS_KEY), Some(22.8));
        assert_eq!(banana.nutriment_f64(FAT_KEY), None);
        assert!(banana.is_sold_in_czechia());

        let bare = &products[1];
        assert_eq!(bare.code(), Some("4011"));
        assert_eq!(bare.product_name, None);
        assert_eq!(bare.nutriment(KCAL_KEY), None);
        assert!(!bare.is_sold_in_czechia());
    }

    #[test]
    fn test_missing_products_array_is_empty() {
        assert!(parse_search_response(r#"{"count": 0}"#).unwrap().is_empty());
        assert!(parse_search_response(r#"{"products": null}"#).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        let err = parse_search_response("<html>").unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_blank_code_is_absent() {
        let raw = RawProduct {
            code: Some("  ".to_string()),
            ..RawProduct::default()
        };
        assert_eq!(raw.code(), None);
    }

    #[test]
    fn test_query_params() {
        let client = OpenFoodFactsClient::new(&SourceConfig::default()).unwrap();

        let params = client.query_params(&SearchRequest {
            term: Some("jogurt".to_string()),
            page_size: 50,
        });
        assert_eq!(params[0], ("search_terms", "jogurt".to_string()));
        assert!(params.contains(&("page_size", "50".to_string())));
        assert!(params.contains(&("country", "czech-republic".to_string())));
        assert!(params.contains(&("lc", "cs".to_string())));

        let params = client.query_params(&SearchRequest {
            term: None,
            page_size: 200,
        });
        assert!(params.iter().all(|(k, _)| *k != "search_terms"));
    }
}
