//! Catalog store adapter
//!
//! [`CatalogStore`] is the persistence seam used by ingestion, curation and
//! the merge engine. Every call is its own unit of work; only batch insert
//! and batch delete touch several rows atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kalorix_common::{EanSet, NewProduct, Product, ProductChanges, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

/// Row ordering for [`ProductQuery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending id (creation order)
    Id,
    /// Ascending name, then id
    Name,
}

/// Filtered select over the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    pub include_hidden: bool,
    /// Case-insensitive substring match on `name`
    pub name_contains: Option<String>,
    pub order: SortOrder,
}

impl ProductQuery {
    /// Entire catalog including hidden products, in id order
    pub fn all() -> Self {
        Self {
            include_hidden: true,
            name_contains: None,
            order: SortOrder::Id,
        }
    }

    /// Visible products in name order
    pub fn visible() -> Self {
        Self {
            include_hidden: false,
            name_contains: None,
            order: SortOrder::Name,
        }
    }

    pub fn with_name_containing(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.name_contains = if term.trim().is_empty() {
            None
        } else {
            Some(term)
        };
        self
    }
}

/// Persistent store of products
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn select(&self, query: &ProductQuery) -> Result<Vec<Product>>;

    async fn find(&self, id: i64) -> Result<Option<Product>>;

    /// First product (lowest id) whose `ean` set contains `code`
    async fn find_by_ean(&self, code: &str) -> Result<Option<Product>>;

    async fn insert(&self, product: &NewProduct) -> Result<Product>;

    /// Insert all products in one transaction, returning the inserted rows
    async fn insert_many(&self, products: &[NewProduct]) -> Result<Vec<Product>>;

    /// Apply a partial update; `Ok(false)` if no product has that id
    async fn update(&self, id: i64, changes: &ProductChanges) -> Result<bool>;

    /// Delete one product; `Ok(false)` if no product has that id
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Delete every listed product in one statement, returning rows removed
    async fn delete_many(&self, ids: &[i64]) -> Result<u64>;
}

/// Raw `products` row
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    brand: Option<String>,
    kcal: Option<f64>,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
    image_url: Option<String>,
    ean: String,
    hidden: bool,
    source_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = kalorix_common::Error;

    fn try_from(row: ProductRow) -> Result<Self> {
        Ok(Product {
            id: row.id,
            name: row.name,
            brand: row.brand,
            kcal: row.kcal,
            protein: row.protein,
            carbs: row.carbs,
            fat: row.fat,
            image_url: row.image_url,
            ean: EanSet::from_json(&row.ean)?,
            hidden: row.hidden,
            source_code: row.source_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>> {
    rows.into_iter().map(Product::try_from).collect()
}

const INSERT_SQL: &str = r#"
    INSERT INTO products (name, brand, kcal, protein, carbs, fat, image_url, ean, hidden, source_code)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    RETURNING *
"#;

/// SQLite-backed catalog store
#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn select(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let mut sql = String::from("SELECT * FROM products");
        if !query.include_hidden {
            sql.push_str(" WHERE hidden = 0");
        }
        match query.order {
            SortOrder::Id => sql.push_str(" ORDER BY id ASC"),
            SortOrder::Name => sql.push_str(" ORDER BY name ASC, id ASC"),
        }

        let rows: Vec<ProductRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        let mut products = into_products(rows)?;

        // SQLite LIKE only folds ASCII; names carry Czech diacritics
        if let Some(term) = &query.name_contains {
            let needle = term.to_lowercase();
            products.retain(|p| p.name.to_lowercase().contains(&needle));
        }

        Ok(products)
    }

    async fn find(&self, id: i64) -> Result<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Product::try_from).transpose()
    }

    async fn find_by_ean(&self, code: &str) -> Result<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT * FROM products
            WHERE EXISTS (SELECT 1 FROM json_each(products.ean) WHERE json_each.value = ?)
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    async fn insert(&self, product: &NewProduct) -> Result<Product> {
        let row: ProductRow = sqlx::query_as(INSERT_SQL)
            .bind(&product.name)
            .bind(&product.brand)
            .bind(product.kcal)
            .bind(product.protein)
            .bind(product.carbs)
            .bind(product.fat)
            .bind(&product.image_url)
            .bind(product.ean.to_json()?)
            .bind(product.hidden)
            .bind(&product.source_code)
            .fetch_one(&self.pool)
            .await?;

        debug!(product_id = row.id, name = %row.name, "Inserted product");
        row.try_into()
    }

    async fn insert_many(&self, products: &[NewProduct]) -> Result<Vec<Product>> {
        let mut tx = self.pool.begin().await?;
        let mut rows = Vec::with_capacity(products.len());

        for product in products {
            let row: ProductRow = sqlx::query_as(INSERT_SQL)
                .bind(&product.name)
                .bind(&product.brand)
                .bind(product.kcal)
                .bind(product.protein)
                .bind(product.carbs)
                .bind(product.fat)
                .bind(&product.image_url)
                .bind(product.ean.to_json()?)
                .bind(product.hidden)
                .bind(&product.source_code)
                .fetch_one(&mut *tx)
                .await?;
            rows.push(row);
        }

        tx.commit().await?;
        debug!(count = rows.len(), "Inserted product batch");
        into_products(rows)
    }

    async fn update(&self, id: i64, changes: &ProductChanges) -> Result<bool> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE products SET updated_at = CURRENT_TIMESTAMP");

        if let Some(name) = &changes.name {
            builder.push(", name = ").push_bind(name.clone());
        }
        if let Some(brand) = &changes.brand {
            builder.push(", brand = ").push_bind(brand.clone());
        }
        if let Some(kcal) = changes.kcal {
            builder.push(", kcal = ").push_bind(kcal);
        }
        if let Some(protein) = changes.protein {
            builder.push(", protein = ").push_bind(protein);
        }
        if let Some(carbs) = changes.carbs {
            builder.push(", carbs = ").push_bind(carbs);
        }
        if let Some(fat) = changes.fat {
            builder.push(", fat = ").push_bind(fat);
        }
        if let Some(image_url) = &changes.image_url {
            builder.push(", image_url = ").push_bind(image_url.clone());
        }
        if let Some(ean) = &changes.ean {
            builder.push(", ean = ").push_bind(ean.to_json()?);
        }
        if let Some(hidden) = changes.hidden {
            builder.push(", hidden = ").push_bind(hidden);
        }

        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM products WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
