//! Test doubles shared by unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use kalorix_common::db::init_memory_database;
use kalorix_common::{NewProduct, Product, ProductChanges, Result};

use crate::source::{CatalogSource, RawProduct, SearchRequest, SourceError};
use crate::store::{CatalogStore, ProductQuery, SqliteCatalogStore};

pub async fn memory_store() -> SqliteCatalogStore {
    SqliteCatalogStore::new(init_memory_database().await.unwrap())
}

/// In-memory store that fails selected operations on demand
pub struct FlakyStore {
    pub inner: SqliteCatalogStore,
    pub fail_select: AtomicBool,
    pub fail_find_by_ean: AtomicBool,
    pub fail_insert: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_delete_many: AtomicBool,
    /// Calls to `delete` and `delete_many`, failed or not
    pub delete_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: SqliteCatalogStore) -> Self {
        Self {
            inner,
            fail_select: AtomicBool::new(false),
            fail_find_by_ean: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_delete_many: AtomicBool::new(false),
            delete_calls: AtomicUsize::new(0),
        }
    }

    pub fn set(flag: &AtomicBool, failing: bool) {
        flag.store(failing, Ordering::SeqCst);
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn check(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(kalorix_common::Error::Internal(format!(
                "injected {} failure",
                operation
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn select(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        Self::check(&self.fail_select, "select")?;
        self.inner.select(query).await
    }

    async fn find(&self, id: i64) -> Result<Option<Product>> {
        self.inner.find(id).await
    }

    async fn find_by_ean(&self, code: &str) -> Result<Option<Product>> {
        Self::check(&self.fail_find_by_ean, "find_by_ean")?;
        self.inner.find_by_ean(code).await
    }

    async fn insert(&self, product: &NewProduct) -> Result<Product> {
        Self::check(&self.fail_insert, "insert")?;
        self.inner.insert(product).await
    }

    async fn insert_many(&self, products: &[NewProduct]) -> Result<Vec<Product>> {
        Self::check(&self.fail_insert, "insert_many")?;
        self.inner.insert_many(products).await
    }

    async fn update(&self, id: i64, changes: &ProductChanges) -> Result<bool> {
        Self::check(&self.fail_update, "update")?;
        self.inner.update(id, changes).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_delete, "delete")?;
        self.inner.delete(id).await
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<u64> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_delete_many, "delete_many")?;
        self.inner.delete_many(ids).await
    }
}

/// Source returning the same batch for every request
pub struct StaticSource(pub Vec<RawProduct>);

impl StaticSource {
    pub fn from_json(products: serde_json::Value) -> Self {
        Self(serde_json::from_value(products).unwrap())
    }
}

#[async_trait]
impl CatalogSource for StaticSource {
    async fn search(
        &self,
        _request: &SearchRequest,
    ) -> std::result::Result<Vec<RawProduct>, SourceError> {
        Ok(self.0.clone())
    }
}
