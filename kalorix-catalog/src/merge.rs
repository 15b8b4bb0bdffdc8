//! Product merge engine
//!
//! Consolidates duplicate catalog records.
//!
//! # Pairwise merge
//! An admin names a source and a target. The target keeps every field it
//! has a value for and borrows the rest from the source; the EAN sets are
//! unioned. The target is updated, then the source is deleted.
//!
//! # Automatic merge
//! The whole catalog (hidden products included) is grouped by exact name.
//! Within each group the member with the most filled nutrition values wins,
//! ties going to the richest EAN set and then to catalog order. The winner
//! absorbs every code of the group, is made visible, and the rest of the
//! group is deleted in one call.
//!
//! Store calls are issued one at a time. Neither operation is atomic: a
//! failure part-way is reported to the caller together with what had
//! already been written.

use std::collections::HashMap;

use kalorix_common::models::is_filled;
use kalorix_common::{EanSet, Product, ProductChanges};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::store::{CatalogStore, ProductQuery};

#[derive(Debug, Error)]
pub enum MergeError {
    /// Store call failed before anything was written (or the write itself
    /// failed and left the catalog unchanged)
    #[error("Catalog store failed: {0}")]
    Store(#[from] kalorix_common::Error),

    /// Target was updated but the source could not be deleted
    #[error(
        "Merged product {target_id} but failed to delete source {source_id} (target restored: {rolled_back}): {cause}"
    )]
    SourceNotDeleted {
        source_id: i64,
        target_id: i64,
        /// Whether the target's previous values were written back
        rolled_back: bool,
        #[source]
        cause: kalorix_common::Error,
    },

    /// Automatic merge stopped at a group; earlier groups stay merged
    #[error("Automatic merge failed on group {name:?} after {groups_completed} merged groups: {cause}")]
    GroupFailed {
        name: String,
        groups_completed: usize,
        #[source]
        cause: kalorix_common::Error,
    },
}

/// Why a pairwise merge request was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "id")]
pub enum SkipReason {
    SameProduct,
    SourceMissing(i64),
    TargetMissing(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PairMergeOutcome {
    /// Target's record after the merge
    Merged(Product),
    /// Malformed request; nothing was written
    Skipped(SkipReason),
}

fn first_non_empty(preferred: &Option<String>, fallback: &Option<String>) -> Option<String> {
    preferred
        .as_ref()
        .filter(|s| !s.is_empty())
        .or(fallback.as_ref())
        .cloned()
}

/// Prefer a filled value; a target's explicit zero survives an absent source
fn pick_nutrient(target: Option<f64>, source: Option<f64>) -> Option<f64> {
    if is_filled(target) {
        target
    } else if is_filled(source) {
        source
    } else {
        target.or(source)
    }
}

/// Field resolution for a pairwise merge
///
/// Returns the target with its empty fields filled from the source and the
/// union of both EAN sets. `id`, `hidden`, `source_code` and timestamps are
/// the target's.
pub fn merge_fields(source: &Product, target: &Product) -> Product {
    let name = if target.name.is_empty() {
        source.name.clone()
    } else {
        target.name.clone()
    };

    Product {
        name,
        brand: first_non_empty(&target.brand, &source.brand),
        kcal: pick_nutrient(target.kcal, source.kcal),
        protein: pick_nutrient(target.protein, source.protein),
        carbs: pick_nutrient(target.carbs, source.carbs),
        fat: pick_nutrient(target.fat, source.fat),
        image_url: first_non_empty(&target.image_url, &source.image_url),
        ean: target.ean.union(&source.ean),
        ..target.clone()
    }
}

/// Merge `source_id` into `target_id`
///
/// Equal ids or unknown products are a silent no-op. If the source cannot
/// be deleted after the target was updated, the target's previous values
/// are written back and the failure is returned.
pub async fn merge_pair(
    store: &dyn CatalogStore,
    source_id: i64,
    target_id: i64,
) -> Result<PairMergeOutcome, MergeError> {
    if source_id == target_id {
        debug!(source_id, target_id, "Merge skipped: same product");
        return Ok(PairMergeOutcome::Skipped(SkipReason::SameProduct));
    }

    let Some(source) = store.find(source_id).await? else {
        debug!(source_id, "Merge skipped: source not found");
        return Ok(PairMergeOutcome::Skipped(SkipReason::SourceMissing(source_id)));
    };
    let Some(target) = store.find(target_id).await? else {
        debug!(target_id, "Merge skipped: target not found");
        return Ok(PairMergeOutcome::Skipped(SkipReason::TargetMissing(target_id)));
    };

    let merged = merge_fields(&source, &target);

    if !store
        .update(target_id, &ProductChanges::replace_with(&merged))
        .await?
    {
        // Target vanished between lookup and update; the source is untouched
        return Err(MergeError::Store(kalorix_common::Error::NotFound(format!(
            "product {}",
            target_id
        ))));
    }

    match store.delete(source_id).await {
        Ok(deleted) => {
            if !deleted {
                warn!(source_id, "Merge source already gone at delete");
            }
        }
        Err(cause) => {
            let rolled_back = match store
                .update(target_id, &ProductChanges::replace_with(&target))
                .await
            {
                Ok(restored) => restored,
                Err(e) => {
                    error!(target_id, error = %e, "Failed to restore merge target");
                    false
                }
            };
            return Err(MergeError::SourceNotDeleted {
                source_id,
                target_id,
                rolled_back,
                cause,
            });
        }
    }

    info!(source_id, target_id, codes = merged.ean.len(), "Merged products");

    // Re-read for the store-assigned `updated_at`
    let stored = match store.find(target_id).await {
        Ok(Some(product)) => product,
        Ok(None) => merged,
        Err(e) => {
            warn!(target_id, error = %e, "Failed to re-read merge target");
            merged
        }
    };
    Ok(PairMergeOutcome::Merged(stored))
}

/// Summary of an automatic merge run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoMergeReport {
    pub groups_merged: usize,
    pub records_deleted: usize,
    /// Surviving product of each merged group, in processing order
    pub target_ids: Vec<i64>,
    /// Visible products after the run
    pub visible_products: usize,
}

/// Work for one name group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPlan {
    pub merged: Product,
    pub delete_ids: Vec<i64>,
}

/// Group products by exact name in order of first occurrence
///
/// Products with an empty name are never grouped.
pub fn group_by_name(products: Vec<Product>) -> Vec<Vec<Product>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<Product>> = Vec::new();

    for product in products {
        if product.name.is_empty() {
            continue;
        }
        match index.get(&product.name) {
            Some(&i) => groups[i].push(product),
            None => {
                index.insert(product.name.clone(), groups.len());
                groups.push(vec![product]);
            }
        }
    }

    groups
}

/// Order a group so the merge target comes first
///
/// More filled nutrition values first, then longer concatenated EAN set.
/// The sort is stable, so equal members keep their catalog order.
pub fn rank_group(group: &mut [Product]) {
    group.sort_by(|a, b| {
        let a_key = (a.nutrition().filled_count(), a.ean.concat_len());
        let b_key = (b.nutrition().filled_count(), b.ean.concat_len());
        b_key.cmp(&a_key)
    });
}

/// Build the merged record and the ids to delete for a group
pub fn plan_group(mut group: Vec<Product>) -> Option<GroupPlan> {
    if group.len() < 2 {
        return None;
    }
    rank_group(&mut group);

    let ean: EanSet = group
        .iter()
        .flat_map(|p| p.ean.iter().cloned())
        .collect();
    let delete_ids = group[1..].iter().map(|p| p.id).collect();

    let target = &group[0];
    let merged = Product {
        brand: Some(target.brand.clone().unwrap_or_default()),
        image_url: Some(target.image_url.clone().unwrap_or_default()),
        ean,
        hidden: false,
        ..target.clone()
    };

    Some(GroupPlan { merged, delete_ids })
}

async fn apply_group(store: &dyn CatalogStore, plan: &GroupPlan) -> kalorix_common::Result<()> {
    let target_id = plan.merged.id;
    if !store
        .update(target_id, &ProductChanges::replace_with(&plan.merged))
        .await?
    {
        return Err(kalorix_common::Error::NotFound(format!(
            "product {}",
            target_id
        )));
    }
    store.delete_many(&plan.delete_ids).await?;
    Ok(())
}

/// Merge every group of same-named products
///
/// Failure to read the catalog aborts before any write. A failing group
/// stops the run; groups merged before it stay merged.
pub async fn auto_merge(store: &dyn CatalogStore) -> Result<AutoMergeReport, MergeError> {
    let catalog = store.select(&ProductQuery::all()).await?;
    let catalog_size = catalog.len();
    let mut report = AutoMergeReport::default();

    for group in group_by_name(catalog) {
        let name = group[0].name.clone();
        let Some(plan) = plan_group(group) else {
            continue;
        };

        if let Err(cause) = apply_group(store, &plan).await {
            error!(group = %name, error = %cause, "Automatic merge failed");
            return Err(MergeError::GroupFailed {
                name,
                groups_completed: report.groups_merged,
                cause,
            });
        }

        debug!(
            group = %name,
            target_id = plan.merged.id,
            deleted = plan.delete_ids.len(),
            "Merged name group"
        );
        report.groups_merged += 1;
        report.records_deleted += plan.delete_ids.len();
        report.target_ids.push(plan.merged.id);
    }

    report.visible_products = store.select(&ProductQuery::visible()).await?.len();

    info!(
        catalog_size,
        groups_merged = report.groups_merged,
        records_deleted = report.records_deleted,
        "Automatic merge complete"
    );
    Ok(report)
}
