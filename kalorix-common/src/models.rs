//! Catalog data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::EanSet;

/// Catalog product record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    /// Display name, also the automatic merge grouping key
    pub name: String,
    pub brand: Option<String>,
    pub kcal: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub ean: EanSet,
    #[serde(default)]
    pub hidden: bool,
    pub source_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-100g nutrition values of a product
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub kcal: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
}

impl Nutrition {
    pub fn values(&self) -> [Option<f64>; 4] {
        [self.kcal, self.protein, self.carbs, self.fat]
    }

    /// Number of filled values (present, finite and non-zero)
    pub fn filled_count(&self) -> usize {
        self.values().into_iter().filter(|v| is_filled(*v)).count()
    }
}

/// A nutrition value counts as filled when it is present, finite and non-zero
pub fn is_filled(value: Option<f64>) -> bool {
    matches!(value, Some(v) if v.is_finite() && v != 0.0)
}

impl Product {
    pub fn nutrition(&self) -> Nutrition {
        Nutrition {
            kcal: self.kcal,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
        }
    }
}

/// Fields for a product about to be inserted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub kcal: Option<f64>,
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default)]
    pub carbs: Option<f64>,
    #[serde(default)]
    pub fat: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub ean: EanSet,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub source_code: Option<String>,
}

/// Partial update of a product
///
/// `None` leaves a column untouched. For nullable columns `Some(None)`
/// writes NULL.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProductChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub brand: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub kcal: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub protein: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub carbs: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub fat: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub image_url: Option<Option<String>>,
    #[serde(skip)]
    pub ean: Option<EanSet>,
    #[serde(skip)]
    pub hidden: Option<bool>,
}

/// Distinguishes an explicit `null` from a missing field
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ProductChanges {
    /// Changes that overwrite every mutable column with `product`'s values
    ///
    /// `id`, timestamps and `source_code` are left out.
    pub fn replace_with(product: &Product) -> Self {
        Self {
            name: Some(product.name.clone()),
            brand: Some(product.brand.clone()),
            kcal: Some(product.kcal),
            protein: Some(product.protein),
            carbs: Some(product.carbs),
            fat: Some(product.fat),
            image_url: Some(product.image_url.clone()),
            ean: Some(product.ean.clone()),
            hidden: Some(product.hidden),
        }
    }

    pub fn hide() -> Self {
        Self {
            hidden: Some(true),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the changes to an in-memory copy of a product
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(brand) = &self.brand {
            product.brand = brand.clone();
        }
        if let Some(kcal) = self.kcal {
            product.kcal = kcal;
        }
        if let Some(protein) = self.protein {
            product.protein = protein;
        }
        if let Some(carbs) = self.carbs {
            product.carbs = carbs;
        }
        if let Some(fat) = self.fat {
            product.fat = fat;
        }
        if let Some(image_url) = &self.image_url {
            product.image_url = image_url.clone();
        }
        if let Some(ean) = &self.ean {
            product.ean = ean.clone();
        }
        if let Some(hidden) = self.hidden {
            product.hidden = hidden;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_treats_zero_and_missing_as_empty() {
        assert!(is_filled(Some(9.0)));
        assert!(!is_filled(Some(0.0)));
        assert!(!is_filled(None));
        assert!(!is_filled(Some(f64::NAN)));

        let nutrition = Nutrition {
            kcal: Some(250.0),
            protein: Some(0.0),
            carbs: None,
            fat: Some(1.5),
        };
        assert_eq!(nutrition.filled_count(), 2);
    }

    #[test]
    fn test_changes_distinguish_null_from_missing() {
        let changes: ProductChanges =
            serde_json::from_str(r#"{"name": "Rohlík", "kcal": null, "fat": 2.5}"#).unwrap();

        assert_eq!(changes.name.as_deref(), Some("Rohlík"));
        assert_eq!(changes.kcal, Some(None));
        assert_eq!(changes.fat, Some(Some(2.5)));
        assert_eq!(changes.protein, None);
        assert_eq!(changes.brand, None);
    }

    #[test]
    fn test_empty_changes() {
        assert!(ProductChanges::default().is_empty());
        assert!(!ProductChanges::hide().is_empty());
    }
}
