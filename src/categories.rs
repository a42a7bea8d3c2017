//! Category source
//!
//! The category map is a JSON object of `{"display name": "category id"}`,
//! read fresh at the start of every run. A missing or malformed file falls
//! back to the built-in catalog sections.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Catalog sections harvested when no category file is present
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Fruits", "6000213114"),
    ("Vegetables", "6000213167"),
    ("Rice_Grains_Nuts", "6000215152"),
    ("Meat_Eggs", "6000215194"),
    ("Seafood_DriedSeafood", "6000213469"),
    ("Milk_Dairy", "6000213534"),
    ("MealKits_ConvenienceFood", "6000213247"),
    ("Kimchi_SideDishes_Deli", "6000213299"),
    ("Water_Beverages_Alcohol", "6000213424"),
    ("Coffee_Beans_Tea", "6000215245"),
    ("Noodles_CannedGoods", "6000213319"),
    ("Seasoning_Oil", "6000215286"),
    ("Snacks_Treats", "6000213362"),
    ("Bakery_Jam", "6000213412"),
];

/// One catalog section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    /// Display name; also the artifact file stem
    pub name: String,
    /// The catalog's `dispCtgId`
    pub id: String,
}

impl Category {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// Read-only provider of the categories to walk, in walk order
pub trait CategorySource: Send + Sync {
    fn load(&self) -> Vec<Category>;
}

pub fn default_categories() -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, id)| Category::new(*name, *id))
        .collect()
}

/// A category map stored as a JSON file
#[derive(Debug, Clone)]
pub struct JsonCategoryFile {
    path: PathBuf,
}

impl JsonCategoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CategorySource for JsonCategoryFile {
    fn load(&self) -> Vec<Category> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(
                    "Category file {} unreadable ({}), using defaults",
                    self.path.display(),
                    e
                );
                return default_categories();
            }
        };

        match parse_category_map(&content) {
            Some(categories) => {
                tracing::info!(
                    "Loaded {} categories from {}",
                    categories.len(),
                    self.path.display()
                );
                categories
            }
            None => {
                tracing::warn!(
                    "Category file {} is not a JSON object, using defaults",
                    self.path.display()
                );
                default_categories()
            }
        }
    }
}

/// A fixed category list
#[derive(Debug, Clone, Default)]
pub struct StaticCategories(pub Vec<Category>);

impl CategorySource for StaticCategories {
    fn load(&self) -> Vec<Category> {
        self.0.clone()
    }
}

/// Parses `{"name": "id"}`, keeping file order; numeric ids are accepted
fn parse_category_map(content: &str) -> Option<Vec<Category>> {
    let value: Value = serde_json::from_str(content).ok()?;
    let map = value.as_object()?;
    Some(
        map.iter()
            .filter_map(|(name, id)| {
                let id = match id {
                    Value::String(s) => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                (!id.is_empty()).then(|| Category::new(name.as_str(), id))
            })
            .collect(),
    )
}
