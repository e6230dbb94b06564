use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Inactive,
}

/// Host catalog record produced for every marketplace listing.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub id: String,
    pub shop_id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub status: ItemStatus,
    pub batch_id: String,
    pub category: Category,
    pub delivery: Delivery,
    pub attributes: ItemAttributes,
    pub variants: Vec<Variant>,
    pub size_guide: Option<SizeGuide>,
    pub price: Price,
    pub source: Source,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub subcategory: Option<Subcategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcategory {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub fragile: bool,
    pub dimensions: Dimensions,
}

/// Package dimensions in grams and centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub weight: u32,
    pub length: u32,
    pub height: u32,
    pub width: u32,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttributes {
    pub condition: String,
    pub gender: Option<String>,
    pub composition: Option<String>,
    pub marketplace_attributes: Vec<MarketplaceAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceAttribute {
    pub id: String,
    pub name: String,
    pub value_id: String,
    pub value_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub color_id: String,
    pub color_name: String,
    pub color_hex: String,
    pub is_main: bool,
    pub images: Vec<String>,
    pub size_stock: Vec<SizeStock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeStock {
    pub size_label: String,
    pub stock: i64,
    pub sku: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeGuide {
    #[serde(rename = "type")]
    pub guide_type: String,
    pub body_part: String,
    pub has_measurements: bool,
    pub is_one_size: bool,
    pub measurement_source: String,
    pub external_size_grid_id: Option<String>,
    pub sizes: Vec<SizeRow>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeRow {
    pub size_equivalence: String,
    pub chest_circumference: Option<u32>,
    pub waist_circumference: Option<u32>,
    pub hip_circumference: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub shop_id: String,
    pub amount: f64,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: String,
    pub symbol: String,
    pub decimal_divider: String,
    pub thousands_divider: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source_type: String,
    pub external_id: String,
    pub external_sku: Option<String>,
    pub batch_id: String,
    pub imported_at: DateTime<Utc>,
    pub etl_version: String,
    pub transform_metadata: BTreeMap<String, String>,
}
