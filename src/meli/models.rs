//! Wire shapes of the marketplace catalog read API.
//!
//! Listings are loosely typed upstream: lists show up as `null`, value ids
//! come and go, and size-chart measurements may be numbers, strings or
//! structs. Everything here deserializes leniently; the transformer resolves
//! what is left explicitly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DefaultOnNull, serde_as};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Paging {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

/// One page of the "list seller items" endpoint.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ItemSearchPage {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub results: Vec<String>,
    #[serde(default)]
    pub paging: Paging,
}

/// Per-item wrapper of the batched multi-get response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemEnvelope {
    pub code: u16,
    #[serde(default)]
    pub body: Value,
}

impl ItemEnvelope {
    pub fn is_ok(&self) -> bool {
        self.code == 200
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct MeliItem {
    pub id: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub category_id: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub domain_id: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub currency_id: String,
    #[serde(default)]
    pub available_quantity: Option<i64>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub condition: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub status: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub pictures: Vec<MeliPicture>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub attributes: Vec<MeliAttribute>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub sale_terms: Vec<SaleTerm>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub variations: Vec<MeliVariation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeliPicture {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secure_url: Option<String>,
}

impl MeliPicture {
    pub fn best_url(&self) -> Option<&str> {
        self.secure_url
            .as_deref()
            .or(self.url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct MeliAttribute {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value_id: Option<String>,
    #[serde(default)]
    pub value_name: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub values: Vec<MeliAttributeValue>,
}

impl MeliAttribute {
    /// `value_name`, falling back to the first entry of `values`.
    pub fn resolved_value(&self) -> Option<&str> {
        self.value_name
            .as_deref()
            .filter(|v| !v.is_empty())
            .or_else(|| {
                self.values
                    .first()
                    .and_then(|value| value.name.as_deref())
                    .filter(|v| !v.is_empty())
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeliAttributeValue {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "struct", default)]
    pub measure: Option<RawMeasure>,
}

/// Sale terms arrive with arbitrary JSON for every field; only string ids and
/// names are usable.
#[derive(Debug, Clone, Deserialize)]
pub struct SaleTerm {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub name: Value,
    #[serde(default)]
    pub value_id: Value,
    #[serde(default)]
    pub value_name: Value,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct MeliVariation {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub attribute_combinations: Vec<MeliAttribute>,
    #[serde(default)]
    pub available_quantity: i64,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub picture_ids: Vec<String>,
    #[serde(default)]
    pub user_product_id: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct SizeChart {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub measure_type: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub rows: Vec<SizeChartRow>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct SizeChartRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub attributes: Vec<MeliAttribute>,
}

/// The free-form `struct` field of an attribute value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawMeasure {
    Structured {
        number: f64,
        #[serde(default)]
        unit: Option<String>,
    },
    Number(f64),
    Text(String),
    Other(Value),
}

/// A measurement after resolution at the mapping boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Measure {
    Number(f64),
    Text(String),
    Absent,
}

impl Measure {
    pub fn resolve(raw: Option<&RawMeasure>) -> Self {
        match raw {
            Some(RawMeasure::Structured { number, .. }) | Some(RawMeasure::Number(number)) => {
                Measure::Number(*number)
            }
            Some(RawMeasure::Text(text)) => {
                let trimmed = text.trim();
                match trimmed.parse::<f64>() {
                    Ok(number) => Measure::Number(number),
                    Err(_) if trimmed.is_empty() => Measure::Absent,
                    Err(_) => Measure::Text(trimmed.to_string()),
                }
            }
            Some(RawMeasure::Other(_)) | None => Measure::Absent,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Measure::Number(number) if number.is_finite() => Some(*number),
            _ => None,
        }
    }
}
