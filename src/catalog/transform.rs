use crate::catalog::currency;
use crate::catalog::models::{
    CanonicalItem, Category, Delivery, Dimensions, ItemAttributes, ItemStatus,
    MarketplaceAttribute, Price, SizeGuide, SizeRow, SizeStock, Source, Subcategory, Variant,
};
use crate::meli::models::{
    Measure, MeliAttribute, MeliItem, MeliPicture, MeliVariation, SaleTerm, SizeChart,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

pub const SOURCE_TYPE: &str = "meli";
pub const ETL_VERSION: &str = "1.0.0";

const DEFAULT_DIMENSIONS: Dimensions = Dimensions {
    weight: 500,
    length: 30,
    height: 5,
    width: 25,
};

const DEFAULT_COLOR_ID: &str = "default";
const DEFAULT_COLOR_NAME: &str = "Default";
const DEFAULT_COLOR_HEX: &str = "#000000";

const EXCLUDED_ATTRIBUTES: &[&str] = &[
    "GIFTABLE",
    "IS_EMERGING_BRAND",
    "IS_HIGHLIGHT_BRAND",
    "IS_SUITABLE_FOR_PREGNACY",
    "IS_TOM_BRAND",
    "SIZE_GRID_ID",
    "WITH_RECYCLED_MATERIALS",
];

const UNSET_VALUE_ID: &str = "-1";

const FOOTWEAR_KEYWORDS: &[&str] = &["SHOE", "FOOTWEAR", "SNEAKER", "SANDAL", "BOOT"];
const ACCESSORY_KEYWORDS: &[&str] = &["ACCESSORIE", "BAG", "BELT", "WALLET"];

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("listing payload is malformed: {0}")]
    Decode(String),
}

/// Run-level values stamped onto every item of a batch.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub shop_id: String,
    pub owner_id: String,
    pub batch_id: String,
    pub imported_at: DateTime<Utc>,
}

/// Decodes a raw multi-get body into a typed listing.
pub fn decode_listing(body: &Value) -> Result<MeliItem, TransformError> {
    MeliItem::deserialize(body).map_err(|err| TransformError::Decode(err.to_string()))
}

/// Best-effort `(external id, title)` of a body that may not decode.
pub fn listing_identity(body: &Value) -> (String, String) {
    let id = match &body["id"] {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => String::new(),
    };
    let title = body["title"].as_str().unwrap_or_default().to_string();
    (id, title)
}

/// Size grid referenced by the listing, if any.
pub fn size_chart_reference(item: &MeliItem) -> Option<String> {
    item.attributes
        .iter()
        .find(|attr| attr.id == "SIZE_GRID_ID")
        .and_then(|attr| {
            attr.value_name
                .as_deref()
                .filter(|v| !v.is_empty())
                .or(attr.value_id.as_deref().filter(|v| !v.is_empty()))
        })
        .map(str::to_string)
}

/// Maps a marketplace listing onto the host catalog schema.
///
/// Pure: the output depends only on the listing, the context and the
/// optional size chart, so two calls with equal inputs serialize to the same
/// bytes.
pub fn transform(
    item: &MeliItem,
    ctx: &TransformContext,
    size_chart: Option<&SizeChart>,
) -> CanonicalItem {
    let external_id = item.id.trim();
    let title = item.title.trim();
    let amount = item
        .price
        .or_else(|| item.variations.iter().find_map(|v| v.price))
        .unwrap_or(0.0);

    let size_guide = size_chart.map(|chart| {
        let mut guide = map_size_guide(chart);
        guide.external_size_grid_id = size_chart_reference(item);
        guide
    });

    CanonicalItem {
        id: item_id(&ctx.shop_id, external_id),
        shop_id: ctx.shop_id.clone(),
        user_id: ctx.owner_id.clone(),
        name: title.to_string(),
        description: description(item, title),
        status: map_status(&item.status),
        batch_id: ctx.batch_id.clone(),
        category: map_category(&item.domain_id),
        delivery: Delivery {
            fragile: false,
            dimensions: DEFAULT_DIMENSIONS,
        },
        attributes: map_attributes(item),
        variants: map_variants(&item.variations, &item.pictures),
        size_guide,
        price: Price {
            shop_id: ctx.shop_id.clone(),
            amount,
            currency: currency::resolve(&item.currency_id),
        },
        source: Source {
            source_type: SOURCE_TYPE.to_string(),
            external_id: external_id.to_string(),
            external_sku: external_sku(&item.variations),
            batch_id: ctx.batch_id.clone(),
            imported_at: ctx.imported_at,
            etl_version: ETL_VERSION.to_string(),
            transform_metadata: metadata(item),
        },
    }
}

fn item_id(shop_id: &str, external_id: &str) -> String {
    let name = format!("meli://{shop_id}/items/{external_id}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

fn category_id(key: &str) -> String {
    let name = format!("meli://categories/{key}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

fn attribute_value<'a>(attributes: &'a [MeliAttribute], id: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|attr| attr.id == id)
        .and_then(MeliAttribute::resolved_value)
}

fn description(item: &MeliItem, title: &str) -> String {
    match attribute_value(&item.attributes, "BRAND") {
        Some(brand) => format!("{brand} - {title}"),
        None => title.to_string(),
    }
}

pub fn map_status(status: &str) -> ItemStatus {
    match status {
        "paused" | "inactive" | "closed" => ItemStatus::Inactive,
        _ => ItemStatus::Active,
    }
}

pub fn map_category(domain_id: &str) -> Category {
    let domain = domain_id.to_uppercase();
    let name = if FOOTWEAR_KEYWORDS.iter().any(|k| domain.contains(k)) {
        "Footwear"
    } else if ACCESSORY_KEYWORDS.iter().any(|k| domain.contains(k)) {
        "Accessories"
    } else {
        "Apparel"
    };

    // Domains look like `MLA-T_SHIRTS`; the part after the site prefix names
    // the product family.
    let subcategory = domain
        .split_once('-')
        .map(|(_, family)| family)
        .filter(|family| !family.is_empty())
        .map(|family| Subcategory {
            id: category_id(&format!("{name}/{family}")),
            name: humanize(family),
        });

    Category {
        id: category_id(name),
        name: name.to_string(),
        subcategory,
    }
}

fn humanize(family: &str) -> String {
    family
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn map_attributes(item: &MeliItem) -> ItemAttributes {
    let mut marketplace_attributes: Vec<MarketplaceAttribute> = item
        .attributes
        .iter()
        .filter(|attr| !EXCLUDED_ATTRIBUTES.contains(&attr.id.as_str()))
        .filter(|attr| attr.value_id.as_deref() != Some(UNSET_VALUE_ID))
        .filter_map(|attr| {
            let value_name = attr.value_name.as_deref().filter(|v| !v.is_empty())?;
            Some(MarketplaceAttribute {
                id: attr.id.clone(),
                name: attr.name.clone().unwrap_or_default(),
                value_id: attr.value_id.clone().unwrap_or_default(),
                value_name: value_name.to_string(),
            })
        })
        .collect();
    marketplace_attributes.extend(item.sale_terms.iter().filter_map(sale_term_attribute));

    let condition = if item.condition == "used" {
        "pre-owned"
    } else {
        "new"
    };

    ItemAttributes {
        condition: condition.to_string(),
        gender: attribute_value(&item.attributes, "GENDER").map(str::to_lowercase),
        composition: attribute_value(&item.attributes, "COMPOSITION").map(str::to_string),
        marketplace_attributes,
    }
}

fn sale_term_attribute(term: &SaleTerm) -> Option<MarketplaceAttribute> {
    let id = term.id.as_str()?;
    let value_name = term.value_name.as_str()?;
    Some(MarketplaceAttribute {
        id: format!("sale_term_{}", id.to_lowercase()),
        name: term.name.as_str().unwrap_or_default().to_string(),
        value_id: term.value_id.as_str().unwrap_or_default().to_string(),
        value_name: value_name.to_string(),
    })
}

fn all_images(pictures: &[MeliPicture]) -> Vec<String> {
    pictures
        .iter()
        .filter_map(MeliPicture::best_url)
        .map(str::to_string)
        .collect()
}

fn variation_images(variation: &MeliVariation, pictures: &[MeliPicture]) -> Vec<String> {
    let images: Vec<String> = variation
        .picture_ids
        .iter()
        .filter_map(|picture_id| {
            pictures
                .iter()
                .find(|picture| picture.id.as_deref() == Some(picture_id.as_str()))
                .and_then(MeliPicture::best_url)
                .map(str::to_string)
        })
        .collect();
    if images.is_empty() {
        all_images(pictures)
    } else {
        images
    }
}

fn variation_color(variation: &MeliVariation) -> (String, String) {
    let color = variation
        .attribute_combinations
        .iter()
        .find(|attr| attr.id == "COLOR" || attr.id == "MAIN_COLOR");
    let Some(color) = color else {
        return (DEFAULT_COLOR_ID.to_string(), DEFAULT_COLOR_NAME.to_string());
    };
    let name = color.resolved_value().unwrap_or_default();
    match color.value_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => {
            let name = if name.is_empty() { id } else { name };
            (id.to_string(), name.to_string())
        }
        None if !name.is_empty() => (name.to_string(), name.to_string()),
        None => (DEFAULT_COLOR_ID.to_string(), DEFAULT_COLOR_NAME.to_string()),
    }
}

fn variation_size(variation: &MeliVariation) -> Option<&str> {
    variation
        .attribute_combinations
        .iter()
        .find(|attr| attr.id == "SIZE")
        .and_then(MeliAttribute::resolved_value)
}

/// Groups variations by color in encounter order; the first group is main.
pub fn map_variants(variations: &[MeliVariation], pictures: &[MeliPicture]) -> Vec<Variant> {
    if variations.is_empty() {
        return vec![Variant {
            color_id: DEFAULT_COLOR_ID.to_string(),
            color_name: DEFAULT_COLOR_NAME.to_string(),
            color_hex: DEFAULT_COLOR_HEX.to_string(),
            is_main: true,
            images: all_images(pictures),
            size_stock: Vec::new(),
        }];
    }

    let mut variants: Vec<Variant> = Vec::new();
    for variation in variations {
        let (color_id, color_name) = variation_color(variation);
        let index = match variants.iter().position(|v| v.color_id == color_id) {
            Some(index) => index,
            None => {
                variants.push(Variant {
                    is_main: variants.is_empty(),
                    color_id,
                    color_name,
                    color_hex: DEFAULT_COLOR_HEX.to_string(),
                    images: variation_images(variation, pictures),
                    size_stock: Vec::new(),
                });
                variants.len() - 1
            }
        };
        if let Some(size_label) = variation_size(variation) {
            variants[index].size_stock.push(SizeStock {
                size_label: size_label.to_string(),
                stock: variation.available_quantity,
                sku: variation.user_product_id.clone().unwrap_or_default(),
            });
        }
    }
    variants
}

fn centimetres(measure: Measure) -> Option<u32> {
    measure
        .as_number()
        .filter(|number| *number >= 0.0 && *number <= f64::from(u32::MAX))
        .map(|number| number.trunc() as u32)
}

fn first_measure(attr: &MeliAttribute) -> Measure {
    Measure::resolve(attr.values.first().and_then(|value| value.measure.as_ref()))
}

pub fn map_size_guide(chart: &SizeChart) -> SizeGuide {
    let sizes: Vec<SizeRow> = chart
        .rows
        .iter()
        .filter_map(|row| {
            let mut size = SizeRow {
                size_equivalence: String::new(),
                chest_circumference: None,
                waist_circumference: None,
                hip_circumference: None,
            };
            for attr in &row.attributes {
                match attr.id.as_str() {
                    "SIZE" => {
                        size.size_equivalence = attr
                            .values
                            .first()
                            .and_then(|value| value.name.clone())
                            .or_else(|| attr.value_name.clone())
                            .unwrap_or_default();
                    }
                    "CHEST_CIRCUMFERENCE_FROM" => {
                        size.chest_circumference = centimetres(first_measure(attr));
                    }
                    "WAIST_CIRCUMFERENCE_FROM" => {
                        size.waist_circumference = centimetres(first_measure(attr));
                    }
                    "HIP_CIRCUMFERENCE_FROM" => {
                        size.hip_circumference = centimetres(first_measure(attr));
                    }
                    _ => {}
                }
            }
            (!size.size_equivalence.is_empty()).then_some(size)
        })
        .collect();

    SizeGuide {
        guide_type: "standard".to_string(),
        body_part: "upper".to_string(),
        has_measurements: !sizes.is_empty(),
        is_one_size: sizes.len() == 1,
        measurement_source: "mercadolibre".to_string(),
        external_size_grid_id: None,
        sizes,
    }
}

fn external_sku(variations: &[MeliVariation]) -> Option<String> {
    variations
        .first()
        .and_then(|variation| variation.user_product_id.clone())
        .filter(|sku| !sku.is_empty())
}

fn metadata(item: &MeliItem) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("original_domain_id".to_string(), item.domain_id.clone()),
        ("original_category_id".to_string(), item.category_id.clone()),
        ("original_status".to_string(), item.status.clone()),
        ("original_condition".to_string(), item.condition.clone()),
        (
            "variations_count".to_string(),
            item.variations.len().to_string(),
        ),
        ("pictures_count".to_string(), item.pictures.len().to_string()),
        (
            "attributes_count".to_string(),
            item.attributes.len().to_string(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ctx() -> TransformContext {
        TransformContext {
            shop_id: "shop-1".into(),
            owner_id: "owner-1".into(),
            batch_id: "meli-batch".into(),
            imported_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn listing() -> Value {
        json!({
            "id": "MLA100",
            "title": "Remera Oversize",
            "price": 15999.5,
            "currency_id": "ARS",
            "status": "paused",
            "condition": "used",
            "category_id": "MLA109042",
            "domain_id": "MLA-T_SHIRTS",
            "pictures": [
                {"id": "P1", "url": "http://img/1", "secure_url": "https://img/1"},
                {"id": "P2", "url": "http://img/2", "secure_url": "https://img/2"},
                {"id": "P3", "url": "http://img/3", "secure_url": "https://img/3"}
            ],
            "attributes": [
                {"id": "BRAND", "name": "Marca", "value_id": "9", "value_name": "Acme"},
                {"id": "GENDER", "name": "Género", "value_id": "339666", "value_name": "Mujer"},
                {"id": "COMPOSITION", "name": "Composición", "value_name": "100% algodón"},
                {"id": "GIFTABLE", "name": "Es regalable", "value_name": "Sí"},
                {"id": "MODEL", "name": "Modelo", "value_id": "-1", "value_name": "n/a"},
                {"id": "STYLE", "name": "Estilo", "value_name": ""},
                {"id": "SIZE_GRID_ID", "name": "Guía", "value_name": "3947201"}
            ],
            "sale_terms": [
                {"id": "WARRANTY_TYPE", "name": "Tipo de garantía", "value_id": "2230280", "value_name": "Garantía del vendedor"},
                {"id": 7, "value_name": "ignored"},
                {"id": "MANUFACTURING_TIME", "value_name": null}
            ],
            "variations": [
                {
                    "id": 1,
                    "available_quantity": 4,
                    "picture_ids": ["P2"],
                    "user_product_id": "UP-RED-S",
                    "attribute_combinations": [
                        {"id": "COLOR", "value_id": "52049", "value_name": "Rojo"},
                        {"id": "SIZE", "value_name": "S"}
                    ]
                },
                {
                    "id": 2,
                    "available_quantity": 0,
                    "picture_ids": ["P2", "P3"],
                    "user_product_id": "UP-RED-M",
                    "attribute_combinations": [
                        {"id": "COLOR", "value_id": "52049", "value_name": "Rojo"},
                        {"id": "SIZE", "value_name": "M"}
                    ]
                },
                {
                    "id": 3,
                    "available_quantity": 9,
                    "picture_ids": ["P9"],
                    "user_product_id": "UP-BLUE-S",
                    "attribute_combinations": [
                        {"id": "MAIN_COLOR", "value_id": "", "value_name": "Azul"},
                        {"id": "SIZE", "value_name": "S"}
                    ]
                }
            ]
        })
    }

    fn transformed(body: &Value) -> CanonicalItem {
        let item = decode_listing(body).expect("decode");
        transform(&item, &ctx(), None)
    }

    #[test]
    fn maps_core_fields() {
        let out = transformed(&listing());
        assert_eq!(out.name, "Remera Oversize");
        assert_eq!(out.description, "Acme - Remera Oversize");
        assert_eq!(out.status, ItemStatus::Inactive);
        assert_eq!(out.shop_id, "shop-1");
        assert_eq!(out.user_id, "owner-1");
        assert_eq!(out.batch_id, "meli-batch");
        assert_eq!(out.price.amount, 15999.5);
        assert_eq!(out.price.currency.id, "ARS");
        assert_eq!(out.delivery.dimensions, DEFAULT_DIMENSIONS);
        assert!(!out.delivery.fragile);
        assert_eq!(out.source.source_type, "meli");
        assert_eq!(out.source.external_id, "MLA100");
        assert_eq!(out.source.external_sku.as_deref(), Some("UP-RED-S"));
        assert_eq!(out.source.etl_version, ETL_VERSION);
        assert_eq!(out.source.transform_metadata["variations_count"], "3");
        assert_eq!(out.source.transform_metadata["pictures_count"], "3");
        assert_eq!(out.source.transform_metadata["attributes_count"], "7");
        assert_eq!(out.source.transform_metadata["original_status"], "paused");
    }

    #[test]
    fn status_mapping_defaults_to_active() {
        assert_eq!(map_status("active"), ItemStatus::Active);
        assert_eq!(map_status("paused"), ItemStatus::Inactive);
        assert_eq!(map_status("inactive"), ItemStatus::Inactive);
        assert_eq!(map_status("closed"), ItemStatus::Inactive);
        assert_eq!(map_status("under_review"), ItemStatus::Active);
        assert_eq!(map_status(""), ItemStatus::Active);
    }

    #[test]
    fn category_buckets_by_domain_keyword() {
        assert_eq!(map_category("MLA-SNEAKERS").name, "Footwear");
        assert_eq!(map_category("MLA-HIGH_HEEL_SHOES").name, "Footwear");
        assert_eq!(map_category("MLA-FASHION_ACCESSORIES").name, "Accessories");
        assert_eq!(map_category("MLA-PANTS").name, "Apparel");
        assert_eq!(map_category("").name, "Apparel");
        assert!(map_category("").subcategory.is_none());

        let shirts = map_category("MLA-T_SHIRTS");
        let sub = shirts.subcategory.expect("subcategory");
        assert_eq!(sub.name, "T Shirts");
        assert_eq!(shirts.id, map_category("MLA-PANTS").id);
    }

    #[test]
    fn attributes_are_filtered_and_promoted() {
        let out = transformed(&listing());
        let attrs = &out.attributes;
        assert_eq!(attrs.condition, "pre-owned");
        assert_eq!(attrs.gender.as_deref(), Some("mujer"));
        assert_eq!(attrs.composition.as_deref(), Some("100% algodón"));
        let ids: Vec<&str> = attrs
            .marketplace_attributes
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["BRAND", "GENDER", "COMPOSITION", "sale_term_warranty_type"]
        );
        let warranty = attrs.marketplace_attributes.last().unwrap();
        assert_eq!(warranty.value_id, "2230280");
        assert_eq!(warranty.name, "Tipo de garantía");
    }

    #[test]
    fn variations_group_by_color_in_order() {
        let out = transformed(&listing());
        assert_eq!(out.variants.len(), 2);

        let red = &out.variants[0];
        assert!(red.is_main);
        assert_eq!(red.color_id, "52049");
        assert_eq!(red.color_name, "Rojo");
        assert_eq!(red.images, vec!["https://img/2"]);
        let sizes: Vec<(&str, i64, &str)> = red
            .size_stock
            .iter()
            .map(|s| (s.size_label.as_str(), s.stock, s.sku.as_str()))
            .collect();
        assert_eq!(sizes, vec![("S", 4, "UP-RED-S"), ("M", 0, "UP-RED-M")]);

        let blue = &out.variants[1];
        assert!(!blue.is_main);
        assert_eq!(blue.color_id, "Azul");
        // P9 does not exist, so every picture is used
        assert_eq!(blue.images.len(), 3);
        assert_eq!(out.variants.iter().filter(|v| v.is_main).count(), 1);
    }

    #[test]
    fn no_variations_yields_single_default_variant() {
        let mut body = listing();
        body["variations"] = json!([]);
        let out = transformed(&body);
        assert_eq!(out.variants.len(), 1);
        let variant = &out.variants[0];
        assert_eq!(variant.color_id, "default");
        assert_eq!(variant.color_name, "Default");
        assert!(variant.is_main);
        assert!(variant.size_stock.is_empty());
        assert_eq!(variant.images.len(), 3);
        assert!(out.source.external_sku.is_none());
    }

    #[test]
    fn variation_without_color_uses_default_key() {
        let mut body = listing();
        body["variations"] = json!([
            {"available_quantity": 1, "attribute_combinations": [{"id": "SIZE", "value_name": "38"}]},
            {"available_quantity": 2, "attribute_combinations": [{"id": "SIZE", "value_name": "40"}]}
        ]);
        let out = transformed(&body);
        assert_eq!(out.variants.len(), 1);
        assert_eq!(out.variants[0].color_id, "default");
        assert_eq!(out.variants[0].size_stock.len(), 2);
        assert_eq!(out.variants[0].size_stock[0].sku, "");
    }

    #[test]
    fn size_chart_becomes_size_guide() {
        let chart: SizeChart = serde_json::from_value(json!({
            "id": "3947201",
            "measure_type": "BODY_MEASURE",
            "rows": [
                {"id": "r1", "attributes": [
                    {"id": "SIZE", "values": [{"name": "S"}]},
                    {"id": "CHEST_CIRCUMFERENCE_FROM", "values": [{"name": "88 cm", "struct": {"number": 88, "unit": "cm"}}]},
                    {"id": "WAIST_CIRCUMFERENCE_FROM", "values": [{"name": "70 cm", "struct": "70.4"}]},
                    {"id": "HIP_CIRCUMFERENCE_FROM", "values": [{"name": "?", "struct": null}]}
                ]},
                {"id": "r2", "attributes": [
                    {"id": "CHEST_CIRCUMFERENCE_FROM", "values": [{"struct": {"number": 96}}]}
                ]}
            ]
        }))
        .expect("chart");
        let item = decode_listing(&listing()).unwrap();
        let out = transform(&item, &ctx(), Some(&chart));
        let guide = out.size_guide.expect("guide");
        assert_eq!(guide.sizes.len(), 1);
        assert!(guide.is_one_size);
        assert!(guide.has_measurements);
        assert_eq!(guide.external_size_grid_id.as_deref(), Some("3947201"));
        assert_eq!(guide.measurement_source, "mercadolibre");
        let row = &guide.sizes[0];
        assert_eq!(row.size_equivalence, "S");
        assert_eq!(row.chest_circumference, Some(88));
        assert_eq!(row.waist_circumference, Some(70));
        assert_eq!(row.hip_circumference, None);
    }

    #[test]
    fn transform_is_deterministic() {
        let body = listing();
        let first = serde_json::to_vec(&transformed(&body)).unwrap();
        let second = serde_json::to_vec(&transformed(&body)).unwrap();
        assert_eq!(first, second);
        assert_eq!(transformed(&body).id, transformed(&body).id);
    }

    #[test]
    fn unknown_currency_falls_back() {
        let mut body = listing();
        body["currency_id"] = json!("ZZZ");
        let currency = transformed(&body).price.currency;
        assert_eq!(currency.symbol, "ZZZ");
        assert_eq!(currency.decimal_divider, ".");
        assert_eq!(currency.thousands_divider, ",");
    }

    #[test]
    fn malformed_attributes_fail_decode() {
        let mut body = listing();
        body["attributes"] = json!("not-a-list");
        assert!(matches!(
            decode_listing(&body),
            Err(TransformError::Decode(_))
        ));
        assert_eq!(
            listing_identity(&body),
            ("MLA100".to_string(), "Remera Oversize".to_string())
        );
    }

    #[test]
    fn sparse_listings_still_map() {
        let mut body = listing();
        body["price"] = Value::Null;
        body["variations"] = json!([]);
        let out = transformed(&body);
        assert_eq!(out.price.amount, 0.0);

        let mut body = listing();
        body["title"] = json!("  ");
        let out = transformed(&body);
        assert_eq!(out.name, "");
        assert_eq!(out.source.external_id, "MLA100");

        let mut body = listing();
        body.as_object_mut().unwrap().remove("currency_id");
        let currency = transformed(&body).price.currency;
        assert_eq!(currency.id, "");
        assert_eq!(currency.decimal_divider, ".");

        let mut body = listing();
        body["price"] = json!(-3.0);
        assert_eq!(transformed(&body).price.amount, -3.0);
    }

    #[test]
    fn size_measurements_are_truncated() {
        let chart: SizeChart = serde_json::from_value(json!({
            "rows": [{"attributes": [
                {"id": "SIZE", "values": [{"name": "M"}]},
                {"id": "CHEST_CIRCUMFERENCE_FROM", "values": [{"struct": {"number": 70.6, "unit": "cm"}}]},
                {"id": "HIP_CIRCUMFERENCE_FROM", "values": [{"struct": "99.9"}]}
            ]}]
        }))
        .expect("chart");
        let guide = map_size_guide(&chart);
        assert_eq!(guide.sizes[0].chest_circumference, Some(70));
        assert_eq!(guide.sizes[0].hip_circumference, Some(99));
    }
}
