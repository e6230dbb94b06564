use crate::meli::{MarketplaceCatalog, MeliError};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Marketplace(#[from] MeliError),
    #[error("page size must be positive")]
    InvalidPageSize,
    #[error("listing enumeration did not terminate after {0} pages")]
    PageLimitExceeded(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct PagePlan {
    pub page_size: usize,
    pub max_pages: usize,
}

/// Enumerates every listing id of a seller with offset paging.
///
/// Pages are requested one at a time. The loop ends on an empty page or a
/// page shorter than `page_size`; the upstream `paging.total` is not trusted.
/// Ids repeated across pages (listings shifting under the offset) are kept
/// once, in first-seen order.
pub async fn fetch_item_ids(
    catalog: &dyn MarketplaceCatalog,
    seller_id: i64,
    access_token: &str,
    plan: PagePlan,
) -> Result<Vec<String>, FetchError> {
    if plan.page_size == 0 {
        return Err(FetchError::InvalidPageSize);
    }
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = 0usize;
    let mut pages = 0usize;

    loop {
        if pages >= plan.max_pages {
            return Err(FetchError::PageLimitExceeded(pages));
        }
        let page = catalog
            .list_item_ids(seller_id, offset, plan.page_size, access_token)
            .await?;
        pages += 1;
        let returned = page.results.len();
        debug!(
            target = "catalog.meli",
            seller_id, offset, returned, "listing page fetched"
        );
        for id in page.results {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        if returned == 0 || returned < plan.page_size {
            break;
        }
        offset += plan.page_size;
    }

    Ok(ids)
}

/// Enumerates the seller's listings, then resolves them with one multi-get.
/// Envelopes whose `code` is not 200 are dropped; the remaining bodies keep
/// the response order.
pub async fn fetch_all_items(
    catalog: &dyn MarketplaceCatalog,
    seller_id: i64,
    access_token: &str,
    plan: PagePlan,
) -> Result<Vec<Value>, FetchError> {
    let ids = fetch_item_ids(catalog, seller_id, access_token, plan).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let envelopes = catalog.get_items(&ids, access_token).await?;
    let received = envelopes.len();
    let mut dropped_codes = Vec::new();
    let mut items = Vec::with_capacity(received);
    for envelope in envelopes {
        if envelope.is_ok() {
            items.push(envelope.body);
        } else {
            dropped_codes.push(envelope.code);
        }
    }
    if !dropped_codes.is_empty() {
        warn!(
            target = "catalog.meli",
            seller_id,
            requested = ids.len(),
            dropped = dropped_codes.len(),
            codes = ?dropped_codes,
            "multi-get dropped non-200 entries"
        );
    }
    Ok(items)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::meli::models::{ItemEnvelope, ItemSearchPage, Paging, SizeChart};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory seller catalog serving `total` listings named `MLA{n}`.
    pub(crate) struct FakeCatalog {
        pub ids: Vec<String>,
        pub bodies: Vec<Value>,
        pub list_calls: AtomicUsize,
        pub requested_offsets: Mutex<Vec<usize>>,
        pub forced_codes: Vec<(String, u16)>,
        pub endless: bool,
        pub chart: Option<Value>,
        pub chart_calls: AtomicUsize,
    }

    impl FakeCatalog {
        pub(crate) fn with_items(bodies: Vec<Value>) -> Self {
            let ids = bodies
                .iter()
                .map(|body| body["id"].as_str().unwrap_or_default().to_string())
                .collect();
            Self {
                ids,
                bodies,
                list_calls: AtomicUsize::new(0),
                requested_offsets: Mutex::new(Vec::new()),
                forced_codes: Vec::new(),
                endless: false,
                chart: None,
                chart_calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn with_total(total: usize) -> Self {
            Self::with_items(
                (1..=total)
                    .map(|n| json!({"id": format!("MLA{n}"), "title": format!("Item {n}")}))
                    .collect(),
            )
        }

        pub(crate) fn calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketplaceCatalog for FakeCatalog {
        async fn list_item_ids(
            &self,
            _seller_id: i64,
            offset: usize,
            limit: usize,
            _access_token: &str,
        ) -> Result<ItemSearchPage, MeliError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.requested_offsets.lock().unwrap().push(offset);
            let results = if self.endless {
                (0..limit).map(|n| format!("MLA{}", offset + n)).collect()
            } else {
                self.ids.iter().skip(offset).take(limit).cloned().collect()
            };
            Ok(ItemSearchPage {
                results,
                paging: Paging {
                    total: self.ids.len() as u64,
                    offset: offset as u64,
                    limit: limit as u64,
                },
            })
        }

        async fn get_items(
            &self,
            ids: &[String],
            _access_token: &str,
        ) -> Result<Vec<ItemEnvelope>, MeliError> {
            Ok(ids
                .iter()
                .map(|id| {
                    let code = self
                        .forced_codes
                        .iter()
                        .find(|(forced, _)| forced == id)
                        .map(|(_, code)| *code)
                        .unwrap_or(200);
                    let body = self
                        .bodies
                        .iter()
                        .find(|body| body["id"] == json!(id))
                        .cloned()
                        .unwrap_or(Value::Null);
                    ItemEnvelope { code, body }
                })
                .collect())
        }

        async fn get_item(&self, item_id: &str, _access_token: &str) -> Result<Value, MeliError> {
            self.bodies
                .iter()
                .find(|body| body["id"] == json!(item_id))
                .cloned()
                .ok_or(MeliError::Upstream {
                    endpoint: "get_item",
                    status: 404,
                })
        }

        async fn size_chart(
            &self,
            _chart_id: &str,
            _access_token: &str,
        ) -> Result<SizeChart, MeliError> {
            self.chart_calls.fetch_add(1, Ordering::SeqCst);
            match &self.chart {
                Some(chart) => serde_json::from_value(chart.clone())
                    .map_err(|err| MeliError::decode("size_chart", err)),
                None => Err(MeliError::Upstream {
                    endpoint: "size_chart",
                    status: 404,
                }),
            }
        }
    }

    const PLAN: PagePlan = PagePlan {
        page_size: 50,
        max_pages: 100,
    };

    #[tokio::test]
    async fn pagination_stops_on_short_page() {
        let catalog = FakeCatalog::with_total(120);
        let ids = fetch_item_ids(&catalog, 1, "tok", PLAN).await.expect("ids");
        assert_eq!(catalog.calls(), 3);
        assert_eq!(
            *catalog.requested_offsets.lock().unwrap(),
            vec![0, 50, 100]
        );
        assert_eq!(ids.len(), 120);
        assert_eq!(ids.first().map(String::as_str), Some("MLA1"));
        assert_eq!(ids.last().map(String::as_str), Some("MLA120"));
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_probe() {
        let catalog = FakeCatalog::with_total(100);
        let ids = fetch_item_ids(&catalog, 1, "tok", PLAN).await.expect("ids");
        assert_eq!(ids.len(), 100);
        assert_eq!(catalog.calls(), 3);
    }

    #[tokio::test]
    async fn empty_seller_yields_no_items() {
        let catalog = FakeCatalog::with_total(0);
        let items = fetch_all_items(&catalog, 1, "tok", PLAN).await.expect("items");
        assert!(items.is_empty());
        assert_eq!(catalog.calls(), 1);
    }

    #[tokio::test]
    async fn endless_upstream_hits_page_ceiling() {
        let mut catalog = FakeCatalog::with_total(0);
        catalog.endless = true;
        let plan = PagePlan {
            page_size: 10,
            max_pages: 4,
        };
        let err = fetch_item_ids(&catalog, 1, "tok", plan)
            .await
            .expect_err("ceiling");
        assert!(matches!(err, FetchError::PageLimitExceeded(4)));
        assert_eq!(catalog.calls(), 4);
    }

    #[tokio::test]
    async fn multi_get_keeps_only_ok_entries_in_order() {
        let mut catalog = FakeCatalog::with_total(5);
        catalog.forced_codes = vec![("MLA2".into(), 404), ("MLA4".into(), 500)];
        let items = fetch_all_items(&catalog, 1, "tok", PLAN).await.expect("items");
        let ids: Vec<&str> = items.iter().filter_map(|b| b["id"].as_str()).collect();
        assert_eq!(ids, vec!["MLA1", "MLA3", "MLA5"]);
    }
}
