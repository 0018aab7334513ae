//! Storage seam for touchpoints, conversions, and attribution events.
//!
//! The engine never owns persistence: callers inject an
//! `Arc<dyn AttributionStore>`. [`InMemoryStore`] backs tests and the CLI.

use async_trait::async_trait;
use attribution_core::report::AttributionEvent;
use attribution_core::touchpoint::{Conversion, ConversionDetail, DateRange, Offer, Touchpoint};
use attribution_core::{AttributionError, AttributionResult};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

#[async_trait]
pub trait AttributionStore: Send + Sync {
    /// Touchpoints for `user_id` inside `range` (inclusive), oldest first.
    async fn find_touchpoints_by_user(
        &self,
        user_id: &str,
        range: &DateRange,
    ) -> AttributionResult<Vec<Touchpoint>>;

    /// Conversion joined with its originating click and offer.
    async fn get_conversion(&self, conversion_id: &str) -> AttributionResult<ConversionDetail>;

    /// Conversions with a timestamp inside `range` (inclusive).
    async fn list_conversions(&self, range: &DateRange) -> AttributionResult<Vec<Conversion>>;

    async fn record_event(&self, event: &AttributionEvent) -> AttributionResult<()>;

    async fn events_for_conversion(
        &self,
        conversion_id: &str,
    ) -> AttributionResult<Vec<AttributionEvent>>;
}

/// Serialized store contents, as loaded by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub touchpoints: Vec<Touchpoint>,
    #[serde(default)]
    pub conversions: Vec<Conversion>,
    #[serde(default)]
    pub offers: Vec<Offer>,
}

/// DashMap-backed store. Touchpoints are indexed by user; events are kept
/// in insertion order.
#[derive(Default)]
pub struct InMemoryStore {
    touchpoints_by_user: DashMap<String, Vec<Touchpoint>>,
    touchpoints: DashMap<String, Touchpoint>,
    conversions: DashMap<String, Conversion>,
    offers: DashMap<String, Offer>,
    events: RwLock<Vec<AttributionEvent>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("touchpoints", &self.touchpoints.len())
            .field("conversions", &self.conversions.len())
            .field("offers", &self.offers.len())
            .field("events", &self.events.read().len())
            .finish()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        info!(
            touchpoints = snapshot.touchpoints.len(),
            conversions = snapshot.conversions.len(),
            offers = snapshot.offers.len(),
            "Loading store snapshot"
        );
        for tp in snapshot.touchpoints {
            store.insert_touchpoint(tp);
        }
        for conversion in snapshot.conversions {
            store.insert_conversion(conversion);
        }
        for offer in snapshot.offers {
            store.insert_offer(offer);
        }
        store
    }

    pub fn insert_touchpoint(&self, touchpoint: Touchpoint) {
        self.touchpoints_by_user
            .entry(touchpoint.user_id.clone())
            .or_default()
            .push(touchpoint.clone());
        self.touchpoints.insert(touchpoint.id.clone(), touchpoint);
    }

    pub fn insert_conversion(&self, conversion: Conversion) {
        self.conversions.insert(conversion.id.clone(), conversion);
    }

    pub fn insert_offer(&self, offer: Offer) {
        self.offers.insert(offer.id.clone(), offer);
    }

    /// All recorded events, in insertion order.
    pub fn events(&self) -> Vec<AttributionEvent> {
        self.events.read().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }
}

#[async_trait]
impl AttributionStore for InMemoryStore {
    async fn find_touchpoints_by_user(
        &self,
        user_id: &str,
        range: &DateRange,
    ) -> AttributionResult<Vec<Touchpoint>> {
        let mut found: Vec<Touchpoint> = self
            .touchpoints_by_user
            .get(user_id)
            .map(|tps| {
                tps.iter()
                    .filter(|tp| range.contains(&tp.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by_key(|tp| tp.timestamp);
        Ok(found)
    }

    async fn get_conversion(&self, conversion_id: &str) -> AttributionResult<ConversionDetail> {
        let conversion = self
            .conversions
            .get(conversion_id)
            .map(|c| c.clone())
            .ok_or_else(|| AttributionError::not_found("Conversion", conversion_id))?;

        let touchpoint = conversion
            .touchpoint_id
            .as_ref()
            .and_then(|id| self.touchpoints.get(id).map(|tp| tp.clone()));
        let offer = self.offers.get(&conversion.offer_id).map(|o| o.clone());

        Ok(ConversionDetail {
            conversion,
            touchpoint,
            offer,
        })
    }

    async fn list_conversions(&self, range: &DateRange) -> AttributionResult<Vec<Conversion>> {
        let mut found: Vec<Conversion> = self
            .conversions
            .iter()
            .filter(|c| range.contains(&c.timestamp))
            .map(|c| c.value().clone())
            .collect();
        found.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn record_event(&self, event: &AttributionEvent) -> AttributionResult<()> {
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn events_for_conversion(
        &self,
        conversion_id: &str,
    ) -> AttributionResult<Vec<AttributionEvent>> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| e.conversion_id == conversion_id)
            .cloned()
            .collect())
    }
}
