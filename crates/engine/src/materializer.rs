use std::sync::Arc;

use attribution_core::report::AttributionEvent;
use attribution_core::AttributionResult;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::credit::calculate_credits;
use crate::filter::TouchpointFilter;
use crate::registry::ModelRegistry;
use crate::store::AttributionStore;

/// Turns a conversion's attribution path into persisted attribution events,
/// one per touchpoint, in path order.
#[derive(Clone)]
pub struct EventMaterializer {
    store: Arc<dyn AttributionStore>,
    models: Arc<ModelRegistry>,
    filter: TouchpointFilter,
}

impl std::fmt::Debug for EventMaterializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMaterializer").finish_non_exhaustive()
    }
}

impl EventMaterializer {
    pub fn new(store: Arc<dyn AttributionStore>, models: Arc<ModelRegistry>) -> Self {
        Self {
            filter: TouchpointFilter::new(store.clone()),
            store,
            models,
        }
    }

    /// Attributes one conversion under one model and records the events.
    /// Fails with `NotFound` when either the model or the conversion is
    /// missing.
    pub async fn calculate_attribution(
        &self,
        conversion_id: &str,
        model_id: &Uuid,
    ) -> AttributionResult<Vec<AttributionEvent>> {
        let model = self.models.get_model(model_id)?;
        let detail = self.store.get_conversion(conversion_id).await?;
        let conversion = &detail.conversion;

        let path = self.filter.attribution_path(conversion, &model).await?;
        let credits = calculate_credits(&path, &model);
        let divisor = conversion.commission_divisor();

        let mut events = Vec::with_capacity(path.len());
        for (index, (touchpoint, credit)) in path.into_iter().zip(credits).enumerate() {
            let event = AttributionEvent {
                id: Uuid::new_v4(),
                conversion_id: conversion.id.clone(),
                touchpoint_id: touchpoint.id.clone(),
                affiliate_id: touchpoint.affiliate_id.clone(),
                offer_id: touchpoint.offer_id.clone(),
                credit,
                weight: credit / divisor,
                position: index + 1,
                timestamp: touchpoint.timestamp,
                model_type: model.model_type,
                touchpoint,
                order_value: conversion.order_value,
                commission_amount: conversion.commission_amount,
                created_at: Utc::now(),
            };
            self.store.record_event(&event).await?;
            events.push(event);
        }

        metrics::counter!("attribution.events_materialized").increment(events.len() as u64);
        debug!(
            conversion_id = %conversion.id,
            model_id = %model.id,
            model_type = model.model_type.as_str(),
            offer = detail.offer.as_ref().map(|o| o.name.as_str()).unwrap_or("unknown"),
            events = events.len(),
            "Attribution calculated"
        );

        Ok(events)
    }
}
