use std::sync::Arc;

use attribution_core::model::AttributionModel;
use attribution_core::touchpoint::{Conversion, DateRange, Touchpoint};
use attribution_core::AttributionResult;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::store::AttributionStore;

/// Builds the attribution path for a conversion: the user's touchpoints
/// inside the model's lookback window, oldest first, minus excluded
/// traffic sources.
#[derive(Clone)]
pub struct TouchpointFilter {
    store: Arc<dyn AttributionStore>,
}

impl TouchpointFilter {
    pub fn new(store: Arc<dyn AttributionStore>) -> Self {
        Self { store }
    }

    pub async fn attribution_path(
        &self,
        conversion: &Conversion,
        model: &AttributionModel,
    ) -> AttributionResult<Vec<Touchpoint>> {
        let range = lookback_range(conversion, model);
        let mut touchpoints = self
            .store
            .find_touchpoints_by_user(&conversion.user_id, &range)
            .await?;

        // Position-sensitive models depend on oldest-first order.
        touchpoints.sort_by_key(|tp| tp.timestamp);

        let fetched = touchpoints.len();
        let path = filter_by_channel(touchpoints, model);

        debug!(
            conversion_id = %conversion.id,
            fetched,
            kept = path.len(),
            lookback_days = model.settings.lookback_window_days,
            "Attribution path built"
        );

        Ok(path)
    }
}

/// `[conversion.timestamp - lookback, conversion.timestamp]`, with the start
/// clamped to the earliest representable instant.
pub fn lookback_range(conversion: &Conversion, model: &AttributionModel) -> DateRange {
    let lookback = Duration::days(i64::from(model.settings.lookback_window_days));
    let start = conversion
        .timestamp
        .checked_sub_signed(lookback)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    DateRange::new(start, conversion.timestamp)
}

/// Drops touchpoints whose channel is a known traffic source the model
/// excludes. Unknown and missing channels always pass.
pub fn filter_by_channel(touchpoints: Vec<Touchpoint>, model: &AttributionModel) -> Vec<Touchpoint> {
    touchpoints
        .into_iter()
        .filter(|tp| model.settings.allows_channel(tp.channel.as_deref()))
        .collect()
}
