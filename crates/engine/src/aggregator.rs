//! Report aggregation: attributes every conversion in a report's date range
//! and rolls the events up into affiliate/offer/channel/device/country
//! breakdowns, a daily timeline, and a path-position profile.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use attribution_core::config::ReportConfig;
use attribution_core::report::{
    AttributionEvent, AttributionReport, BreakdownMetrics, PathPosition, ReportResults,
    TimelinePoint,
};
use attribution_core::touchpoint::Conversion;
use attribution_core::{AttributionError, AttributionResult};
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::materializer::EventMaterializer;
use crate::registry::{ModelRegistry, ReportRegistry};
use crate::store::AttributionStore;

const UNKNOWN: &str = "unknown";

pub struct ReportAggregator {
    store: Arc<dyn AttributionStore>,
    reports: Arc<ReportRegistry>,
    materializer: EventMaterializer,
    progress_log_interval: usize,
}

impl ReportAggregator {
    pub fn new(
        store: Arc<dyn AttributionStore>,
        models: Arc<ModelRegistry>,
        reports: Arc<ReportRegistry>,
        config: &ReportConfig,
    ) -> Self {
        Self {
            materializer: EventMaterializer::new(store.clone(), models),
            store,
            reports,
            progress_log_interval: config.progress_log_interval.max(1),
        }
    }

    pub fn materializer(&self) -> &EventMaterializer {
        &self.materializer
    }

    pub async fn generate_report(&self, report_id: &Uuid) -> AttributionResult<AttributionReport> {
        self.generate_report_with_cancel(report_id, &CancellationToken::new())
            .await
    }

    /// Runs a report from scratch. The report moves to PROCESSING, then to
    /// COMPLETED with fresh results, or to FAILED (results untouched) with
    /// the error returned to the caller. Cancellation ends the run FAILED.
    pub async fn generate_report_with_cancel(
        &self,
        report_id: &Uuid,
        cancel: &CancellationToken,
    ) -> AttributionResult<AttributionReport> {
        let report = self.reports.get_report(report_id)?;
        self.reports.mark_processing(report_id)?;

        let started = Instant::now();
        match self.run(&report, cancel).await {
            Ok(results) => {
                let completed = self.reports.mark_completed(report_id, results)?;
                let elapsed_ms = started.elapsed().as_millis() as f64;
                metrics::counter!("report.generated").increment(1);
                metrics::histogram!("report.generation_ms").record(elapsed_ms);
                info!(
                    report_id = %report_id,
                    conversions = completed.results.total_conversions,
                    elapsed_ms,
                    "Report completed"
                );
                Ok(completed)
            }
            Err(e) => {
                metrics::counter!("report.failed").increment(1);
                error!(report_id = %report_id, error = %e, "Report generation failed");
                if let Err(mark_err) = self.reports.mark_failed(report_id) {
                    warn!(report_id = %report_id, error = %mark_err, "Could not mark report as failed");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        report: &AttributionReport,
        cancel: &CancellationToken,
    ) -> AttributionResult<ReportResults> {
        let conversions: Vec<Conversion> = self
            .store
            .list_conversions(&report.date_range)
            .await?
            .into_iter()
            .filter(|c| report.filters.matches(c))
            .collect();

        info!(
            report_id = %report.id,
            model_id = %report.model_id,
            conversions = conversions.len(),
            "Generating attribution report"
        );

        let mut events = Vec::new();
        for (processed, conversion) in conversions.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(AttributionError::Cancelled(report.id));
            }

            let attributed = tokio::select! {
                _ = cancel.cancelled() => return Err(AttributionError::Cancelled(report.id)),
                res = self.materializer.calculate_attribution(&conversion.id, &report.model_id) => res?,
            };
            events.extend(attributed);

            if (processed + 1) % self.progress_log_interval == 0 {
                info!(
                    report_id = %report.id,
                    processed = processed + 1,
                    total = conversions.len(),
                    "Report progress"
                );
            }
        }

        Ok(aggregate_results(&conversions, &events))
    }
}

/// Rolls attribution events and their conversions into report results.
///
/// Breakdowns are credit-weighted per event. Totals and the timeline count
/// each conversion once, unweighted.
pub fn aggregate_results(conversions: &[Conversion], events: &[AttributionEvent]) -> ReportResults {
    let mut results = ReportResults {
        total_conversions: conversions.len() as u64,
        total_revenue: conversions.iter().map(|c| c.order_value).sum(),
        total_commissions: conversions
            .iter()
            .map(|c| c.commission_amount.unwrap_or(0.0))
            .sum(),
        ..Default::default()
    };

    for event in events {
        let tp = &event.touchpoint;
        let keys = [
            (&mut results.by_affiliate, event.affiliate_id.as_str()),
            (&mut results.by_offer, event.offer_id.as_str()),
            (&mut results.by_channel, tp.channel.as_deref().unwrap_or(UNKNOWN)),
            (&mut results.by_device, tp.device_type().unwrap_or(UNKNOWN)),
            (&mut results.by_country, tp.country.as_deref().unwrap_or(UNKNOWN)),
        ];
        for (breakdown, key) in keys {
            accumulate(breakdown, key, event);
        }
    }

    let mut timeline: BTreeMap<NaiveDate, TimelinePoint> = BTreeMap::new();
    for conversion in conversions {
        let date = conversion.timestamp.date_naive();
        let point = timeline.entry(date).or_insert(TimelinePoint {
            date,
            conversions: 0,
            revenue: 0.0,
        });
        point.conversions += 1;
        point.revenue += conversion.order_value;
    }
    results.timeline = timeline.into_values().collect();

    let mut positions: BTreeMap<usize, PathPosition> = BTreeMap::new();
    for event in events {
        match positions.entry(event.position) {
            Entry::Vacant(slot) => {
                slot.insert(PathPosition {
                    position: event.position,
                    channel: event
                        .touchpoint
                        .channel
                        .clone()
                        .unwrap_or_else(|| UNKNOWN.to_string()),
                    credit: event.credit,
                    percentage: 0.0,
                });
            }
            Entry::Occupied(mut slot) => slot.get_mut().credit += event.credit,
        }
    }
    let total = results.total_conversions as f64;
    results.attribution_paths = positions
        .into_values()
        .map(|mut p| {
            p.percentage = if total > 0.0 { p.credit / total * 100.0 } else { 0.0 };
            p
        })
        .collect();

    results
}

fn accumulate(breakdown: &mut BTreeMap<String, BreakdownMetrics>, key: &str, event: &AttributionEvent) {
    let metrics = breakdown.entry(key.to_string()).or_default();
    metrics.conversions += event.credit;
    metrics.revenue += event.credit * event.order_value;
    metrics.commission += event.credit * event.commission_amount.unwrap_or(0.0);
}
