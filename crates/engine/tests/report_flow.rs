//! End-to-end report generation against the in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use attribution_core::config::{AttributionConfig, ReportConfig};
use attribution_core::model::{ModelType, NewAttributionModel};
use attribution_core::report::{
    AttributionEvent, NewAttributionReport, ReportFilters, ReportResults, ReportStatus,
};
use attribution_core::touchpoint::{Conversion, ConversionDetail, DateRange, Touchpoint};
use attribution_core::{AttributionError, AttributionResult};
use attribution_engine::{
    AttributionStore, InMemoryStore, ModelRegistry, ReportAggregator, ReportRegistry,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const ACCOUNT: &str = "acct-1";

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

fn touchpoint(id: &str, user: &str, affiliate: &str, channel: &str, ts: DateTime<Utc>) -> Touchpoint {
    Touchpoint {
        id: id.into(),
        user_id: user.into(),
        affiliate_id: affiliate.into(),
        offer_id: "offer-1".into(),
        channel: Some(channel.into()),
        device: None,
        country: Some("US".into()),
        timestamp: ts,
        attributes: Default::default(),
    }
}

fn conversion(id: &str, user: &str, affiliate: &str, ts: DateTime<Utc>) -> Conversion {
    Conversion {
        id: id.into(),
        user_id: user.into(),
        offer_id: "offer-1".into(),
        affiliate_id: affiliate.into(),
        touchpoint_id: None,
        order_value: 80.0,
        commission_amount: Some(8.0),
        timestamp: ts,
    }
}

/// Wraps the in-memory store and fails event writes while `fail` is set.
struct FlakyStore {
    inner: InMemoryStore,
    fail: AtomicBool,
}

#[async_trait]
impl AttributionStore for FlakyStore {
    async fn find_touchpoints_by_user(
        &self,
        user_id: &str,
        range: &DateRange,
    ) -> AttributionResult<Vec<Touchpoint>> {
        self.inner.find_touchpoints_by_user(user_id, range).await
    }

    async fn get_conversion(&self, conversion_id: &str) -> AttributionResult<ConversionDetail> {
        self.inner.get_conversion(conversion_id).await
    }

    async fn list_conversions(&self, range: &DateRange) -> AttributionResult<Vec<Conversion>> {
        self.inner.list_conversions(range).await
    }

    async fn record_event(&self, event: &AttributionEvent) -> AttributionResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AttributionError::Store("event table unavailable".into()));
        }
        self.inner.record_event(event).await
    }

    async fn events_for_conversion(
        &self,
        conversion_id: &str,
    ) -> AttributionResult<Vec<AttributionEvent>> {
        self.inner.events_for_conversion(conversion_id).await
    }
}

/// Parks every touchpoint lookup forever, signalling `entered` first.
struct StalledStore {
    inner: InMemoryStore,
    entered: Notify,
}

#[async_trait]
impl AttributionStore for StalledStore {
    async fn find_touchpoints_by_user(
        &self,
        _user_id: &str,
        _range: &DateRange,
    ) -> AttributionResult<Vec<Touchpoint>> {
        self.entered.notify_one();
        std::future::pending().await
    }

    async fn get_conversion(&self, conversion_id: &str) -> AttributionResult<ConversionDetail> {
        self.inner.get_conversion(conversion_id).await
    }

    async fn list_conversions(&self, range: &DateRange) -> AttributionResult<Vec<Conversion>> {
        self.inner.list_conversions(range).await
    }

    async fn record_event(&self, event: &AttributionEvent) -> AttributionResult<()> {
        self.inner.record_event(event).await
    }

    async fn events_for_conversion(
        &self,
        conversion_id: &str,
    ) -> AttributionResult<Vec<AttributionEvent>> {
        self.inner.events_for_conversion(conversion_id).await
    }
}

struct Harness {
    models: Arc<ModelRegistry>,
    reports: Arc<ReportRegistry>,
    aggregator: ReportAggregator,
}

fn harness(store: Arc<dyn AttributionStore>) -> Harness {
    let models = Arc::new(ModelRegistry::new(&AttributionConfig::default()));
    let reports = Arc::new(ReportRegistry::new());
    let aggregator =
        ReportAggregator::new(store, models.clone(), reports.clone(), &ReportConfig::default());
    Harness {
        models,
        reports,
        aggregator,
    }
}

fn model(h: &Harness, model_type: ModelType) -> Uuid {
    h.models
        .create_model(
            ACCOUNT,
            NewAttributionModel {
                name: model_type.as_str().into(),
                model_type: Some(model_type),
                ..Default::default()
            },
        )
        .id
}

fn report(h: &Harness, model_id: Uuid, filters: ReportFilters) -> Uuid {
    h.reports
        .create_report(
            ACCOUNT,
            NewAttributionReport {
                name: "May".into(),
                description: None,
                model_id,
                date_range: DateRange::new(at(1, 0), at(31, 23)),
                filters,
                metrics: vec![],
                dimensions: vec![],
            },
        )
        .id
}

fn two_single_touch_conversions() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert_touchpoint(touchpoint("tp-1", "u1", "aff-1", "email", at(10, 8)));
    store.insert_touchpoint(touchpoint("tp-2", "u2", "aff-2", "paid", at(12, 8)));
    store.insert_conversion(conversion("c-1", "u1", "aff-1", at(10, 12)));
    store.insert_conversion(conversion("c-2", "u2", "aff-2", at(12, 12)));
    store
}

#[tokio::test]
async fn last_click_single_touch_conversions() {
    let h = harness(Arc::new(two_single_touch_conversions()));
    let model_id = model(&h, ModelType::LastClick);
    let report_id = report(&h, model_id, ReportFilters::default());

    let report = h.aggregator.generate_report(&report_id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Completed);
    assert!(report.completed_at.is_some());

    let results = &report.results;
    assert_eq!(results.total_conversions, 2);
    assert!((results.total_revenue - 160.0).abs() < 1e-9);
    assert!((results.total_commissions - 16.0).abs() < 1e-9);
    assert!((results.by_affiliate["aff-1"].conversions - 1.0).abs() < 1e-9);
    assert!((results.by_affiliate["aff-2"].conversions - 1.0).abs() < 1e-9);
    assert!((results.by_channel["email"].revenue - 80.0).abs() < 1e-9);
    assert!((results.by_device["unknown"].conversions - 2.0).abs() < 1e-9);
    assert!((results.by_country["US"].commission - 16.0).abs() < 1e-9);
    assert_eq!(results.timeline.len(), 2);
    assert_eq!(results.attribution_paths.len(), 1);
    assert!((results.attribution_paths[0].percentage - 100.0).abs() < 1e-9);

    let stored = h.reports.get_report(&report_id).unwrap();
    assert_eq!(stored.status, ReportStatus::Completed);
    assert_eq!(stored.results, report.results);
}

#[tokio::test]
async fn generate_report_is_idempotent() {
    let store = two_single_touch_conversions();
    store.insert_touchpoint(touchpoint("tp-3", "u1", "aff-3", "social", at(9, 8)));
    let h = harness(Arc::new(store));
    let model_id = model(&h, ModelType::TimeDecay);
    let report_id = report(&h, model_id, ReportFilters::default());

    let first = h.aggregator.generate_report(&report_id).await.unwrap();
    let second = h.aggregator.generate_report(&report_id).await.unwrap();
    assert_eq!(first.results, second.results);
    assert_eq!(second.status, ReportStatus::Completed);
}

#[tokio::test]
async fn filters_restrict_conversions() {
    let h = harness(Arc::new(two_single_touch_conversions()));
    let model_id = model(&h, ModelType::Linear);
    let report_id = report(
        &h,
        model_id,
        ReportFilters {
            affiliate_ids: vec!["aff-2".into()],
            offer_ids: vec![],
        },
    );

    let report = h.aggregator.generate_report(&report_id).await.unwrap();
    assert_eq!(report.results.total_conversions, 1);
    assert!(!report.results.by_affiliate.contains_key("aff-1"));
}

#[tokio::test]
async fn lookback_excludes_stale_touchpoints() {
    let store = two_single_touch_conversions();
    store.insert_touchpoint(touchpoint("stale", "u1", "aff-old", "email", at(10, 12) - Duration::days(45)));
    let h = harness(Arc::new(store));
    let model_id = model(&h, ModelType::FirstClick);
    let report_id = report(&h, model_id, ReportFilters::default());

    let report = h.aggregator.generate_report(&report_id).await.unwrap();
    assert!(!report.results.by_affiliate.contains_key("aff-old"));
    assert!((report.results.by_affiliate["aff-1"].conversions - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn store_failure_marks_report_failed() {
    let store = Arc::new(FlakyStore {
        inner: two_single_touch_conversions(),
        fail: AtomicBool::new(true),
    });
    let h = harness(store.clone());
    let model_id = model(&h, ModelType::LastClick);
    let report_id = report(&h, model_id, ReportFilters::default());

    let err = h.aggregator.generate_report(&report_id).await.unwrap_err();
    assert!(matches!(err, AttributionError::Store(_)));

    let failed = h.reports.get_report(&report_id).unwrap();
    assert_eq!(failed.status, ReportStatus::Failed);
    assert_eq!(failed.results, ReportResults::default());
    assert!(failed.completed_at.is_none());

    // A retry after the store recovers processes everything from scratch.
    store.fail.store(false, Ordering::SeqCst);
    let retried = h.aggregator.generate_report(&report_id).await.unwrap();
    assert_eq!(retried.status, ReportStatus::Completed);
    assert_eq!(retried.results.total_conversions, 2);
}

#[tokio::test]
async fn missing_model_fails_the_run() {
    let h = harness(Arc::new(two_single_touch_conversions()));
    let report_id = report(&h, Uuid::new_v4(), ReportFilters::default());

    let err = h.aggregator.generate_report(&report_id).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        h.reports.get_report(&report_id).unwrap().status,
        ReportStatus::Failed
    );
}

#[tokio::test]
async fn missing_report_is_not_found() {
    let h = harness(Arc::new(InMemoryStore::new()));
    let err = h.aggregator.generate_report(&Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn cancelled_run_ends_failed() {
    let h = harness(Arc::new(two_single_touch_conversions()));
    let model_id = model(&h, ModelType::Linear);
    let report_id = report(&h, model_id, ReportFilters::default());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = h
        .aggregator
        .generate_report_with_cancel(&report_id, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AttributionError::Cancelled(id) if id == report_id));
    assert_eq!(
        h.reports.get_report(&report_id).unwrap().status,
        ReportStatus::Failed
    );
}

#[tokio::test]
async fn cancelling_an_in_flight_run_ends_failed() {
    let store = Arc::new(StalledStore {
        inner: two_single_touch_conversions(),
        entered: Notify::new(),
    });
    let h = harness(store.clone());
    let model_id = model(&h, ModelType::LastClick);
    let report_id = report(&h, model_id, ReportFilters::default());

    let cancel = CancellationToken::new();
    let run = h.aggregator.generate_report_with_cancel(&report_id, &cancel);
    let interrupt = async {
        store.entered.notified().await;
        assert_eq!(
            h.reports.get_report(&report_id).unwrap().status,
            ReportStatus::Processing
        );
        cancel.cancel();
    };

    let (result, ()) = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        tokio::join!(run, interrupt)
    })
    .await
    .expect("cancellation did not interrupt the run");

    let err = result.unwrap_err();
    assert!(matches!(err, AttributionError::Cancelled(id) if id == report_id));

    let failed = h.reports.get_report(&report_id).unwrap();
    assert_eq!(failed.status, ReportStatus::Failed);
    assert_eq!(failed.results, ReportResults::default());
    assert!(failed.completed_at.is_none());
    assert!(store.inner.events().is_empty());
}

#[tokio::test]
async fn custom_model_end_to_end() {
    let store = InMemoryStore::new();
    store.insert_touchpoint(touchpoint("tp-1", "u1", "aff-email", "email", at(10, 1)));
    store.insert_touchpoint(touchpoint("tp-2", "u1", "aff-paid", "paid", at(10, 2)));
    store.insert_touchpoint(touchpoint("tp-3", "u1", "aff-social", "social", at(10, 3)));
    store.insert_conversion(conversion("c-1", "u1", "aff-paid", at(10, 12)));
    let h = harness(Arc::new(store));

    let rules = serde_json::from_value(serde_json::json!([{
        "name": "Paid wins",
        "conditions": [{ "field": "channel", "operator": "EQUALS", "value": "paid" }],
        "actions": [{ "type": "ASSIGN_CREDIT", "parameters": { "credit": 1 } }]
    }]))
    .unwrap();
    let model_id = h
        .models
        .create_model(
            ACCOUNT,
            NewAttributionModel {
                name: "Paid wins".into(),
                model_type: Some(ModelType::Custom),
                rules: Some(rules),
                ..Default::default()
            },
        )
        .id;

    let events = h
        .aggregator
        .materializer()
        .calculate_attribution("c-1", &model_id)
        .await
        .unwrap();
    let credits: Vec<f64> = events.iter().map(|e| e.credit).collect();
    assert_eq!(credits, vec![0.0, 1.0, 0.0]);
    assert_eq!(events[1].position, 2);
}
