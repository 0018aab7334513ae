//! Attribution outputs: per-touchpoint events and aggregated reports.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ModelType;
use crate::touchpoint::{Conversion, DateRange, Touchpoint};

/// One touchpoint's share of one conversion. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionEvent {
    pub id: Uuid,
    pub conversion_id: String,
    pub touchpoint_id: String,
    pub affiliate_id: String,
    pub offer_id: String,
    pub credit: f64,
    /// `credit / commission`, with a missing or zero commission counted as 1.
    pub weight: f64,
    /// 1-based index in the time-ordered attribution path.
    pub position: usize,
    /// Timestamp of the touchpoint, not of the conversion.
    pub timestamp: DateTime<Utc>,
    pub model_type: ModelType,
    pub touchpoint: Touchpoint,
    pub order_value: f64,
    pub commission_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Restricts which conversions a report run considers. Empty lists do not
/// restrict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default)]
    pub affiliate_ids: Vec<String>,
    #[serde(default)]
    pub offer_ids: Vec<String>,
}

impl ReportFilters {
    pub fn matches(&self, conversion: &Conversion) -> bool {
        (self.affiliate_ids.is_empty() || self.affiliate_ids.contains(&conversion.affiliate_id))
            && (self.offer_ids.is_empty() || self.offer_ids.contains(&conversion.offer_id))
    }

    pub fn is_empty(&self) -> bool {
        self.affiliate_ids.is_empty() && self.offer_ids.is_empty()
    }
}

/// Credit-weighted totals for one breakdown key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakdownMetrics {
    pub conversions: f64,
    pub revenue: f64,
    pub commission: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub date: NaiveDate,
    pub conversions: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPosition {
    pub position: usize,
    /// Channel of the first event seen at this position.
    pub channel: String,
    pub credit: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportResults {
    pub total_conversions: u64,
    pub total_revenue: f64,
    pub total_commissions: f64,
    pub by_affiliate: BTreeMap<String, BreakdownMetrics>,
    pub by_offer: BTreeMap<String, BreakdownMetrics>,
    pub by_channel: BTreeMap<String, BreakdownMetrics>,
    pub by_device: BTreeMap<String, BreakdownMetrics>,
    pub by_country: BTreeMap<String, BreakdownMetrics>,
    pub timeline: Vec<TimelinePoint>,
    pub attribution_paths: Vec<PathPosition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionReport {
    pub id: Uuid,
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model_id: Uuid,
    pub date_range: DateRange,
    #[serde(default)]
    pub filters: ReportFilters,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub status: ReportStatus,
    #[serde(default)]
    pub results: ReportResults,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttributionReport {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub model_id: Uuid,
    pub date_range: DateRange,
    #[serde(default)]
    pub filters: ReportFilters,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
}

/// Patch applied by `update_report`; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub model_id: Option<Uuid>,
    pub date_range: Option<DateRange>,
    pub filters: Option<ReportFilters>,
    pub metrics: Option<Vec<String>>,
    pub dimensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
    pub model_id: Option<Uuid>,
}

impl ReportQuery {
    pub fn matches(&self, report: &AttributionReport) -> bool {
        self.status.is_none_or(|s| s == report.status)
            && self.model_id.is_none_or(|m| m == report.model_id)
    }
}
