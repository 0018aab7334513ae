//! Read-only inputs from the click/conversion store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::lookup::{walk, FieldLookup, FieldValue};

/// Inclusive time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts <= self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}

impl DeviceInfo {
    fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(t) = &self.device_type {
            map.insert("type".into(), Value::String(t.clone()));
        }
        if let Some(os) = &self.os {
            map.insert("os".into(), Value::String(os.clone()));
        }
        if let Some(browser) = &self.browser {
            map.insert("browser".into(), Value::String(browser.clone()));
        }
        Value::Object(map)
    }
}

/// A recorded click attributable to an affiliate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Touchpoint {
    pub id: String,
    pub user_id: String,
    pub affiliate_id: String,
    pub offer_id: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub device: Option<DeviceInfo>,
    #[serde(default)]
    pub country: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Arbitrary tracking payload (UTM params, sub ids, landing page, ...).
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Touchpoint {
    pub fn device_type(&self) -> Option<&str> {
        self.device.as_ref().and_then(|d| d.device_type.as_deref())
    }
}

impl FieldLookup for Touchpoint {
    fn lookup(&self, path: &str) -> FieldValue {
        let mut segments = path.split('.');
        let Some(head) = segments.next() else {
            return FieldValue::Absent;
        };

        let root = match head {
            "id" => Value::String(self.id.clone()),
            "user_id" => Value::String(self.user_id.clone()),
            "affiliate_id" => Value::String(self.affiliate_id.clone()),
            "offer_id" => Value::String(self.offer_id.clone()),
            "timestamp" => Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            "channel" => match &self.channel {
                Some(c) => Value::String(c.clone()),
                None => return FieldValue::Absent,
            },
            "country" => match &self.country {
                Some(c) => Value::String(c.clone()),
                None => return FieldValue::Absent,
            },
            "device" => match &self.device {
                Some(d) => d.to_value(),
                None => return FieldValue::Absent,
            },
            other => match self.attributes.get(other) {
                Some(v) => v.clone(),
                None => return FieldValue::Absent,
            },
        };

        walk(&root, segments)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub payout: Option<f64>,
}

/// A completed conversion (sale, lead, install).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub id: String,
    pub user_id: String,
    pub offer_id: String,
    pub affiliate_id: String,
    /// Originating click, when the tracker recorded one.
    #[serde(default)]
    pub touchpoint_id: Option<String>,
    pub order_value: f64,
    #[serde(default)]
    pub commission_amount: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Conversion {
    /// Divisor for event weights. Absent, zero, or NaN commissions count as 1.
    pub fn commission_divisor(&self) -> f64 {
        match self.commission_amount {
            Some(c) if c != 0.0 && !c.is_nan() => c,
            _ => 1.0,
        }
    }
}

/// Conversion joined with its originating click and offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionDetail {
    pub conversion: Conversion,
    pub touchpoint: Option<Touchpoint>,
    pub offer: Option<Offer>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn touchpoint() -> Touchpoint {
        let mut attributes = Map::new();
        attributes.insert("utm".into(), json!({ "source": "newsletter", "campaign": "spring" }));
        attributes.insert("score".into(), json!(42));
        Touchpoint {
            id: "tp-1".into(),
            user_id: "user-1".into(),
            affiliate_id: "aff-1".into(),
            offer_id: "offer-1".into(),
            channel: Some("paid".into()),
            device: Some(DeviceInfo {
                device_type: Some("mobile".into()),
                os: Some("ios".into()),
                browser: None,
            }),
            country: None,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            attributes,
        }
    }

    #[test]
    fn test_typed_field_lookup() {
        let tp = touchpoint();
        assert_eq!(tp.lookup("channel"), FieldValue::Present(json!("paid")));
        assert_eq!(tp.lookup("affiliate_id"), FieldValue::Present(json!("aff-1")));
        assert_eq!(tp.lookup("device.type"), FieldValue::Present(json!("mobile")));
        assert_eq!(
            tp.lookup("timestamp"),
            FieldValue::Present(json!("2024-03-01T12:00:00.000Z"))
        );
    }

    #[test]
    fn test_missing_optional_fields_are_absent() {
        let tp = touchpoint();
        assert!(tp.lookup("country").is_absent());
        assert!(tp.lookup("device.browser").is_absent());
        assert!(tp.lookup("channel.name").is_absent());
    }

    #[test]
    fn test_attribute_lookup() {
        let tp = touchpoint();
        assert_eq!(tp.lookup("utm.campaign"), FieldValue::Present(json!("spring")));
        assert_eq!(tp.lookup("score"), FieldValue::Present(json!(42)));
        assert!(tp.lookup("utm.medium").is_absent());
        assert!(tp.lookup("unknown").is_absent());
    }

    #[test]
    fn test_commission_divisor() {
        let mut conv = Conversion {
            id: "c-1".into(),
            user_id: "user-1".into(),
            offer_id: "offer-1".into(),
            affiliate_id: "aff-1".into(),
            touchpoint_id: None,
            order_value: 100.0,
            commission_amount: None,
            timestamp: Utc::now(),
        };
        assert_eq!(conv.commission_divisor(), 1.0);
        conv.commission_amount = Some(0.0);
        assert_eq!(conv.commission_divisor(), 1.0);
        conv.commission_amount = Some(f64::NAN);
        assert_eq!(conv.commission_divisor(), 1.0);
        conv.commission_amount = Some(12.5);
        assert_eq!(conv.commission_divisor(), 12.5);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let range = DateRange::new(start, end);
        assert!(range.contains(&start));
        assert!(range.contains(&end));
        assert!(!range.contains(&(end + chrono::Duration::seconds(1))));
    }
}
