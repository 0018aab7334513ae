//! Attribution model configuration: model types, traffic-source settings,
//! and the condition/action rules used by custom models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

// ─── Model Type ─────────────────────────────────────────────────────────────

/// How credit is distributed across an attribution path.
///
/// Unrecognised wire values deserialize to `LastClick`, which is also the
/// allocator's fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum ModelType {
    FirstClick,
    #[default]
    LastClick,
    Linear,
    TimeDecay,
    PositionBased,
    Custom,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::FirstClick => "FIRST_CLICK",
            ModelType::LastClick => "LAST_CLICK",
            ModelType::Linear => "LINEAR",
            ModelType::TimeDecay => "TIME_DECAY",
            ModelType::PositionBased => "POSITION_BASED",
            ModelType::Custom => "CUSTOM",
        }
    }
}

impl From<String> for ModelType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "FIRST_CLICK" => ModelType::FirstClick,
            "LAST_CLICK" => ModelType::LastClick,
            "LINEAR" => ModelType::Linear,
            "TIME_DECAY" => ModelType::TimeDecay,
            "POSITION_BASED" => ModelType::PositionBased,
            "CUSTOM" => ModelType::Custom,
            other => {
                warn!(model_type = %other, "Unknown attribution model type, falling back to LAST_CLICK");
                ModelType::LastClick
            }
        }
    }
}

impl std::str::FromStr for ModelType {
    type Err = String;

    /// Strict parse for operator input (CLI flags); unlike deserialization
    /// this rejects unknown names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "FIRST_CLICK" | "LAST_CLICK" | "LINEAR" | "TIME_DECAY" | "POSITION_BASED"
            | "CUSTOM" => Ok(ModelType::from(normalized)),
            _ => Err(format!("unknown attribution model type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelStatus {
    #[default]
    Active,
    Inactive,
}

// ─── Settings ───────────────────────────────────────────────────────────────

/// Known traffic-source categories that a model can exclude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficSource {
    Direct,
    Organic,
    Paid,
    Social,
    Email,
    Referral,
}

impl TrafficSource {
    /// Maps a touchpoint channel to a known category. Channels outside the
    /// six categories are `None`.
    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel {
            "direct" => Some(TrafficSource::Direct),
            "organic" => Some(TrafficSource::Organic),
            "paid" => Some(TrafficSource::Paid),
            "social" => Some(TrafficSource::Social),
            "email" => Some(TrafficSource::Email),
            "referral" => Some(TrafficSource::Referral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_lookback_window_days")]
    pub lookback_window_days: u32,
    #[serde(default = "default_true")]
    pub include_direct_traffic: bool,
    #[serde(default = "default_true")]
    pub include_organic_traffic: bool,
    #[serde(default = "default_true")]
    pub include_paid_traffic: bool,
    #[serde(default = "default_true")]
    pub include_social_traffic: bool,
    #[serde(default = "default_true")]
    pub include_email_traffic: bool,
    #[serde(default = "default_true")]
    pub include_referral_traffic: bool,
    #[serde(default)]
    pub custom_parameters: Map<String, Value>,
}

fn default_lookback_window_days() -> u32 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self::with_lookback(default_lookback_window_days())
    }
}

impl ModelSettings {
    pub fn with_lookback(lookback_window_days: u32) -> Self {
        Self {
            lookback_window_days,
            include_direct_traffic: true,
            include_organic_traffic: true,
            include_paid_traffic: true,
            include_social_traffic: true,
            include_email_traffic: true,
            include_referral_traffic: true,
            custom_parameters: Map::new(),
        }
    }

    pub fn includes(&self, source: TrafficSource) -> bool {
        match source {
            TrafficSource::Direct => self.include_direct_traffic,
            TrafficSource::Organic => self.include_organic_traffic,
            TrafficSource::Paid => self.include_paid_traffic,
            TrafficSource::Social => self.include_social_traffic,
            TrafficSource::Email => self.include_email_traffic,
            TrafficSource::Referral => self.include_referral_traffic,
        }
    }

    /// Whether a touchpoint on `channel` survives the traffic-source filter.
    pub fn allows_channel(&self, channel: Option<&str>) -> bool {
        channel
            .and_then(TrafficSource::from_channel)
            .is_none_or(|source| self.includes(source))
    }
}

// ─── Rules ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    In,
    NotIn,
    /// Any operator name this engine does not implement. Never matches.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionLogic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionCondition {
    /// Dot path into the touchpoint, e.g. `device.type`.
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
    /// Joins the running result to the *next* condition.
    #[serde(default)]
    pub logic: ConditionLogic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    AssignCredit,
    ModifyCredit,
    Exclude,
    Include,
    Custom,
    /// Unrecognised action names leave credit unchanged.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AttributionAction {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            parameters: Map::new(),
            enabled: true,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    /// Numeric parameter; missing or non-numeric values are `None`.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(Value::as_f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<AttributionCondition>,
    #[serde(default)]
    pub actions: Vec<AttributionAction>,
    /// Stored for display only. Rules execute in list order.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// ─── Model ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionModel {
    pub id: Uuid,
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub model_type: ModelType,
    #[serde(default)]
    pub settings: ModelSettings,
    #[serde(default)]
    pub rules: Vec<AttributionRule>,
    #[serde(default)]
    pub status: ModelStatus,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a model; omitted fields take registry defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAttributionModel {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub model_type: Option<ModelType>,
    #[serde(default)]
    pub settings: Option<ModelSettings>,
    #[serde(default)]
    pub rules: Option<Vec<AttributionRule>>,
    #[serde(default)]
    pub status: Option<ModelStatus>,
    #[serde(default)]
    pub is_default: Option<bool>,
}

/// Patch applied by `update_model`; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub model_type: Option<ModelType>,
    pub settings: Option<ModelSettings>,
    pub rules: Option<Vec<AttributionRule>>,
    pub status: Option<ModelStatus>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelQuery {
    pub status: Option<ModelStatus>,
    #[serde(rename = "type")]
    pub model_type: Option<ModelType>,
}

impl ModelQuery {
    pub fn matches(&self, model: &AttributionModel) -> bool {
        self.status.is_none_or(|s| s == model.status)
            && self.model_type.is_none_or(|t| t == model.model_type)
    }
}
