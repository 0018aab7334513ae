//! Model and report registries: account-scoped CRUD, default model seeding,
//! and the report status lifecycle used by the aggregator.

use attribution_core::config::AttributionConfig;
use attribution_core::model::{
    AttributionModel, ModelQuery, ModelSettings, ModelStatus, ModelType, ModelUpdate,
    NewAttributionModel,
};
use attribution_core::report::{
    AttributionReport, NewAttributionReport, ReportQuery, ReportResults, ReportStatus,
    ReportUpdate,
};
use attribution_core::{AttributionError, AttributionResult};
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

// ─── Models ─────────────────────────────────────────────────────────────────

pub struct ModelRegistry {
    models: DashMap<Uuid, AttributionModel>,
    default_lookback_days: u32,
}

impl ModelRegistry {
    pub fn new(config: &AttributionConfig) -> Self {
        Self {
            models: DashMap::new(),
            default_lookback_days: config.default_lookback_days,
        }
    }

    pub fn create_model(&self, account_id: &str, input: NewAttributionModel) -> AttributionModel {
        let now = Utc::now();
        let model = AttributionModel {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            name: input.name,
            description: input.description.unwrap_or_default(),
            model_type: input.model_type.unwrap_or_default(),
            settings: input
                .settings
                .unwrap_or_else(|| ModelSettings::with_lookback(self.default_lookback_days)),
            rules: input.rules.unwrap_or_default(),
            status: input.status.unwrap_or_default(),
            is_default: input.is_default.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };
        info!(
            model_id = %model.id,
            account_id = %account_id,
            model_type = model.model_type.as_str(),
            "Created attribution model"
        );
        self.models.insert(model.id, model.clone());
        model
    }

    /// Account-scoped lookup.
    pub fn find_model(&self, account_id: &str, id: &Uuid) -> Option<AttributionModel> {
        self.models
            .get(id)
            .filter(|m| m.account_id == account_id)
            .map(|m| m.clone())
    }

    /// Unscoped lookup used by attribution runs.
    pub fn get_model(&self, id: &Uuid) -> AttributionResult<AttributionModel> {
        self.models
            .get(id)
            .map(|m| m.clone())
            .ok_or_else(|| AttributionError::not_found("Attribution model", id))
    }

    pub fn update_model(
        &self,
        account_id: &str,
        id: &Uuid,
        update: ModelUpdate,
    ) -> AttributionResult<AttributionModel> {
        let mut entry = self
            .models
            .get_mut(id)
            .filter(|m| m.account_id == account_id)
            .ok_or_else(|| AttributionError::not_found("Attribution model", id))?;

        if let Some(name) = update.name {
            entry.name = name;
        }
        if let Some(description) = update.description {
            entry.description = description;
        }
        if let Some(model_type) = update.model_type {
            entry.model_type = model_type;
        }
        if let Some(settings) = update.settings {
            entry.settings = settings;
        }
        if let Some(rules) = update.rules {
            entry.rules = rules;
        }
        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(is_default) = update.is_default {
            entry.is_default = is_default;
        }
        entry.updated_at = Utc::now();

        info!(model_id = %id, "Updated attribution model");
        Ok(entry.clone())
    }

    pub fn delete_model(&self, account_id: &str, id: &Uuid) -> AttributionResult<()> {
        self.models
            .remove_if(id, |_, m| m.account_id == account_id)
            .ok_or_else(|| AttributionError::not_found("Attribution model", id))?;
        info!(model_id = %id, "Deleted attribution model");
        Ok(())
    }

    /// Newest first.
    pub fn list_models(&self, account_id: &str, query: &ModelQuery) -> Vec<AttributionModel> {
        let mut models: Vec<_> = self
            .models
            .iter()
            .filter(|m| m.account_id == account_id && query.matches(m))
            .map(|m| m.clone())
            .collect();
        models.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        models
    }

    /// Seeds the four built-in models for an account.
    pub fn create_default_models(&self, account_id: &str) -> Vec<AttributionModel> {
        let defaults = [
            (
                "Last Click",
                "Assigns 100% of the credit to the last touchpoint before conversion",
                ModelType::LastClick,
            ),
            (
                "First Click",
                "Assigns 100% of the credit to the first touchpoint in the path",
                ModelType::FirstClick,
            ),
            (
                "Linear",
                "Distributes credit equally across every touchpoint",
                ModelType::Linear,
            ),
            (
                "Time Decay",
                "Gives more credit to touchpoints closer to the conversion",
                ModelType::TimeDecay,
            ),
        ];

        let created: Vec<_> = defaults
            .into_iter()
            .map(|(name, description, model_type)| {
                self.create_model(
                    account_id,
                    NewAttributionModel {
                        name: name.to_string(),
                        description: Some(description.to_string()),
                        model_type: Some(model_type),
                        settings: None,
                        rules: None,
                        status: Some(ModelStatus::Active),
                        is_default: Some(true),
                    },
                )
            })
            .collect();

        info!(account_id = %account_id, count = created.len(), "Seeded default attribution models");
        created
    }
}

// ─── Reports ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ReportRegistry {
    reports: DashMap<Uuid, AttributionReport>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_report(&self, account_id: &str, input: NewAttributionReport) -> AttributionReport {
        let now = Utc::now();
        let report = AttributionReport {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            name: input.name,
            description: input.description.unwrap_or_default(),
            model_id: input.model_id,
            date_range: input.date_range,
            filters: input.filters,
            metrics: input.metrics,
            dimensions: input.dimensions,
            status: ReportStatus::Pending,
            results: ReportResults::default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        info!(report_id = %report.id, account_id = %account_id, "Created attribution report");
        self.reports.insert(report.id, report.clone());
        report
    }

    pub fn find_report(&self, account_id: &str, id: &Uuid) -> Option<AttributionReport> {
        self.reports
            .get(id)
            .filter(|r| r.account_id == account_id)
            .map(|r| r.clone())
    }

    pub fn get_report(&self, id: &Uuid) -> AttributionResult<AttributionReport> {
        self.reports
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| AttributionError::not_found("Attribution report", id))
    }

    pub fn update_report(
        &self,
        account_id: &str,
        id: &Uuid,
        update: ReportUpdate,
    ) -> AttributionResult<AttributionReport> {
        let mut entry = self
            .reports
            .get_mut(id)
            .filter(|r| r.account_id == account_id)
            .ok_or_else(|| AttributionError::not_found("Attribution report", id))?;

        if let Some(name) = update.name {
            entry.name = name;
        }
        if let Some(description) = update.description {
            entry.description = description;
        }
        if let Some(model_id) = update.model_id {
            entry.model_id = model_id;
        }
        if let Some(date_range) = update.date_range {
            entry.date_range = date_range;
        }
        if let Some(filters) = update.filters {
            entry.filters = filters;
        }
        if let Some(metrics) = update.metrics {
            entry.metrics = metrics;
        }
        if let Some(dimensions) = update.dimensions {
            entry.dimensions = dimensions;
        }
        entry.updated_at = Utc::now();

        info!(report_id = %id, "Updated attribution report");
        Ok(entry.clone())
    }

    pub fn delete_report(&self, account_id: &str, id: &Uuid) -> AttributionResult<()> {
        self.reports
            .remove_if(id, |_, r| r.account_id == account_id)
            .ok_or_else(|| AttributionError::not_found("Attribution report", id))?;
        info!(report_id = %id, "Deleted attribution report");
        Ok(())
    }

    /// Newest first.
    pub fn list_reports(&self, account_id: &str, query: &ReportQuery) -> Vec<AttributionReport> {
        let mut reports: Vec<_> = self
            .reports
            .iter()
            .filter(|r| r.account_id == account_id && query.matches(r))
            .map(|r| r.clone())
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        reports
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    pub fn mark_processing(&self, id: &Uuid) -> AttributionResult<AttributionReport> {
        self.transition(id, |report| {
            report.status = ReportStatus::Processing;
        })
    }

    pub fn mark_completed(
        &self,
        id: &Uuid,
        results: ReportResults,
    ) -> AttributionResult<AttributionReport> {
        self.transition(id, |report| {
            report.status = ReportStatus::Completed;
            report.results = results;
            report.completed_at = Some(Utc::now());
        })
    }

    /// Results are left as they were.
    pub fn mark_failed(&self, id: &Uuid) -> AttributionResult<AttributionReport> {
        self.transition(id, |report| {
            report.status = ReportStatus::Failed;
        })
    }

    fn transition(
        &self,
        id: &Uuid,
        apply: impl FnOnce(&mut AttributionReport),
    ) -> AttributionResult<AttributionReport> {
        let mut entry = self
            .reports
            .get_mut(id)
            .ok_or_else(|| AttributionError::not_found("Attribution report", id))?;
        apply(&mut *entry);
        entry.updated_at = Utc::now();
        info!(report_id = %id, status = ?entry.status, "Report status changed");
        Ok(entry.clone())
    }
}
