//! Attribution Express: multi-touch conversion attribution and reporting.
//!
//! Loads a store snapshot, attributes conversions under the requested model,
//! and prints attribution events or a full report as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use attribution_core::config::{AppConfig, LogFormat};
use attribution_core::model::{AttributionModel, AttributionRule, ModelType, NewAttributionModel};
use attribution_core::report::{NewAttributionReport, ReportFilters};
use attribution_core::touchpoint::DateRange;
use attribution_engine::{
    AttributionStore, InMemoryStore, ModelRegistry, ReportAggregator, ReportRegistry,
    StoreSnapshot,
};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "attribution-express")]
#[command(about = "Multi-touch conversion attribution and reporting")]
#[command(version)]
struct Cli {
    /// Lookback window for models created by this run, in days (overrides config)
    #[arg(long, env = "ATTRIBUTION_EXPRESS__ATTRIBUTION__DEFAULT_LOOKBACK_DAYS")]
    lookback_days: Option<u32>,

    /// Human-readable logs instead of JSON (overrides config)
    #[arg(long, default_value_t = false)]
    pretty_logs: bool,

    /// Account that owns the models and reports created by this run
    #[arg(long, default_value = "local")]
    account: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attribute a single conversion and print its attribution events
    Attribute {
        /// Store snapshot (JSON with touchpoints, conversions, offers)
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        conversion: String,
        #[arg(long, default_value = "LAST_CLICK")]
        model: ModelType,
        /// Rules for CUSTOM models (JSON array)
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Generate an attribution report over an inclusive date range
    Report {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = "LAST_CLICK")]
        model: ModelType,
        #[arg(long)]
        rules: Option<PathBuf>,
        /// First day of the range (YYYY-MM-DD, UTC)
        #[arg(long)]
        start: NaiveDate,
        /// Last day of the range (YYYY-MM-DD, UTC)
        #[arg(long)]
        end: NaiveDate,
        /// Only include conversions from these affiliates
        #[arg(long)]
        affiliate: Vec<String>,
        /// Only include conversions for these offers
        #[arg(long)]
        offer: Vec<String>,
    },
    /// Print the default models seeded for a new account
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, config_err) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Apply CLI overrides
    if let Some(days) = cli.lookback_days {
        config.attribution.default_lookback_days = days;
    }
    if cli.pretty_logs {
        config.logging.format = LogFormat::Pretty;
    }

    init_tracing(&config);
    if let Some(e) = config_err {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    info!(
        node_id = %config.node_id,
        lookback_days = config.attribution.default_lookback_days,
        "Attribution Express starting"
    );

    let models = Arc::new(ModelRegistry::new(&config.attribution));
    let reports = Arc::new(ReportRegistry::new());

    match cli.command {
        Command::Models => {
            let seeded = models.create_default_models(&cli.account);
            print_json(&seeded)?;
        }
        Command::Attribute {
            data,
            conversion,
            model,
            rules,
        } => {
            let store: Arc<dyn AttributionStore> = Arc::new(load_store(&data)?);
            let model = create_model(&models, &cli.account, model, rules.as_deref())?;
            let aggregator = ReportAggregator::new(store, models, reports, &config.report);
            let events = aggregator
                .materializer()
                .calculate_attribution(&conversion, &model.id)
                .await?;
            print_json(&events)?;
        }
        Command::Report {
            data,
            model,
            rules,
            start,
            end,
            affiliate,
            offer,
        } => {
            let store: Arc<dyn AttributionStore> = Arc::new(load_store(&data)?);
            let model = create_model(&models, &cli.account, model, rules.as_deref())?;
            let report = reports.create_report(
                &cli.account,
                NewAttributionReport {
                    name: format!("{} {start}..{end}", model.name),
                    description: None,
                    model_id: model.id,
                    date_range: day_range(start, end),
                    filters: ReportFilters {
                        affiliate_ids: affiliate,
                        offer_ids: offer,
                    },
                    metrics: vec![],
                    dimensions: vec![],
                },
            );

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling report");
                    on_signal.cancel();
                }
            });

            let aggregator = ReportAggregator::new(store, models, reports, &config.report);
            let report = aggregator
                .generate_report_with_cancel(&report.id, &cancel)
                .await?;
            print_json(&report)?;
        }
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.filter.clone().into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn load_store(path: &Path) -> anyhow::Result<InMemoryStore> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading store snapshot {}", path.display()))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("parsing store snapshot {}", path.display()))?;
    Ok(InMemoryStore::from_snapshot(snapshot))
}

fn create_model(
    models: &ModelRegistry,
    account_id: &str,
    model_type: ModelType,
    rules_path: Option<&Path>,
) -> anyhow::Result<AttributionModel> {
    let rules = match rules_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading rules {}", path.display()))?;
            let rules: Vec<AttributionRule> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing rules {}", path.display()))?;
            Some(rules)
        }
        None => None,
    };
    if model_type == ModelType::Custom && rules.is_none() {
        warn!("CUSTOM model without --rules assigns no credit");
    }

    Ok(models.create_model(
        account_id,
        NewAttributionModel {
            name: model_type.as_str().to_string(),
            model_type: Some(model_type),
            rules,
            ..Default::default()
        },
    ))
}

/// `[start 00:00:00, end 23:59:59.999]` in UTC.
fn day_range(start: NaiveDate, end: NaiveDate) -> DateRange {
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or_default();
    DateRange::new(
        Utc.from_utc_datetime(&start.and_time(NaiveTime::default())),
        Utc.from_utc_datetime(&end.and_time(end_of_day)),
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
