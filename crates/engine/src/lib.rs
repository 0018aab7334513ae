//! Multi-touch attribution: touchpoint filtering, credit allocation across
//! attribution models, custom rule evaluation, attribution event
//! materialization, and report aggregation.

pub mod aggregator;
pub mod credit;
pub mod filter;
pub mod materializer;
pub mod registry;
pub mod rules;
pub mod store;

pub use aggregator::ReportAggregator;
pub use credit::calculate_credits;
pub use filter::TouchpointFilter;
pub use materializer::EventMaterializer;
pub use registry::{ModelRegistry, ReportRegistry};
pub use rules::{apply_custom_rules, evaluate_condition, evaluate_conditions};
pub use store::{AttributionStore, InMemoryStore, StoreSnapshot};
