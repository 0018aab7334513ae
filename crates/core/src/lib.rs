pub mod config;
pub mod error;
pub mod lookup;
pub mod model;
pub mod report;
pub mod touchpoint;

pub use config::AppConfig;
pub use error::{AttributionError, AttributionResult};
pub use lookup::{FieldLookup, FieldValue};
