use thiserror::Error;
use uuid::Uuid;

pub type AttributionResult<T> = Result<T, AttributionError>;

#[derive(Error, Debug)]
pub enum AttributionError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Report generation cancelled: {0}")]
    Cancelled(Uuid),
}

impl AttributionError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
