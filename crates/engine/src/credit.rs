//! Credit allocation: distributes one conversion across its attribution
//! path according to the model type.

use attribution_core::lookup::FieldLookup;
use attribution_core::model::{AttributionModel, ModelType};

use crate::rules::apply_custom_rules;

/// Geometric decay applied per step back from the most recent touchpoint.
pub const TIME_DECAY_FACTOR: f64 = 0.5;

/// Share given to each of the first and last touches by POSITION_BASED.
pub const POSITION_ENDPOINT_SHARE: f64 = 0.4;

/// Share split across the middle touches by POSITION_BASED.
pub const POSITION_MIDDLE_SHARE: f64 = 0.2;

/// One credit per path element, in path order. Empty for an empty path.
pub fn calculate_credits<T: FieldLookup>(path: &[T], model: &AttributionModel) -> Vec<f64> {
    let n = path.len();
    if n == 0 {
        return Vec::new();
    }

    match model.model_type {
        ModelType::FirstClick => first_click(n),
        ModelType::LastClick => last_click(n),
        ModelType::Linear => linear(n),
        ModelType::TimeDecay => time_decay(n),
        ModelType::PositionBased => position_based(n),
        ModelType::Custom => apply_custom_rules(path, &model.rules),
    }
}

fn first_click(n: usize) -> Vec<f64> {
    let mut credits = vec![0.0; n];
    credits[0] = 1.0;
    credits
}

fn last_click(n: usize) -> Vec<f64> {
    let mut credits = vec![0.0; n];
    credits[n - 1] = 1.0;
    credits
}

fn linear(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

fn time_decay(n: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..n)
        .map(|i| TIME_DECAY_FACTOR.powi((n - 1 - i) as i32))
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// 40/20/40. A two-touch path gets 0.4 each and does not sum to 1.
fn position_based(n: usize) -> Vec<f64> {
    match n {
        1 => vec![1.0],
        2 => vec![POSITION_ENDPOINT_SHARE, POSITION_ENDPOINT_SHARE],
        _ => {
            let middle = POSITION_MIDDLE_SHARE / (n - 2) as f64;
            let mut credits = vec![middle; n];
            credits[0] = POSITION_ENDPOINT_SHARE;
            credits[n - 1] = POSITION_ENDPOINT_SHARE;
            credits
        }
    }
}
