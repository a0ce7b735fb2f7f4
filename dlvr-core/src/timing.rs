//! Cook-time and delivery-time estimates.
//!
//! Dishes are prepared in parallel, so the slowest dish dominates. Kitchen
//! backlog adds a random queue delay and every dish adds a little overhead
//! proportional to its own prep time:
//!
//! ```text
//! item_time   = base * difficulty_multiplier * quantity
//! cook_time   = ceil(max(item_time) + jitter + 0.1 * sum(item_time))
//! jitter      = whole minutes, uniform over [5, 15)
//! delivery    = uniform[15, 45)
//! ```

use std::ops::Range;

use dlvr_sdk::objects::{Difficulty, OrderItem};
use rand::Rng;

/// Kitchen backlog added to every estimate, in whole minutes.
pub const QUEUE_JITTER_MINUTES: Range<u32> = 5..15;

/// Courier transit time, in minutes.
pub const DELIVERY_MINUTES: Range<f64> = 15.0..45.0;

/// Weight of the summed item times in the estimate.
pub const COMPLEXITY_WEIGHT: f64 = 0.1;

/// Base cook time used when an item label carries no number.
pub const DEFAULT_BASE_COOK_MINUTES: f64 = 15.0;

/// A dish as seen by the timing model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedItem {
    pub base_cook_minutes: f64,
    pub difficulty: Difficulty,
    pub quantity: u32,
}

impl TimedItem {
    pub fn minutes(&self) -> f64 {
        self.base_cook_minutes * self.difficulty.multiplier() * f64::from(self.quantity)
    }
}

impl From<&OrderItem> for TimedItem {
    fn from(item: &OrderItem) -> Self {
        Self {
            base_cook_minutes: parse_cook_time_label(&item.cook_time_label),
            difficulty: item.difficulty,
            quantity: item.quantity,
        }
    }
}

/// Extract a base cook time from a label such as `"15-20 min"`.
///
/// The largest number in the label wins, so ranges resolve to their upper
/// bound.
pub fn parse_cook_time_label(label: &str) -> f64 {
    label
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter_map(|part| part.parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .fold(None, |max: Option<f64>, n| Some(max.map_or(n, |m| m.max(n))))
        .unwrap_or(DEFAULT_BASE_COOK_MINUTES)
}

/// Cook time for `items` given an explicit queue jitter.
pub fn cook_time_with_jitter(items: &[TimedItem], jitter: f64) -> u32 {
    let (max_item, total_complexity) = items
        .iter()
        .map(TimedItem::minutes)
        .fold((0.0_f64, 0.0_f64), |(max, sum), t| (max.max(t), sum + t));

    let minutes = (max_item + jitter + COMPLEXITY_WEIGHT * total_complexity).ceil();
    // Saturating float-to-int cast; negative inputs clamp to zero.
    minutes as u32
}

/// Estimate the cook time of `items`, rolling a fresh queue jitter.
pub fn estimate_cook_time<R: Rng + ?Sized>(items: &[TimedItem], rng: &mut R) -> u32 {
    let jitter = rng.random_range(QUEUE_JITTER_MINUTES);
    cook_time_with_jitter(items, f64::from(jitter))
}

/// Roll the transit time for a newly assigned courier.
pub fn roll_delivery_time<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random_range(DELIVERY_MINUTES)
}
