//! Order lifecycle statuses and kitchen difficulty tiers.

use serde::{Deserialize, Serialize};

/// A step in the simulated life of an order.
///
/// Variants are declared in lifecycle order, so the derived `Ord` matches
/// the order in which statuses are emitted. `Cancelled` sorts last but can
/// be reached from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    OrderConfirmed,
    Preparing,
    ReadyForPickup,
    DriverAssigned,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl LifecycleStatus {
    /// The statuses every uncancelled order passes through, in order.
    pub const HAPPY_PATH: [LifecycleStatus; 6] = [
        LifecycleStatus::OrderConfirmed,
        LifecycleStatus::Preparing,
        LifecycleStatus::ReadyForPickup,
        LifecycleStatus::DriverAssigned,
        LifecycleStatus::OutForDelivery,
        LifecycleStatus::Delivered,
    ];

    /// Returns `true` if no further transition can follow this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleStatus::Delivered | LifecycleStatus::Cancelled)
    }

    /// Stable snake_case name, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::OrderConfirmed => "order_confirmed",
            LifecycleStatus::Preparing => "preparing",
            LifecycleStatus::ReadyForPickup => "ready_for_pickup",
            LifecycleStatus::DriverAssigned => "driver_assigned",
            LifecycleStatus::OutForDelivery => "out_for_delivery",
            LifecycleStatus::Delivered => "delivered",
            LifecycleStatus::Cancelled => "cancelled",
        }
    }

    /// Notification title shown to the customer.
    pub fn title(self) -> &'static str {
        match self {
            LifecycleStatus::OrderConfirmed => "Order confirmed",
            LifecycleStatus::Preparing => "Preparing your food",
            LifecycleStatus::ReadyForPickup => "Ready for pickup",
            LifecycleStatus::DriverAssigned => "Courier assigned",
            LifecycleStatus::OutForDelivery => "Out for delivery",
            LifecycleStatus::Delivered => "Delivered",
            LifecycleStatus::Cancelled => "Order cancelled",
        }
    }

    /// Icon hint for UIs rendering the status timeline.
    pub fn icon(self) -> &'static str {
        match self {
            LifecycleStatus::OrderConfirmed => "check-circle",
            LifecycleStatus::Preparing => "chef-hat",
            LifecycleStatus::ReadyForPickup => "package",
            LifecycleStatus::DriverAssigned => "user-check",
            LifecycleStatus::OutForDelivery => "truck",
            LifecycleStatus::Delivered => "home",
            LifecycleStatus::Cancelled => "x-circle",
        }
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How demanding a dish is for the kitchen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Cook-time multiplier applied to the dish's base estimate.
    pub fn multiplier(self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Medium => 1.2,
            Difficulty::Hard => 1.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_sorted_and_ends_terminal() {
        let mut sorted = LifecycleStatus::HAPPY_PATH;
        sorted.sort();
        assert_eq!(sorted, LifecycleStatus::HAPPY_PATH);
        assert!(LifecycleStatus::HAPPY_PATH[5].is_terminal());
        assert!(
            LifecycleStatus::HAPPY_PATH[..5]
                .iter()
                .all(|s| !s.is_terminal())
        );
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&LifecycleStatus::ReadyForPickup).unwrap();
        assert_eq!(json, "\"ready_for_pickup\"");
        assert_eq!(LifecycleStatus::OutForDelivery.to_string(), "out_for_delivery");
    }

    #[test]
    fn test_difficulty_multipliers() {
        assert_eq!(Difficulty::Easy.multiplier(), 1.0);
        assert_eq!(Difficulty::Medium.multiplier(), 1.2);
        assert_eq!(Difficulty::Hard.multiplier(), 1.5);
        let parsed: Difficulty = serde_json::from_str("\"hard\"").unwrap();
        assert_eq!(parsed, Difficulty::Hard);
    }
}
