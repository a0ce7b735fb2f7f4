//! Request and response bodies for the order simulation endpoints.

use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::status::{Difficulty, LifecycleStatus};

/// One line of an order as handed over by the order collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub name: String,
    /// Human label such as `"15-20 min"`.
    pub cook_time_label: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub quantity: u32,
}

/// Who the order belongs to. `user_id` addresses every notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    pub user_id: CompactString,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// `POST /api/v1/orders/{order_id}/simulation` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSimulationRequest {
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub customer: CustomerDetails,
}

/// Response to a successfully started simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationAccepted {
    pub order_id: Uuid,
    /// Fresh for every start, including restarts of a finished order.
    pub run_id: Uuid,
    pub estimated_cook_minutes: u32,
    pub estimated_delivery_minutes: u32,
}

/// One planned transition as seen from outside the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionSnapshot {
    pub status: LifecycleStatus,
    /// Minutes after plan start.
    pub offset_minutes: f64,
    pub fired: bool,
}

/// Read-only view of an active lifecycle plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSnapshot {
    pub order_id: Uuid,
    pub run_id: Uuid,
    pub user_id: CompactString,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub current_status: Option<LifecycleStatus>,
    pub cancelled: bool,
    pub transitions: Vec<TransitionSnapshot>,
}
