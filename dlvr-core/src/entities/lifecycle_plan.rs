//! The schedule of status transitions for one simulated order.
//!
//! Offsets are in simulated minutes from the moment the plan started:
//!
//! | status             | offset                                  |
//! |--------------------|-----------------------------------------|
//! | `order_confirmed`  | 0                                       |
//! | `preparing`        | uniform[2, 5)                           |
//! | `ready_for_pickup` | cook                                    |
//! | `driver_assigned`  | cook + uniform[2, 3)                    |
//! | `out_for_delivery` | driver_assigned + uniform[1, 2)         |
//! | `delivered`        | cook + delivery                         |
//!
//! Offsets are clamped to be non-decreasing, so a very short cook time can
//! never make a later status fire before an earlier one.

use std::ops::Range;

use compact_str::CompactString;
use dlvr_sdk::objects::{CustomerDetails, LifecycleStatus, PlanSnapshot, TransitionSnapshot};
use itertools::Itertools;
use rand::Rng;
use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use smallvec::SmallVec;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::events::{CourierDetails, StatusEvent, StatusPayload};

const PREPARING_AFTER: Range<f64> = 2.0..5.0;
const DRIVER_ASSIGNED_AFTER_COOK: Range<f64> = 2.0..3.0;
const PICKUP_AFTER_ASSIGNMENT: Range<f64> = 1.0..2.0;

const CHEFS: [&str; 6] = [
    "Chef Marco",
    "Chef Aiko",
    "Chef Priya",
    "Chef Tomás",
    "Chef Lena",
    "Chef Kwame",
];
const COURIERS: [&str; 6] = [
    "Sam Rivera",
    "Jordan Lee",
    "Alex Kim",
    "Taylor Brooks",
    "Morgan Diaz",
    "Casey Nguyen",
];
const VEHICLES: [&str; 4] = ["bicycle", "scooter", "motorbike", "car"];

const REFUND_NOTICE: &str = "Any payment will be refunded within 3-5 business days.";

/// Everything the plan needs that is decided before it is built.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanInputs {
    pub cook_minutes: u32,
    pub delivery_minutes: f64,
    pub total_amount: Decimal,
    pub item_count: u32,
    /// Orders already in the kitchen when this one arrived.
    pub queue_depth: usize,
}

/// One scheduled status change.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTransition {
    pub status: LifecycleStatus,
    pub offset_minutes: f64,
    pub message: String,
    pub eta_minutes: Option<u32>,
    pub payload: StatusPayload,
}

/// The lifecycle of one order from confirmation to a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLifecyclePlan {
    pub order_id: Uuid,
    /// Distinguishes this simulation from earlier ones of the same order.
    pub run_id: Uuid,
    pub user_id: CompactString,
    pub started_at: OffsetDateTime,
    pub transitions: SmallVec<[PlannedTransition; 6]>,
    /// Number of transitions already emitted, in order.
    pub fired: usize,
    pub cancelled: bool,
}

impl OrderLifecyclePlan {
    /// Lay out the happy path for an order.
    ///
    /// The chef and the courier are picked once here, so every later
    /// notification about the order names the same people.
    pub fn build<R: Rng + ?Sized>(
        order_id: Uuid,
        customer: &CustomerDetails,
        inputs: &PlanInputs,
        started_at: OffsetDateTime,
        rng: &mut R,
    ) -> Self {
        let cook = f64::from(inputs.cook_minutes);
        let preparing = rng.random_range(PREPARING_AFTER).min(cook);
        let driver_assigned = cook + rng.random_range(DRIVER_ASSIGNED_AFTER_COOK);
        let out_for_delivery = driver_assigned + rng.random_range(PICKUP_AFTER_ASSIGNMENT);
        let delivered = cook + inputs.delivery_minutes;

        let run_id = uuid::Builder::from_random_bytes(rng.random()).into_uuid();
        let chef = pick(&CHEFS, rng);
        let courier = CourierDetails {
            name: pick(&COURIERS, rng),
            phone: format!("+1-555-{:04}", rng.random_range(0..10_000u32)),
            vehicle: pick(&VEHICLES, rng),
        };

        let eta = |offset: f64| Some(minutes_until(delivered, offset));

        let raw = [
            PlannedTransition {
                status: LifecycleStatus::OrderConfirmed,
                offset_minutes: 0.0,
                message: format!(
                    "Your order has been confirmed! Estimated cook time: {} minutes.",
                    inputs.cook_minutes
                ),
                eta_minutes: eta(0.0),
                payload: StatusPayload::Confirmation {
                    cook_minutes: inputs.cook_minutes,
                    total_amount: inputs.total_amount,
                    item_count: inputs.item_count,
                },
            },
            PlannedTransition {
                status: LifecycleStatus::Preparing,
                offset_minutes: preparing,
                message: format!(
                    "{chef} is preparing your order. {} orders ahead in the kitchen.",
                    inputs.queue_depth
                ),
                eta_minutes: eta(preparing),
                payload: StatusPayload::Kitchen {
                    chef: chef.clone(),
                    queue_depth: inputs.queue_depth,
                },
            },
            PlannedTransition {
                status: LifecycleStatus::ReadyForPickup,
                offset_minutes: cook,
                message: "Your order is ready and waiting for a courier.".to_string(),
                eta_minutes: eta(cook),
                payload: StatusPayload::None,
            },
            PlannedTransition {
                status: LifecycleStatus::DriverAssigned,
                offset_minutes: driver_assigned,
                message: format!("{} has been assigned to deliver your order.", courier.name),
                eta_minutes: eta(driver_assigned),
                payload: StatusPayload::Courier(courier.clone()),
            },
            PlannedTransition {
                status: LifecycleStatus::OutForDelivery,
                offset_minutes: out_for_delivery,
                message: format!(
                    "{} is on the way! Arriving in about {} minutes.",
                    courier.name,
                    minutes_until(delivered, out_for_delivery)
                ),
                eta_minutes: eta(out_for_delivery),
                payload: StatusPayload::Courier(courier),
            },
            PlannedTransition {
                status: LifecycleStatus::Delivered,
                offset_minutes: delivered,
                message: "Your order has been delivered. Enjoy your meal!".to_string(),
                eta_minutes: None,
                payload: StatusPayload::None,
            },
        ];

        let mut floor = 0.0_f64;
        let transitions = raw
            .into_iter()
            .map(|mut t| {
                floor = floor.max(t.offset_minutes);
                t.offset_minutes = floor;
                t
            })
            .collect();

        Self {
            order_id,
            run_id,
            user_id: customer.user_id.clone(),
            started_at,
            transitions,
            fired: 0,
            cancelled: false,
        }
    }

    /// Offsets never decrease and only the last transition is terminal.
    pub fn is_well_formed(&self) -> bool {
        let ordered = self
            .transitions
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.offset_minutes <= b.offset_minutes && !a.status.is_terminal());
        let terminal_last = self
            .transitions
            .last()
            .is_some_and(|t| t.status.is_terminal());
        ordered && terminal_last
    }

    /// All transitions have been emitted.
    pub fn is_finished(&self) -> bool {
        self.fired >= self.transitions.len()
    }

    /// The most recently emitted status, including a cancellation.
    pub fn current_status(&self) -> Option<LifecycleStatus> {
        if self.cancelled {
            return Some(LifecycleStatus::Cancelled);
        }
        self.fired
            .checked_sub(1)
            .and_then(|i| self.transitions.get(i))
            .map(|t| t.status)
    }

    /// Offset of the planned delivery, in simulated minutes.
    pub fn delivered_offset(&self) -> f64 {
        self.transitions
            .last()
            .map_or(0.0, |t| t.offset_minutes)
    }

    /// Emit transition `index` and advance the fired cursor.
    ///
    /// Returns `None` if the plan was cancelled or `index` is not the next
    /// transition due.
    pub fn fire(&mut self, index: usize, now: OffsetDateTime) -> Option<StatusEvent> {
        if self.cancelled || index != self.fired {
            return None;
        }
        let transition = self.transitions.get(index)?;
        let event = StatusEvent {
            order_id: self.order_id,
            run_id: self.run_id,
            user_id: self.user_id.clone(),
            status: transition.status,
            emitted_at: now,
            eta_minutes: transition.eta_minutes,
            message: transition.message.clone(),
            payload: transition.payload.clone(),
        };
        self.fired += 1;
        Some(event)
    }

    /// Mark the plan cancelled and build the `cancelled` event.
    ///
    /// Returns `None` if the plan already reached a terminal status.
    pub fn cancel(&mut self, now: OffsetDateTime) -> Option<StatusEvent> {
        if self.cancelled || self.is_finished() {
            return None;
        }
        self.cancelled = true;
        Some(StatusEvent {
            order_id: self.order_id,
            run_id: self.run_id,
            user_id: self.user_id.clone(),
            status: LifecycleStatus::Cancelled,
            emitted_at: now,
            eta_minutes: None,
            message: format!("Your order has been cancelled. {REFUND_NOTICE}"),
            payload: StatusPayload::Refund {
                refund_notice: REFUND_NOTICE.to_string(),
            },
        })
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            order_id: self.order_id,
            run_id: self.run_id,
            user_id: self.user_id.clone(),
            started_at: self.started_at,
            current_status: self.current_status(),
            cancelled: self.cancelled,
            transitions: self
                .transitions
                .iter()
                .enumerate()
                .map(|(i, t)| TransitionSnapshot {
                    status: t.status,
                    offset_minutes: t.offset_minutes,
                    fired: i < self.fired,
                })
                .collect(),
        }
    }
}

fn pick<R: Rng + ?Sized>(choices: &[&str], rng: &mut R) -> String {
    choices.choose(rng).copied().unwrap_or_default().to_string()
}

fn minutes_until(target: f64, from: f64) -> u32 {
    // Saturating cast; a target in the past reads as zero.
    (target - from).max(0.0).ceil() as u32
}
