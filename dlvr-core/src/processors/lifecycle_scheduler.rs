//! LifecycleScheduler processor.
//!
//! The LifecycleScheduler is responsible for:
//! - Estimating cook and delivery times for a new order
//! - Building the order's `OrderLifecyclePlan`
//! - Driving one timer task per active order that emits `DomainEvent::Status`
//!   at each planned offset
//! - Cancelling plans on request and emitting the `cancelled` status
//!
//! Firing and cancelling both happen under the plan's lock. A timer that
//! wakes up after its plan was cancelled observes the flag and emits
//! nothing, so no status follows `cancelled`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use dlvr_sdk::objects::{PlanSnapshot, SimulationAccepted, StartSimulationRequest};
use rand::SeedableRng;
use rand::rngs::StdRng;
use smallvec::SmallVec;
use thiserror::Error;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::entities::lifecycle_plan::{OrderLifecyclePlan, PlanInputs};
use crate::events::{DomainEvent, DomainEventSender, StatusEvent};
use crate::timing::{TimedItem, estimate_cook_time, roll_delivery_time};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("order {0} already has an active lifecycle simulation")]
    AlreadyActive(Uuid),

    #[error("lifecycle scheduler is shut down")]
    ShutDown,
}

type SharedPlan = Arc<tokio::sync::Mutex<OrderLifecyclePlan>>;

struct PlanHandle {
    token: CancellationToken,
    plan: SharedPlan,
}

struct SchedulerInner {
    config: SchedulerConfig,
    event_tx: DomainEventSender,
    plans: Mutex<HashMap<Uuid, PlanHandle>>,
    rng: Mutex<StdRng>,
    root: CancellationToken,
    tracker: TaskTracker,
}

/// Runs simulated order lifecycles. Cheap to clone.
#[derive(Clone)]
pub struct LifecycleScheduler {
    inner: Arc<SchedulerInner>,
}

impl LifecycleScheduler {
    /// Create a new LifecycleScheduler.
    ///
    /// # Arguments
    ///
    /// * `config` - Length of a simulated minute
    /// * `event_tx` - Sender for DomainEvent events
    pub fn new(config: SchedulerConfig, event_tx: DomainEventSender) -> Self {
        Self::with_rng(config, event_tx, StdRng::from_os_rng())
    }

    /// Like [`LifecycleScheduler::new`] with a caller-provided random source.
    pub fn with_rng(config: SchedulerConfig, event_tx: DomainEventSender, rng: StdRng) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                event_tx,
                plans: Mutex::new(HashMap::new()),
                rng: Mutex::new(rng),
                root: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Start simulating `order_id`.
    ///
    /// `order_confirmed` is emitted right away by the plan's timer task.
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        order_id: Uuid,
        request: &StartSimulationRequest,
    ) -> Result<SimulationAccepted, SchedulerError> {
        if self.inner.root.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }

        let items: SmallVec<[TimedItem; 8]> = request.items.iter().map(TimedItem::from).collect();
        let item_count = request.items.iter().map(|i| i.quantity).sum();

        let mut plans = self.lock_plans();
        if plans.contains_key(&order_id) {
            return Err(SchedulerError::AlreadyActive(order_id));
        }

        let plan = {
            let mut rng = self.inner.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let inputs = PlanInputs {
                cook_minutes: estimate_cook_time(&items, &mut *rng),
                delivery_minutes: roll_delivery_time(&mut *rng),
                total_amount: request.total_amount,
                item_count,
                queue_depth: plans.len(),
            };
            OrderLifecyclePlan::build(
                order_id,
                &request.customer,
                &inputs,
                OffsetDateTime::now_utc(),
                &mut *rng,
            )
        };

        let accepted = SimulationAccepted {
            order_id,
            run_id: plan.run_id,
            estimated_cook_minutes: plan
                .transitions
                .get(2)
                .map_or(0, |t| t.offset_minutes.ceil() as u32),
            estimated_delivery_minutes: plan.delivered_offset().ceil() as u32,
        };

        info!(
            order_id = %order_id,
            run_id = %plan.run_id,
            user_id = %plan.user_id,
            cook_minutes = accepted.estimated_cook_minutes,
            delivery_minutes = accepted.estimated_delivery_minutes,
            "Lifecycle simulation started"
        );

        let token = self.inner.root.child_token();
        let plan = Arc::new(tokio::sync::Mutex::new(plan));
        plans.insert(
            order_id,
            PlanHandle {
                token: token.clone(),
                plan: Arc::clone(&plan),
            },
        );
        drop(plans);

        self.inner
            .tracker
            .spawn(drive_plan(Arc::clone(&self.inner), order_id, plan, token));

        Ok(accepted)
    }

    /// Cancel `order_id`, emitting `cancelled` if the order had not yet
    /// reached a terminal status.
    ///
    /// Returns `false` for unknown, finished or already cancelled orders.
    pub async fn cancel(&self, order_id: Uuid) -> bool {
        let handle = self.lock_plans().remove(&order_id);
        let Some(handle) = handle else {
            debug!(order_id = %order_id, "No active lifecycle simulation to cancel");
            return false;
        };

        let mut plan = handle.plan.lock().await;
        handle.token.cancel();
        let Some(event) = plan.cancel(OffsetDateTime::now_utc()) else {
            debug!(order_id = %order_id, "Lifecycle simulation already finished");
            return false;
        };

        info!(order_id = %order_id, "Lifecycle simulation cancelled");
        emit(&self.inner.event_tx, event).await;
        true
    }

    pub async fn snapshot(&self, order_id: Uuid) -> Option<PlanSnapshot> {
        let plan = self
            .lock_plans()
            .get(&order_id)
            .map(|handle| Arc::clone(&handle.plan))?;
        let plan = plan.lock().await;
        Some(plan.snapshot())
    }

    /// Ids of orders whose simulation is still running.
    pub fn active_orders(&self) -> Vec<Uuid> {
        self.lock_plans().keys().copied().collect()
    }

    /// Stop every timer without emitting further events and wait for the
    /// timer tasks to exit.
    pub async fn shutdown(&self) {
        self.inner.root.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.lock_plans().clear();
        info!("LifecycleScheduler shutdown complete");
    }

    fn lock_plans(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PlanHandle>> {
        self.inner
            .plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Timer task for one plan.
async fn drive_plan(
    inner: Arc<SchedulerInner>,
    order_id: Uuid,
    plan: SharedPlan,
    token: CancellationToken,
) {
    let started = tokio::time::Instant::now();
    let offsets: SmallVec<[f64; 6]> = {
        let plan = plan.lock().await;
        plan.transitions.iter().map(|t| t.offset_minutes).collect()
    };

    for (index, offset) in offsets.into_iter().enumerate() {
        let due = started + inner.config.span(offset);
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep_until(due) => {}
        }

        let mut guard = plan.lock().await;
        let Some(event) = guard.fire(index, OffsetDateTime::now_utc()) else {
            break;
        };
        debug!(order_id = %order_id, status = %event.status, "Lifecycle transition due");
        emit(&inner.event_tx, event).await;
    }

    let mut plans = inner.plans.lock().unwrap_or_else(PoisonError::into_inner);
    if plans
        .get(&order_id)
        .is_some_and(|handle| Arc::ptr_eq(&handle.plan, &plan))
    {
        plans.remove(&order_id);
    }
}

async fn emit(event_tx: &DomainEventSender, event: StatusEvent) {
    let order_id = event.order_id;
    let status = event.status;
    if let Err(e) = event_tx.send(DomainEvent::Status(event)).await {
        warn!(
            order_id = %order_id,
            status = %status,
            error = %e,
            "Failed to emit lifecycle status"
        );
    }
}
