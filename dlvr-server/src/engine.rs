//! Wiring of the processors behind the HTTP surface.
//!
//! ```text
//! LifecycleScheduler ──┐
//!                      ├─ DomainEvent ─> NotificationFanout ─┬─ NotificationBus ─> streams
//! signal endpoint ─────┘                                     └─ AlertRequest ────> AlertSender
//! ```

use dlvr_core::config::{AlertConfig, ConfigStore, SchedulerConfig, StreamConfig};
use dlvr_core::entities::NotificationStore;
use dlvr_core::events::{alert_channel, domain_event_channel, notification_bus};
use dlvr_core::presence::PresenceRegistry;
use dlvr_core::processors::{AlertSender, LifecycleScheduler, NotificationFanout};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::state::AppState;

/// Running processors plus the state handed to request handlers.
pub struct Engine {
    state: AppState,
    shutdown_tx: Arc<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Spawn the fanout and alert processors and build the app state.
    pub fn start(
        scheduler_config: SchedulerConfig,
        stream_config: StreamConfig,
        store: Arc<dyn NotificationStore>,
        alerts: ConfigStore<AlertConfig>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = domain_event_channel();
        let (alert_tx, alert_rx) = alert_channel();
        let bus = notification_bus();
        let presence = PresenceRegistry::new(stream_config.presence_window);

        let scheduler = LifecycleScheduler::new(scheduler_config, event_tx.clone());
        let fanout = NotificationFanout::new(
            Arc::clone(&store),
            bus.clone(),
            alert_tx,
            presence.clone(),
        );
        let alert_sender = AlertSender::new(alert_rx, shutdown_rx.clone(), alerts.clone());

        let tasks = vec![
            tokio::spawn(fanout.run(shutdown_rx.clone(), event_rx)),
            tokio::spawn(alert_sender.run()),
        ];

        let state = AppState {
            scheduler,
            store,
            bus,
            events: event_tx,
            presence,
            stream: stream_config,
            alerts,
            shutdown_rx,
        };

        Self {
            state,
            shutdown_tx: Arc::new(shutdown_tx),
            tasks,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Sender that flips every `shutdown_rx` handed out by this engine.
    pub fn shutdown_trigger(&self) -> Arc<watch::Sender<bool>> {
        Arc::clone(&self.shutdown_tx)
    }

    /// Stop the scheduler, then the processors, and wait for all of them.
    pub async fn shutdown(self) {
        self.state.scheduler.shutdown().await;
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Processor task ended abnormally");
            }
        }
    }
}
