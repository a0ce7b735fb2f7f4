//! Axum server setup and router configuration.

use crate::api;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .nest("/api/v1", api::router())
        // Add state to all routes
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    active_simulations: usize,
}

/// Simple health check - returns OK if the server is running.
async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_simulations: state.scheduler.active_orders().len(),
    })
}

/// Run the server with graceful shutdown support.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown_tx: Arc<watch::Sender<bool>>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use dlvr_core::config::{AlertConfig, ConfigStore, SchedulerConfig, StreamConfig};
    use dlvr_core::entities::MemoryNotificationStore;
    use dlvr_sdk::client::{OrderClient, TransportConfig, TransportManager};
    use dlvr_sdk::objects::{
        CustomerDetails, Difficulty, LifecycleStatus, Notification, NotificationId,
        NotificationType, OrderItem, PollResponse, Priority, StartSimulationRequest,
    };
    use rust_decimal::Decimal;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use time::OffsetDateTime;
    use tokio::task::JoinHandle;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn engine(minute: Duration) -> Engine {
        engine_with(minute, StreamConfig::default())
    }

    fn engine_with(minute: Duration, stream: StreamConfig) -> Engine {
        Engine::start(
            SchedulerConfig { minute },
            stream,
            Arc::new(MemoryNotificationStore::new()),
            ConfigStore::new(AlertConfig::default()),
        )
    }

    fn start_request(user_id: &str) -> StartSimulationRequest {
        StartSimulationRequest {
            items: vec![OrderItem {
                id: "ramen".to_string(),
                name: "Ramen".to_string(),
                cook_time_label: "15-20 min".to_string(),
                difficulty: Difficulty::Medium,
                quantity: 1,
            }],
            total_amount: Decimal::new(1599, 2),
            customer: CustomerDetails {
                user_id: user_id.into(),
                name: "Ada".to_string(),
                phone: Some("+1-555-0100".to_string()),
                address: None,
            },
        }
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<String>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json)
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    async fn poll(router: &Router, user_id: &str, after: Option<u64>) -> PollResponse {
        let mut uri = format!("/api/v1/users/{user_id}/notifications");
        if let Some(after) = after {
            uri.push_str(&format!("?after={after}"));
        }
        let (status, body) = call(router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }

    /// Poll from the start until the user has at least `count` notifications.
    async fn poll_until(router: &Router, user_id: &str, count: usize) -> Vec<Notification> {
        for _ in 0..200 {
            let response = poll(router, user_id, Some(0)).await;
            if response.notifications.len() >= count {
                return response.notifications;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("user {user_id} never received {count} notifications");
    }

    fn system_notification(user_id: &str, key: &str) -> Notification {
        Notification {
            id: NotificationId::derive(user_id, key),
            kind: NotificationType::SystemNotification,
            user_id: user_id.into(),
            order_id: None,
            title: "Backlog".to_string(),
            message: key.to_string(),
            data: None,
            timestamp: OffsetDateTime::now_utc(),
            priority: Priority::Low,
        }
    }

    async fn spawn_server(router: Router) -> (url::Url, watch::Sender<bool>, JoinHandle<std::io::Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.changed().await;
                })
                .await
        });
        (format!("http://{addr}").parse().unwrap(), stop_tx, server)
    }

    #[tokio::test]
    async fn test_health_check() {
        let engine = engine(Duration::from_secs(60));
        let router = build_router(engine.state());
        let (status, body) = call(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["active_simulations"], 0);
    }

    #[tokio::test]
    async fn test_simulation_lifecycle_endpoints() {
        let engine = engine(Duration::from_secs(60));
        let router = build_router(engine.state());
        let order_id = Uuid::new_v4();
        let uri = format!("/api/v1/orders/{order_id}/simulation");
        let body = serde_json::to_string(&start_request("u-1")).unwrap();

        let (status, accepted) = call(&router, Method::POST, &uri, Some(body.clone())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let accepted: serde_json::Value = serde_json::from_slice(&accepted).unwrap();
        assert_eq!(accepted["orderId"], order_id.to_string());
        assert!(accepted["estimatedCookMinutes"].as_u64().unwrap() >= 29);

        let (status, _) = call(&router, Method::POST, &uri, Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, snapshot) = call(&router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: serde_json::Value = serde_json::from_slice(&snapshot).unwrap();
        assert_eq!(snapshot["userId"], "u-1");
        assert_eq!(snapshot["transitions"].as_array().unwrap().len(), 6);
        assert_eq!(snapshot["runId"], accepted["runId"]);

        // Wait for the confirmation so the cancel lands mid-lifecycle.
        poll_until(&router, "u-1", 1).await;

        let cancel = format!("/api/v1/orders/{order_id}/cancel");
        let (status, _) = call(&router, Method::POST, &cancel, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&router, Method::POST, &cancel, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let notifications = poll_until(&router, "u-1", 2).await;
        let statuses: Vec<_> = notifications
            .iter()
            .map(|n| n.data.as_ref().unwrap()["status"].clone())
            .collect();
        assert_eq!(statuses, ["order_confirmed", "cancelled"]);
        assert_eq!(notifications[1].priority, dlvr_sdk::objects::Priority::High);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_poll_cursor_and_undelivered_backlog() {
        let engine = engine(Duration::from_secs(60));
        let state = engine.state();
        let router = build_router(state.clone());

        let signal = |key: &str| {
            serde_json::json!({
                "type": "payment_update",
                "dedupeKey": key,
                "title": "Payment received",
                "message": "Thanks!",
            })
            .to_string()
        };
        let uri = "/api/v1/users/u-2/notifications";
        let (status, _) = call(&router, Method::POST, uri, Some(signal("pay-1"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let first = poll_until(&router, "u-2", 1).await;
        assert_eq!(first[0].kind, NotificationType::PaymentUpdate);

        let stored = state.store.list_after("u-2", 0, 10).await.unwrap();
        assert!(stored[0].delivered);
        assert_eq!(stored[0].cursor, 1);

        // Same dedupe key: no second notification.
        call(&router, Method::POST, uri, Some(signal("pay-1"))).await;
        call(&router, Method::POST, uri, Some(signal("pay-2"))).await;
        let both = poll_until(&router, "u-2", 2).await;
        assert_eq!(both.len(), 2);

        let page = poll(&router, "u-2", Some(1)).await;
        assert_eq!(page.notifications.len(), 1);
        assert_eq!(page.notifications[0].id, both[1].id);
        assert_eq!(page.next_cursor, 2);
        let page = poll(&router, "u-2", Some(2)).await;
        assert!(page.notifications.is_empty());
        assert_eq!(page.next_cursor, 2);

        // Without a cursor only the undelivered backlog comes back.
        call(&router, Method::POST, uri, Some(signal("pay-3"))).await;
        let mut page = poll(&router, "u-2", None).await;
        for _ in 0..200 {
            if !page.notifications.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            page = poll(&router, "u-2", None).await;
        }
        assert_eq!(page.notifications.len(), 1);
        assert_eq!(page.notifications[0].message, "Thanks!");
        assert_ne!(page.notifications[0].id, both[0].id);
        assert_ne!(page.notifications[0].id, both[1].id);
        assert_eq!(page.next_cursor, 3);
        assert!(poll(&router, "u-2", None).await.notifications.is_empty());
    }

    #[tokio::test]
    async fn test_poll_without_cursor_pages_a_full_backlog() {
        let stream = StreamConfig {
            page_limit: 3,
            ..StreamConfig::default()
        };
        let engine = engine_with(Duration::from_secs(60), stream);
        let state = engine.state();
        let router = build_router(state.clone());
        for i in 0..5 {
            let n = system_notification("u-7", &format!("backlog-{i}"));
            state.store.insert_if_absent(&n).await.unwrap();
        }

        let first = poll(&router, "u-7", None).await;
        assert_eq!(first.notifications.len(), 3);
        assert_eq!(first.next_cursor, 3);
        let rest = poll(&router, "u-7", Some(first.next_cursor)).await;
        let messages: Vec<_> = rest.notifications.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, ["backlog-3", "backlog-4"]);
        assert_eq!(rest.next_cursor, 5);
        assert!(state.store.list_undelivered("u-7", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_signals_are_rejected() {
        let engine = engine(Duration::from_secs(60));
        let router = build_router(engine.state());
        let body = serde_json::json!({
            "type": "order_status",
            "dedupeKey": "x",
            "title": "Delivered",
            "message": "Fake",
        })
        .to_string();
        let (status, _) = call(&router, Method::POST, "/api/v1/users/u-1/notifications", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mark_read_and_clear() {
        let engine = engine(Duration::from_secs(60));
        let router = build_router(engine.state());
        let body = serde_json::json!({
            "type": "system_notification",
            "dedupeKey": "welcome",
            "title": "Welcome",
            "message": "Hello",
        })
        .to_string();
        call(&router, Method::POST, "/api/v1/users/u-3/notifications", Some(body)).await;
        let notifications = poll_until(&router, "u-3", 1).await;
        let id = &notifications[0].id;

        let read = format!("/api/v1/users/u-3/notifications/{id}/read");
        let (status, _) = call(&router, Method::POST, &read, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(
            &router,
            Method::POST,
            &format!("/api/v1/users/u-4/notifications/{id}/read"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&router, Method::DELETE, "/api/v1/users/u-3/notifications", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let page = poll(&router, "u-3", Some(0)).await;
        assert!(page.notifications.is_empty());
    }

    #[tokio::test]
    async fn test_stream_delivers_full_lifecycle_to_transport_manager() {
        let engine = engine(Duration::from_millis(5));
        let router = build_router(engine.state());
        let (base_url, stop_tx, server) = spawn_server(router).await;

        let manager = TransportManager::connect_to(base_url.clone(), TransportConfig::default()).unwrap();
        let received = Arc::new(StdMutex::new(Vec::<Notification>::new()));
        let sink = Arc::clone(&received);
        let mut status_rx = manager
            .subscribe("u-5", move |n| sink.lock().unwrap().push(n), |_| {})
            .await;
        status_rx
            .wait_for(|s| s.connected)
            .await
            .unwrap();

        let order_id = Uuid::new_v4();
        OrderClient::new(base_url)
            .start_simulation(order_id, &start_request("u-5"))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let done = received
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|n| n.data.as_ref().is_some_and(|d| d["status"] == "delivered"));
                if done {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let statuses: Vec<LifecycleStatus> = received
            .lock()
            .unwrap()
            .iter()
            .map(|n| serde_json::from_value(n.data.as_ref().unwrap()["status"].clone()).unwrap())
            .collect();
        assert_eq!(statuses, LifecycleStatus::HAPPY_PATH);

        manager.shutdown().await;
        stop_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_stream_replays_backlog_larger_than_a_page() {
        let stream = StreamConfig {
            page_limit: 5,
            ..StreamConfig::default()
        };
        let engine = engine_with(Duration::from_secs(60), stream);
        let state = engine.state();

        // A long delivered history followed by a backlog spanning several pages.
        let mut history = Vec::new();
        for i in 0..100 {
            let n = system_notification("u-6", &format!("history-{i}"));
            state.store.insert_if_absent(&n).await.unwrap();
            history.push(n.id);
        }
        state.store.mark_delivered(&history).await.unwrap();
        let mut backlog = Vec::new();
        for i in 0..12 {
            let n = system_notification("u-6", &format!("backlog-{i}"));
            state.store.insert_if_absent(&n).await.unwrap();
            backlog.push(n.id);
        }

        let (base_url, stop_tx, server) = spawn_server(build_router(state.clone())).await;
        let manager = TransportManager::connect_to(base_url, TransportConfig::default()).unwrap();
        let received = Arc::new(StdMutex::new(Vec::<NotificationId>::new()));
        let sink = Arc::clone(&received);
        let _status_rx = manager
            .subscribe("u-6", move |n| sink.lock().unwrap().push(n.id), |_| {})
            .await;

        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let undelivered = state.store.list_undelivered("u-6", 100).await.unwrap();
                if received.lock().unwrap().len() >= backlog.len() && undelivered.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(*received.lock().unwrap(), backlog);

        manager.shutdown().await;
        stop_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
        engine.shutdown().await;
    }
}
