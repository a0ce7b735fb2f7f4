//! Hot-reloadable config values.
//!
//! `ConfigStore<T>` publishes immutable snapshots through a `watch` channel.
//! Readers clone the current `Arc<T>` and never hold a lock across an
//! await; writers swap in a whole new value.

use std::sync::Arc;

use tokio::sync::watch;

/// A shared configuration value with change notification.
pub struct ConfigStore<T> {
    tx: Arc<watch::Sender<Arc<T>>>,
}

/// Receives notifications when a [`ConfigStore`] is updated.
pub struct ConfigWatcher<T> {
    rx: watch::Receiver<Arc<T>>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// The current snapshot.
    pub fn read(&self) -> Arc<T> {
        Arc::clone(&self.tx.borrow())
    }

    /// Replace the stored value and notify all watchers.
    pub fn update(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
    }

    pub fn subscribe(&self) -> ConfigWatcher<T> {
        ConfigWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> ConfigWatcher<T> {
    /// Wait for the next update and return the new snapshot.
    ///
    /// Returns `Err` once every [`ConfigStore`] handle has been dropped.
    pub async fn changed(&mut self) -> Result<Arc<T>, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(Arc::clone(&self.rx.borrow_and_update()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_reaches_watchers() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();
        assert_eq!(*store.read(), 1);

        store.clone().update(2);
        assert_eq!(*watcher.changed().await.unwrap(), 2);
        assert_eq!(*store.read(), 2);
    }

    #[tokio::test]
    async fn test_watcher_errors_after_store_dropped() {
        let store = ConfigStore::new("a");
        let mut watcher = store.subscribe();
        drop(store);
        assert!(watcher.changed().await.is_err());
    }
}
