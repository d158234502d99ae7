use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::models::NetworkStatus;

type Listener = Arc<dyn Fn(NetworkStatus) + Send + Sync>;

struct MonitorState {
    status: NetworkStatus,
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Process-wide connectivity signal. Clone is cheap and shares state.
#[derive(Clone)]
pub struct NetworkStatusMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl NetworkStatusMonitor {
    /// Create a monitor seeded with the platform's reported connectivity.
    pub fn new(initial: NetworkStatus) -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                status: initial,
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> NetworkStatus {
        self.lock().status
    }

    /// Record a platform connectivity event. Listeners only hear about real
    /// transitions.
    pub fn set(&self, status: NetworkStatus) {
        let listeners: Vec<Listener> = {
            let mut state = self.lock();
            if state.status == status {
                return;
            }
            state.status = status;
            state.listeners.iter().map(|(_, l)| l.clone()).collect()
        };

        info!(%status, listeners = listeners.len(), "Network status changed");
        // Called without the lock held so listeners may (un)subscribe freely
        for listener in listeners {
            listener(status);
        }
    }

    /// Register a listener for status transitions.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(NetworkStatus) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, Arc::new(listener)));
        debug!(id, "Network listener registered");

        Subscription {
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

impl Default for NetworkStatusMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Online)
    }
}

/// Handle returned by [`NetworkStatusMonitor::on_change`]. Dropping it keeps
/// the listener registered; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    state: Weak<Mutex<MonitorState>>,
}

impl Subscription {
    /// Remove the listener. Safe to call more than once, and from inside the
    /// listener itself.
    pub fn unsubscribe(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.listeners.retain(|(id, _)| *id != self.id);
    }
}

/// Best-effort startup check: one HEAD request, no retry. Any response at all
/// means the network is reachable.
pub async fn probe(url: &str, timeout: Duration) -> NetworkStatus {
    let client = match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            debug!(error = %e, "Could not build probe client, assuming offline");
            return NetworkStatus::Offline;
        }
    };

    match client.head(url).send().await {
        Ok(response) => {
            debug!(url, status = %response.status(), "Connectivity probe answered");
            NetworkStatus::Online
        }
        Err(e) => {
            debug!(url, error = %e, "Connectivity probe failed");
            NetworkStatus::Offline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_current_reflects_seed_and_updates() {
        let monitor = NetworkStatusMonitor::new(NetworkStatus::Offline);
        assert_eq!(monitor.current(), NetworkStatus::Offline);

        monitor.set(NetworkStatus::Online);
        assert_eq!(monitor.current(), NetworkStatus::Online);
    }

    #[test]
    fn test_listeners_fire_only_on_transition() {
        let monitor = NetworkStatusMonitor::new(NetworkStatus::Online);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let c = calls.clone();
        let s = seen.clone();
        let _sub = monitor.on_change(move |status| {
            c.fetch_add(1, Ordering::SeqCst);
            s.lock().unwrap().push(status);
        });

        monitor.set(NetworkStatus::Online);
        monitor.set(NetworkStatus::Offline);
        monitor.set(NetworkStatus::Offline);
        monitor.set(NetworkStatus::Online);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![NetworkStatus::Offline, NetworkStatus::Online]
        );
    }

    #[test]
    fn test_multiple_listeners_and_idempotent_unsubscribe() {
        let monitor = NetworkStatusMonitor::new(NetworkStatus::Online);
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let a2 = a.clone();
        let sub_a = monitor.on_change(move |_| {
            a2.fetch_add(1, Ordering::SeqCst);
        });
        let b2 = b.clone();
        let _sub_b = monitor.on_change(move |_| {
            b2.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set(NetworkStatus::Offline);
        sub_a.unsubscribe();
        sub_a.unsubscribe();
        monitor.set(NetworkStatus::Online);

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.listener_count(), 1);
    }

    #[test]
    fn test_unsubscribe_during_callback() {
        let monitor = NetworkStatusMonitor::new(NetworkStatus::Online);
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let c = calls.clone();
        let inner_slot = slot.clone();
        let sub = monitor.on_change(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = inner_slot.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        monitor.set(NetworkStatus::Offline);
        monitor.set(NetworkStatus::Online);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe_after_monitor_dropped() {
        let monitor = NetworkStatusMonitor::new(NetworkStatus::Online);
        let sub = monitor.on_change(|_| {});
        drop(monitor);
        sub.unsubscribe();
    }
}
