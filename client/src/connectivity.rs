//! Injected connectivity capability: a point-in-time query plus an
//! edge-triggered feed of reachability changes. Injection (rather than an
//! ambient global) keeps drain triggering deterministic under test.

use tokio::sync::watch;

pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
    /// Receiver observing reachability edges; `changed()` wakes on every
    /// transition.
    fn watch(&self) -> watch::Receiver<bool>;
}

/// Process-wide connectivity state fed by whatever platform signal the host
/// app has. Doubles as the controllable fake in tests.
pub struct SharedConnectivity {
    tx: watch::Sender<bool>,
}

impl SharedConnectivity {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx }
    }

    pub fn set_online(&self, online: bool) {
        // send_replace so the edge is recorded even with no receiver yet
        self.tx.send_replace(online);
    }
}

impl Connectivity for SharedConnectivity {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
