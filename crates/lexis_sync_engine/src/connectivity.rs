//! Network reachability probes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the network is currently reachable.
///
/// Platform integrations implement this over their native network monitor.
#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Returns true if requests can currently be attempted.
    async fn is_connected(&self) -> bool;
}

/// A probe that always reports connectivity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_connected(&self) -> bool {
        true
    }
}

/// A probe backed by a toggleable flag.
#[derive(Debug)]
pub struct ConnectivityFlag {
    online: AtomicBool,
}

impl ConnectivityFlag {
    /// Creates a probe with the given initial state.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Updates the reported state.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Connectivity for ConnectivityFlag {
    async fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
