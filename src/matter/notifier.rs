//! Cluster change notifier for live Matter subscription updates.
//!
//! Cluster state changes outside the Matter thread (simulated readings, shell
//! input, battery drain). The attribute system records each changed cluster
//! here and wakes the stack, which hands the clusters to the subscription
//! engine so controllers get the new values without waiting for their
//! subscription's max interval.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::warn;
use parking_lot::Mutex;

use super::attribute::EndpointId;
use super::node::MAX_ENDPOINTS;

/// Every endpoint carries at most a measurement, Identify and PowerSource cluster
const MAX_PENDING: usize = MAX_ENDPOINTS * 3;

/// Changed clusters waiting to be reported, plus the signal that wakes the reporter.
pub struct ClusterNotifier {
    signal: Signal<CriticalSectionRawMutex, ()>,
    pending: Mutex<heapless::Vec<(EndpointId, u32), MAX_PENDING>>,
}

impl Default for ClusterNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterNotifier {
    pub fn new() -> Self {
        Self {
            signal: Signal::new(),
            pending: Mutex::new(heapless::Vec::new()),
        }
    }

    /// Record that a cluster's data changed and wake the reporter.
    ///
    /// A cluster already waiting is not queued twice.
    pub fn notify(&self, endpoint_id: EndpointId, cluster_id: u32) {
        {
            let mut pending = self.pending.lock();
            if !pending.contains(&(endpoint_id, cluster_id))
                && pending.push((endpoint_id, cluster_id)).is_err()
            {
                warn!(
                    "Change queue full, dropping ep{}/0x{:04X}",
                    endpoint_id, cluster_id
                );
            }
        }
        self.signal.signal(());
    }

    /// Take every cluster changed since the last call.
    pub fn take_pending(&self) -> heapless::Vec<(EndpointId, u32), MAX_PENDING> {
        core::mem::take(&mut *self.pending.lock())
    }

    /// Wait until [`notify`](Self::notify) is called.
    pub async fn wait(&self) {
        self.signal.wait().await;
    }
}
