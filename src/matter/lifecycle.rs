//! Device lifecycle event sources.
//!
//! rs-matter has no event callback for commissioning or address changes, so
//! the stack polls for them and reports transitions to the
//! [`DeviceEventListener`].

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use embassy_time::Timer;
use log::debug;
use rs_matter::Matter;
use rs_matter::error::Error;

use super::clusters::IdentifyControl;
use super::netif::scan_interface;
use crate::callbacks::{DeviceEvent, DeviceEventListener};

/// Seconds between polls of commissioning state and identify deadlines
const POLL_INTERVAL_SECS: u64 = 1;
/// Address polls happen every this many commissioning polls
const ADDRESS_POLL_TICKS: u32 = 5;

/// Tracks commissioning state and the basic commissioning window.
#[derive(Debug)]
pub struct CommissioningTracker {
    commissioned: bool,
    window_deadline: Option<Instant>,
}

impl CommissioningTracker {
    pub fn new(commissioned: bool) -> Self {
        Self {
            commissioned,
            window_deadline: None,
        }
    }

    /// Record that the commissioning window opened at `now` for `timeout`.
    pub fn window_opened(&mut self, now: Instant, timeout: Duration) -> DeviceEvent {
        self.window_deadline = Some(now + timeout);
        DeviceEvent::CommissioningWindowOpened
    }

    pub fn window_open(&self) -> bool {
        self.window_deadline.is_some()
    }

    /// Compare the current state with the last poll.
    pub fn poll(&mut self, commissioned: bool, now: Instant) -> heapless::Vec<DeviceEvent, 2> {
        let mut events = heapless::Vec::new();

        if commissioned && !self.commissioned {
            let _ = events.push(DeviceEvent::CommissioningComplete);
            if self.window_deadline.take().is_some() {
                let _ = events.push(DeviceEvent::CommissioningWindowClosed);
            }
        } else if !commissioned
            && let Some(deadline) = self.window_deadline
            && deadline <= now
        {
            self.window_deadline = None;
            let _ = events.push(DeviceEvent::CommissioningWindowClosed);
        }

        self.commissioned = commissioned;
        events
    }
}

/// Tracks the address set of the Matter interface.
#[derive(Debug, Default)]
pub struct AddressTracker {
    last: Option<BTreeSet<IpAddr>>,
}

impl AddressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an event when the set differs from the previous observation.
    pub fn observe(&mut self, addrs: BTreeSet<IpAddr>) -> Option<DeviceEvent> {
        let changed = self.last.as_ref().is_some_and(|last| *last != addrs);
        self.last = Some(addrs);
        changed.then_some(DeviceEvent::InterfaceIpAddressChanged)
    }
}

/// Poll commissioning state, interface addresses and identify deadlines.
///
/// Runs for the lifetime of the stack.
pub async fn run_lifecycle_monitor(
    matter: &Matter<'_>,
    mut commissioning: CommissioningTracker,
    interface_name: &str,
    listener: &dyn DeviceEventListener,
    identify: &IdentifyControl,
) -> Result<(), Error> {
    let mut addresses = AddressTracker::new();
    let mut tick: u32 = 0;

    loop {
        let now = Instant::now();

        for event in commissioning.poll(matter.is_commissioned(), now) {
            listener.on_device_event(event);
        }

        if tick % ADDRESS_POLL_TICKS == 0 {
            let addrs = scan_interface(interface_name)
                .map(|snapshot| snapshot.addresses())
                .unwrap_or_default();
            if let Some(event) = addresses.observe(addrs) {
                listener.on_device_event(event);
            }
        }

        let stopped = identify.poll_expired(now);
        if stopped > 0 {
            debug!("Identify expired on {} endpoint(s)", stopped);
        }

        tick = tick.wrapping_add(1);
        Timer::after_secs(POLL_INTERVAL_SECS).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_commissioning_complete_then_window_closed_once() {
        let start = Instant::now();
        let mut tracker = CommissioningTracker::new(false);
        assert_eq!(
            tracker.window_opened(start, Duration::from_secs(900)),
            DeviceEvent::CommissioningWindowOpened
        );

        assert!(tracker.poll(false, start).is_empty());

        let events = tracker.poll(true, start + Duration::from_secs(10));
        assert_eq!(
            events.as_slice(),
            &[
                DeviceEvent::CommissioningComplete,
                DeviceEvent::CommissioningWindowClosed
            ]
        );
        assert!(!tracker.window_open());

        assert!(tracker.poll(true, start + Duration::from_secs(11)).is_empty());
        assert!(tracker.poll(true, start + Duration::from_secs(1000)).is_empty());
    }

    #[test]
    fn test_window_timeout_closes_once() {
        let start = Instant::now();
        let mut tracker = CommissioningTracker::new(false);
        tracker.window_opened(start, Duration::from_secs(60));

        assert!(tracker.poll(false, start + Duration::from_secs(59)).is_empty());
        assert_eq!(
            tracker.poll(false, start + Duration::from_secs(60)).as_slice(),
            &[DeviceEvent::CommissioningWindowClosed]
        );
        assert!(tracker.poll(false, start + Duration::from_secs(61)).is_empty());
    }

    #[test]
    fn test_already_commissioned_emits_nothing() {
        let mut tracker = CommissioningTracker::new(true);
        assert!(tracker.poll(true, Instant::now()).is_empty());
    }

    #[test]
    fn test_address_tracker_fires_on_change_only() {
        let a: BTreeSet<IpAddr> = [IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))].into();
        let b: BTreeSet<IpAddr> = [IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3))].into();

        let mut tracker = AddressTracker::new();
        assert_eq!(tracker.observe(a.clone()), None);
        assert_eq!(tracker.observe(a.clone()), None);
        assert_eq!(
            tracker.observe(b.clone()),
            Some(DeviceEvent::InterfaceIpAddressChanged)
        );
        assert_eq!(tracker.observe(b), None);
        assert_eq!(
            tracker.observe(BTreeSet::new()),
            Some(DeviceEvent::InterfaceIpAddressChanged)
        );
    }
}
