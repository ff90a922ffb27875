//! Matter cluster handlers for the sensor node.
//!
//! Handlers implement rs-matter's `Handler` traits manually. Each one reads
//! from shared cluster state that is written through the attribute system
//! ([`crate::matter::attribute::AttributeUpdater`]).

use rs_matter::dm::Dataver;
use std::sync::atomic::{AtomicU32, Ordering};

pub mod identify;
pub mod measurement;
pub mod power_source;
pub mod pressure_measurement;
pub mod relative_humidity;
pub mod temperature_measurement;

pub use identify::{IdentifyControl, IdentifyHandler, IdentifyState};
pub use measurement::{MeasuredValues, Measurement, MeasurementHandler};
pub use power_source::{PowerSourceHandler, PowerSourceState};

/// Cluster state with change detection.
///
/// The version is incremented each time an attribute value changes. Handlers
/// compare versions to detect changes and update their `Dataver` to notify
/// subscribers.
pub trait Sensor: Send + Sync {
    fn version(&self) -> u32;
}

/// Sync dataver with sensor version changes.
///
/// Call this at the start of `read_impl()` for any cluster handler backed by
/// shared state. When the version changed since the last read, the dataver is
/// bumped so subscribers see the new value.
pub fn sync_dataver_with_sensor<S: Sensor + ?Sized>(
    sensor: &S,
    last_version: &AtomicU32,
    dataver: &Dataver,
) {
    let current = sensor.version();
    let last = last_version.swap(current, Ordering::SeqCst);
    if current != last {
        dataver.changed();
    }
}
