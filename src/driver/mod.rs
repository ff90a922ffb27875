//! Sensor and button drivers.
//!
//! Drivers own the (simulated) hardware state. Endpoints only hold a
//! [`DriverId`], a typed index into the [`DriverRegistry`] that owns every
//! driver for the lifetime of the process.

pub mod button;
pub mod humidity;
pub mod measurement;
pub mod pressure;
pub mod temperature;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::matter::attribute::{AttrValue, AttributeError, AttributePath, AttributeUpdater, EndpointId};

pub use button::{ButtonDriver, FACTORY_RESET_HOLD, FactoryReset, PressOutcome, ResetAction};
pub use humidity::HumidityDriver;
pub use measurement::Reading;
pub use pressure::PressureDriver;
pub use temperature::TemperatureDriver;

/// Typed handle of a driver in the [`DriverRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverId(u16);

impl DriverId {
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "driver#{}", self.0)
    }
}

/// Error types for driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A reading or written value is outside the sensor range.
    #[error("value {value} outside range {min}..={max}")]
    OutOfRange { value: i32, min: i32, max: i32 },

    /// The value has the wrong type for the attribute.
    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// The driver configuration is inconsistent.
    #[error("invalid {driver} configuration: {reason}")]
    InvalidConfig { driver: &'static str, reason: String },

    /// No driver is registered under this id.
    #[error("unknown {0}")]
    UnknownDriver(DriverId),
}

/// Driver side of the attribute update path.
///
/// Implemented once per sensor type and selected when the endpoint is
/// created.
pub trait DriverUpdatable: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Validate and take over a value before it is stored.
    fn handle_attribute_update(&self, path: AttributePath, value: &AttrValue) -> Result<(), DriverError>;

    /// Push the driver's default values for `endpoint_id` through the attribute system.
    fn set_defaults(&self, endpoint_id: EndpointId, attributes: &AttributeUpdater) -> Result<(), AttributeError>;

    /// Most recent value accepted by the driver.
    fn last_reading(&self) -> Option<Reading>;
}

/// Arena of drivers indexed by [`DriverId`].
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Vec<Arc<dyn DriverUpdatable>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a driver and return its handle.
    pub fn register(&mut self, driver: Arc<dyn DriverUpdatable>) -> DriverId {
        let id = DriverId::new(self.drivers.len() as u16);
        log::info!("[Driver] Registered {} as {}", driver.name(), id);
        self.drivers.push(driver);
        id
    }

    pub fn get(&self, id: DriverId) -> Option<&Arc<dyn DriverUpdatable>> {
        self.drivers.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DriverId, &Arc<dyn DriverUpdatable>)> {
        self.drivers
            .iter()
            .enumerate()
            .map(|(i, d)| (DriverId::new(i as u16), d))
    }

    /// Forward an attribute update to the driver behind `id`.
    pub fn handle_attribute_update(
        &self,
        id: DriverId,
        path: AttributePath,
        value: &AttrValue,
    ) -> Result<(), DriverError> {
        self.get(id)
            .ok_or(DriverError::UnknownDriver(id))?
            .handle_attribute_update(path, value)
    }

    /// Push the defaults of the driver behind `id` to `endpoint_id`.
    pub fn set_defaults(
        &self,
        id: DriverId,
        endpoint_id: EndpointId,
        attributes: &AttributeUpdater,
    ) -> Result<(), AttributeError> {
        self.get(id)
            .ok_or(DriverError::UnknownDriver(id))?
            .set_defaults(endpoint_id, attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut registry = DriverRegistry::new();
        assert!(registry.is_empty());

        let t = registry.register(Arc::new(TemperatureDriver::init(2200).unwrap()));
        let p = registry.register(Arc::new(PressureDriver::init(1013).unwrap()));

        assert_eq!(t, DriverId::new(0));
        assert_eq!(p, DriverId::new(1));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(p).unwrap().name(), "pressure");

        let names: Vec<_> = registry.iter().map(|(_, d)| d.name()).collect();
        assert_eq!(names, vec!["temperature", "pressure"]);
    }

    #[test]
    fn test_unknown_driver() {
        let registry = DriverRegistry::new();
        let path = AttributePath::new(1, 0x0402, 0);
        let err = registry
            .handle_attribute_update(DriverId::new(7), path, &AttrValue::NullableI16(Some(1)))
            .unwrap_err();
        assert!(matches!(err, DriverError::UnknownDriver(id) if id == DriverId::new(7)));
        assert_eq!(DriverId::new(7).to_string(), "driver#7");
    }
}
