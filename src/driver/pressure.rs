//! Barometric pressure sensor driver.
//!
//! Values are tenths of a kilopascal, matching the PressureMeasurement
//! cluster (101.3 kPa is 1013).

use super::measurement::{MeasurementCore, Reading};
use super::{DriverError, DriverUpdatable};
use crate::matter::attribute::{AttrValue, AttributeError, AttributePath, AttributeUpdater, EndpointId};
use crate::matter::clusters::measurement::MEASURED_VALUE;
use crate::matter::clusters::pressure_measurement::CLUSTER_ID;

/// Lowest pressure the sensor reports (30 kPa)
pub const MIN_DECI_KPA: i16 = 300;
/// Highest pressure the sensor reports (110 kPa)
pub const MAX_DECI_KPA: i16 = 1100;

pub struct PressureDriver {
    core: MeasurementCore,
    default: i16,
}

impl PressureDriver {
    /// Initialize the driver with its power-on value.
    pub fn init(default_deci_kpa: i16) -> Result<Self, DriverError> {
        let core = MeasurementCore::new(
            "pressure",
            CLUSTER_ID,
            "nullable int16",
            MIN_DECI_KPA.into(),
            MAX_DECI_KPA.into(),
        );
        core.check_default(default_deci_kpa.into())?;
        Ok(Self {
            core,
            default: default_deci_kpa,
        })
    }

    pub fn default_value(&self) -> i16 {
        self.default
    }
}

impl DriverUpdatable for PressureDriver {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn handle_attribute_update(&self, path: AttributePath, value: &AttrValue) -> Result<(), DriverError> {
        self.core.handle_update(path, value)
    }

    fn set_defaults(&self, endpoint_id: EndpointId, attributes: &AttributeUpdater) -> Result<(), AttributeError> {
        attributes.update(
            endpoint_id,
            CLUSTER_ID,
            MEASURED_VALUE,
            AttrValue::NullableI16(Some(self.default)),
        )
    }

    fn last_reading(&self) -> Option<Reading> {
        self.core.last_reading()
    }
}
