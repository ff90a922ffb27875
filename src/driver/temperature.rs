//! Temperature sensor driver.
//!
//! Values are centidegrees Celsius, matching the TemperatureMeasurement
//! cluster (21.5°C is 2150).

use super::measurement::{MeasurementCore, Reading};
use super::{DriverError, DriverUpdatable};
use crate::matter::attribute::{AttrValue, AttributeError, AttributePath, AttributeUpdater, EndpointId};
use crate::matter::clusters::measurement::MEASURED_VALUE;
use crate::matter::clusters::temperature_measurement::CLUSTER_ID;

/// Lowest temperature the sensor reports (-40°C)
pub const MIN_CENTI_CELSIUS: i16 = -4000;
/// Highest temperature the sensor reports (125°C)
pub const MAX_CENTI_CELSIUS: i16 = 12500;

pub struct TemperatureDriver {
    core: MeasurementCore,
    default: i16,
}

impl TemperatureDriver {
    /// Initialize the driver with its power-on value.
    pub fn init(default_centi_celsius: i16) -> Result<Self, DriverError> {
        let core = MeasurementCore::new(
            "temperature",
            CLUSTER_ID,
            "nullable int16",
            MIN_CENTI_CELSIUS.into(),
            MAX_CENTI_CELSIUS.into(),
        );
        core.check_default(default_centi_celsius.into())?;
        Ok(Self {
            core,
            default: default_centi_celsius,
        })
    }

    pub fn default_value(&self) -> i16 {
        self.default
    }
}

impl DriverUpdatable for TemperatureDriver {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_validates_default() {
        assert_eq!(TemperatureDriver::init(2150).unwrap().default_value(), 2150);
        assert!(TemperatureDriver::init(-4001).is_err());
        assert!(TemperatureDriver::init(12501).is_err());
    }

    #[test]
    fn test_handle_update_checks_range() {
        let driver = TemperatureDriver::init(2000).unwrap();
        let path = AttributePath::new(1, CLUSTER_ID, MEASURED_VALUE);

        driver
            .handle_attribute_update(path, &AttrValue::NullableI16(Some(-4000)))
            .unwrap();
        assert!(
            driver
                .handle_attribute_update(path, &AttrValue::NullableI16(Some(13000)))
                .is_err()
        );
        assert_eq!(
            driver.last_reading().unwrap().value,
            AttrValue::NullableI16(Some(-4000))
        );
    }
}
