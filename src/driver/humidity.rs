//! Relative humidity sensor driver.
//!
//! Values are centi-percent, matching the RelativeHumidityMeasurement
//! cluster (55.5% is 5550). The sensor is battery powered; the battery level
//! is reported through the PowerSource cluster on the same endpoint.

use parking_lot::Mutex;

use super::measurement::{MeasurementCore, Reading};
use super::{DriverError, DriverUpdatable};
use crate::matter::attribute::{AttrValue, AttributeError, AttributePath, AttributeUpdater, EndpointId};
use crate::matter::clusters::measurement::MEASURED_VALUE;
use crate::matter::clusters::power_source::{self, PowerSourceAttribute};
use crate::matter::clusters::relative_humidity::CLUSTER_ID;

pub const MIN_CENTI_PERCENT: u16 = 0;
pub const MAX_CENTI_PERCENT: u16 = 10000;

pub struct HumidityDriver {
    core: MeasurementCore,
    default: u16,
    /// Battery level in percent, `None` for mains powered sensors
    battery_percent: Option<u8>,
    /// Last accepted BatPercentRemaining in half-percent units
    last_battery: Mutex<Option<u8>>,
}

impl HumidityDriver {
    /// Initialize the driver with its power-on humidity and battery level.
    pub fn init(default_centi_percent: u16, battery_percent: Option<u8>) -> Result<Self, DriverError> {
        let core = MeasurementCore::new(
            "humidity",
            CLUSTER_ID,
            "nullable uint16",
            MIN_CENTI_PERCENT.into(),
            MAX_CENTI_PERCENT.into(),
        );
        core.check_default(default_centi_percent.into())?;
        if let Some(percent) = battery_percent
            && percent > 100
        {
            return Err(DriverError::InvalidConfig {
                driver: "humidity",
                reason: format!("battery level {}% above 100%", percent),
            });
        }
        Ok(Self {
            core,
            default: default_centi_percent,
            battery_percent,
            last_battery: Mutex::new(None),
        })
    }

    pub fn default_value(&self) -> u16 {
        self.default
    }

    /// Last accepted battery level in percent.
    pub fn battery_percent(&self) -> Option<u8> {
        self.last_battery.lock().map(|half| half / 2)
    }

    fn handle_battery_update(&self, value: &AttrValue) -> Result<(), DriverError> {
        let AttrValue::NullableU8(level) = value else {
            return Err(DriverError::TypeMismatch {
                expected: "nullable uint8",
                actual: value.type_name(),
            });
        };
        if let Some(half_percent) = level
            && *half_percent > power_source::BAT_PERCENT_MAX
        {
            return Err(DriverError::OutOfRange {
                value: (*half_percent).into(),
                min: 0,
                max: power_source::BAT_PERCENT_MAX.into(),
            });
        }
        *self.last_battery.lock() = *level;
        Ok(())
    }
}

impl DriverUpdatable for HumidityDriver {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn handle_attribute_update(&self, path: AttributePath, value: &AttrValue) -> Result<(), DriverError> {
        if path.cluster_id == power_source::CLUSTER_ID
            && path.attribute_id == PowerSourceAttribute::BatPercentRemaining as u32
        {
            return self.handle_battery_update(value);
        }
        self.core.handle_update(path, value)
    }

    fn set_defaults(&self, endpoint_id: EndpointId, attributes: &AttributeUpdater) -> Result<(), AttributeError> {
        attributes.update(
            endpoint_id,
            CLUSTER_ID,
            MEASURED_VALUE,
            AttrValue::NullableU16(Some(self.default)),
        )?;

        if let Some(percent) = self.battery_percent {
            attributes.update(
                endpoint_id,
                power_source::CLUSTER_ID,
                PowerSourceAttribute::BatPercentRemaining as u32,
                AttrValue::NullableU8(Some(percent * 2)),
            )?;
        }

        Ok(())
    }

    fn last_reading(&self) -> Option<Reading> {
        self.core.last_reading()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery_path() -> AttributePath {
        AttributePath::new(
            3,
            power_source::CLUSTER_ID,
            PowerSourceAttribute::BatPercentRemaining as u32,
        )
    }

    #[test]
    fn test_init_validates_battery() {
        assert!(HumidityDriver::init(4500, Some(100)).is_ok());
        assert!(HumidityDriver::init(4500, None).is_ok());
        assert!(HumidityDriver::init(4500, Some(101)).is_err());
        assert!(HumidityDriver::init(10001, None).is_err());
    }

    #[test]
    fn test_battery_update_is_validated() {
        let driver = HumidityDriver::init(4500, Some(80)).unwrap();

        driver
            .handle_attribute_update(battery_path(), &AttrValue::NullableU8(Some(150)))
            .unwrap();
        assert_eq!(driver.battery_percent(), Some(75));

        assert!(
            driver
                .handle_attribute_update(battery_path(), &AttrValue::NullableU8(Some(201)))
                .is_err()
        );
        assert!(
            driver
                .handle_attribute_update(battery_path(), &AttrValue::U16(10))
                .is_err()
        );
        assert_eq!(driver.battery_percent(), Some(75));
    }

    #[test]
    fn test_humidity_update_uses_measured_value() {
        let driver = HumidityDriver::init(4500, None).unwrap();
        let path = AttributePath::new(3, CLUSTER_ID, MEASURED_VALUE);

        driver
            .handle_attribute_update(path, &AttrValue::NullableU16(Some(10000)))
            .unwrap();
        assert!(
            driver
                .handle_attribute_update(path, &AttrValue::NullableU16(Some(10001)))
                .is_err()
        );
        assert_eq!(
            driver.last_reading().unwrap().value,
            AttrValue::NullableU16(Some(10000))
        );
    }
}
