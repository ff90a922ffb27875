//! Shared logic of the measurement drivers (temperature, pressure, humidity).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::DriverError;
use crate::matter::attribute::{AttrValue, AttributePath};
use crate::matter::clusters::measurement::MEASURED_VALUE;

/// A value accepted by a driver, with the time it was accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: AttrValue,
    pub at: DateTime<Utc>,
}

/// Range checking and last-reading bookkeeping for one measurement cluster.
pub struct MeasurementCore {
    name: &'static str,
    cluster_id: u32,
    value_type: &'static str,
    min: i32,
    max: i32,
    last: Mutex<Option<Reading>>,
}

impl MeasurementCore {
    /// `value_type` is the [`AttrValue::type_name`] the MeasuredValue must carry.
    pub fn new(name: &'static str, cluster_id: u32, value_type: &'static str, min: i32, max: i32) -> Self {
        Self {
            name,
            cluster_id,
            value_type,
            min,
            max,
            last: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn range(&self) -> (i32, i32) {
        (self.min, self.max)
    }

    /// Reject a default value the sensor could never report.
    pub fn check_default(&self, default: i32) -> Result<(), DriverError> {
        if default < self.min || default > self.max {
            return Err(DriverError::InvalidConfig {
                driver: self.name,
                reason: format!(
                    "default {} outside range {}..={}",
                    default, self.min, self.max
                ),
            });
        }
        Ok(())
    }

    /// Validate a MeasuredValue update and remember it.
    ///
    /// Updates to other clusters or attributes on the endpoint pass through.
    pub fn handle_update(&self, path: AttributePath, value: &AttrValue) -> Result<(), DriverError> {
        if path.cluster_id != self.cluster_id || path.attribute_id != MEASURED_VALUE {
            return Ok(());
        }

        if value.type_name() != self.value_type {
            return Err(DriverError::TypeMismatch {
                expected: self.value_type,
                actual: value.type_name(),
            });
        }

        let raw = match value {
            AttrValue::NullableI16(v) => v.map(i32::from),
            AttrValue::NullableU16(v) => v.map(i32::from),
            AttrValue::NullableU8(v) => v.map(i32::from),
            AttrValue::U16(v) => Some(i32::from(*v)),
        };

        if let Some(v) = raw
            && (v < self.min || v > self.max)
        {
            return Err(DriverError::OutOfRange {
                value: v,
                min: self.min,
                max: self.max,
            });
        }

        *self.last.lock() = Some(Reading {
            value: *value,
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn last_reading(&self) -> Option<Reading> {
        *self.last.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> MeasurementCore {
        MeasurementCore::new("test", 0x0402, "nullable int16", -100, 100)
    }

    #[test]
    fn test_accepts_in_range_and_null() {
        let core = core();
        let path = AttributePath::new(1, 0x0402, MEASURED_VALUE);

        core.handle_update(path, &AttrValue::NullableI16(Some(100))).unwrap();
        assert_eq!(
            core.last_reading().unwrap().value,
            AttrValue::NullableI16(Some(100))
        );

        core.handle_update(path, &AttrValue::NullableI16(None)).unwrap();
        assert_eq!(core.last_reading().unwrap().value, AttrValue::NullableI16(None));
    }

    #[test]
    fn test_rejects_out_of_range_without_recording() {
        let core = core();
        let path = AttributePath::new(1, 0x0402, MEASURED_VALUE);

        let err = core
            .handle_update(path, &AttrValue::NullableI16(Some(101)))
            .unwrap_err();
        assert!(matches!(err, DriverError::OutOfRange { value: 101, min: -100, max: 100 }));
        assert!(core.last_reading().is_none());
    }

    #[test]
    fn test_rejects_wrong_type() {
        let core = core();
        let path = AttributePath::new(1, 0x0402, MEASURED_VALUE);

        let err = core
            .handle_update(path, &AttrValue::NullableU16(Some(5)))
            .unwrap_err();
        assert!(matches!(err, DriverError::TypeMismatch { .. }));
    }

    #[test]
    fn test_ignores_other_attributes() {
        let core = core();
        // Identify cluster on the same endpoint
        let path = AttributePath::new(1, 0x0003, 0);
        core.handle_update(path, &AttrValue::U16(10)).unwrap();
        assert!(core.last_reading().is_none());
    }

    #[test]
    fn test_check_default() {
        let core = core();
        assert!(core.check_default(0).is_ok());
        assert!(matches!(
            core.check_default(-101),
            Err(DriverError::InvalidConfig { driver: "test", .. })
        ));
        assert_eq!(core.range(), (-100, 100));
    }
}
