//! Device type definitions for the sensor node.
//!
//! Each sensor endpoint carries one of the measurement device types. The
//! humidity endpoint additionally carries Power Source when it is battery
//! powered.

use rs_matter::dm::DeviceType;

/// Matter Power Source device type
///
/// Device Type ID: 0x0011 (17 decimal)
/// Device Type Revision: 1
///
/// Required clusters:
/// - PowerSource (0x002F)
/// - Descriptor (standard)
pub const DEV_TYPE_POWER_SOURCE: DeviceType = DeviceType {
    dtype: 0x0011,
    drev: 1,
};

/// Matter Temperature Sensor device type
///
/// Device Type ID: 0x0302 (770 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - Identify (0x0003)
/// - TemperatureMeasurement (0x0402)
/// - Descriptor (standard)
pub const DEV_TYPE_TEMPERATURE_SENSOR: DeviceType = DeviceType {
    dtype: 0x0302,
    drev: 2,
};

/// Matter Pressure Sensor device type
///
/// Device Type ID: 0x0305 (773 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - Identify (0x0003)
/// - PressureMeasurement (0x0403)
/// - Descriptor (standard)
pub const DEV_TYPE_PRESSURE_SENSOR: DeviceType = DeviceType {
    dtype: 0x0305,
    drev: 2,
};

/// Matter Humidity Sensor device type
///
/// Device Type ID: 0x0307 (775 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - Identify (0x0003)
/// - RelativeHumidityMeasurement (0x0405)
/// - Descriptor (standard)
pub const DEV_TYPE_HUMIDITY_SENSOR: DeviceType = DeviceType {
    dtype: 0x0307,
    drev: 2,
};
