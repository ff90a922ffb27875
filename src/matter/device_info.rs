//! Device information for the Matter stack.
//!
//! Built from [`MatterConfig`] instead of rs-matter's test defaults. rs-matter
//! keeps `&'static` references to these values, so they are created once per
//! process.

use std::sync::OnceLock;

use rs_matter::BasicCommData;
use rs_matter::dm::clusters::basic_info::BasicInfoConfig;

use crate::config::MatterConfig;

pub const VENDOR_NAME: &str = "matter-sensor-node";
pub const PRODUCT_NAME: &str = "Matter Sensor Node";

static DEV_INFO: OnceLock<BasicInfoConfig<'static>> = OnceLock::new();

/// BasicInformation serial number for a device identifier.
pub fn serial_number(device_id: u16) -> String {
    format!("SN-{:05}", device_id)
}

/// Device details for the BasicInformation cluster.
///
/// The first call wins; later calls return the same details.
pub fn device_info(config: &MatterConfig) -> &'static BasicInfoConfig<'static> {
    DEV_INFO.get_or_init(|| {
        let serial_no: &'static str = Box::leak(serial_number(config.device_id).into_boxed_str());
        let device_name: &'static str = Box::leak(config.device_name.clone().into_boxed_str());

        BasicInfoConfig {
            vid: config.vendor_id,
            pid: config.product_id,
            hw_ver: 1,
            hw_ver_str: "1",
            sw_ver: 1,
            sw_ver_str: env!("CARGO_PKG_VERSION"),
            serial_no,
            device_name,
            product_name: PRODUCT_NAME,
            vendor_name: VENDOR_NAME,
            ..BasicInfoConfig::new()
        }
    })
}

/// Commissioning credentials (passcode and discriminator).
pub fn comm_data(config: &MatterConfig) -> BasicCommData {
    BasicCommData {
        password: config.passcode,
        discriminator: config.discriminator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_serial_number() {
        assert_eq!(serial_number(1), "SN-00001");
        assert_eq!(serial_number(4711), "SN-04711");
    }

    #[test]
    fn test_comm_data_from_config() {
        let config = Config::default();
        let comm = comm_data(&config.matter);
        assert_eq!(comm.password, 20202021);
        assert_eq!(comm.discriminator, 3840);
    }
}
