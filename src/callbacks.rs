//! Application callbacks registered with the Matter stack.
//!
//! - [`AppEventLogger`] logs device lifecycle events.
//! - [`AppIdentification`] logs identification requests.
//! - [`DriverDispatch`] forwards attribute pre-updates to the bound driver.

use std::sync::Arc;

use log::{debug, info};

use crate::driver::{DriverError, DriverId, DriverRegistry};
use crate::error::NodeError;
use crate::matter::attribute::{AttrValue, AttributePath, AttributeUpdateListener, EndpointId, UpdatePhase};

/// Device lifecycle events raised by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    InterfaceIpAddressChanged,
    CommissioningComplete,
    // rs-matter reports neither fail-safe expiry nor PASE sessions, so the
    // stack never raises the next three
    FailSafeTimerExpired,
    CommissioningSessionStarted,
    CommissioningSessionStopped,
    CommissioningWindowOpened,
    CommissioningWindowClosed,
    /// Event tag this application doesn't handle
    Other(u16),
}

impl DeviceEvent {
    /// Log line for the event, `None` for unhandled events.
    pub fn description(&self) -> Option<&'static str> {
        match self {
            Self::InterfaceIpAddressChanged => Some("Interface IP Address changed"),
            Self::CommissioningComplete => Some("Commissioning complete"),
            Self::FailSafeTimerExpired => {
                Some("Commissioning failed, fail safe timer expired")
            }
            Self::CommissioningSessionStarted => Some("Commissioning session started"),
            Self::CommissioningSessionStopped => Some("Commissioning session stopped"),
            Self::CommissioningWindowOpened => Some("Commissioning window opened"),
            Self::CommissioningWindowClosed => Some("Commissioning window closed"),
            Self::Other(_) => None,
        }
    }
}

/// Receives device lifecycle events.
pub trait DeviceEventListener: Send + Sync {
    fn on_device_event(&self, event: DeviceEvent);
}

/// Logs one line per recognized device event.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppEventLogger;

impl DeviceEventListener for AppEventLogger {
    fn on_device_event(&self, event: DeviceEvent) {
        if let Some(message) = event.description() {
            info!("{}", message);
        }
    }
}

/// Kind of identification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentificationKind {
    Start,
    Stop,
    Effect,
}

/// Receives identification requests from the Identify cluster.
pub trait IdentificationListener: Send + Sync {
    fn on_identification(
        &self,
        kind: IdentificationKind,
        endpoint_id: EndpointId,
        effect_id: u8,
        effect_variant: u8,
    ) -> Result<(), NodeError>;
}

/// Logs identification requests. The node has no indicator hardware to drive.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppIdentification;

impl IdentificationListener for AppIdentification {
    fn on_identification(
        &self,
        kind: IdentificationKind,
        endpoint_id: EndpointId,
        effect_id: u8,
        effect_variant: u8,
    ) -> Result<(), NodeError> {
        info!(
            "Identification callback: type: {:?}, effect: {}, variant: {}, endpoint: {}",
            kind, effect_id, effect_variant, endpoint_id
        );
        Ok(())
    }
}

/// Routes attribute pre-updates to the driver bound to the endpoint.
pub struct DriverDispatch {
    registry: Arc<DriverRegistry>,
}

impl DriverDispatch {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self { registry }
    }
}

impl AttributeUpdateListener for DriverDispatch {
    fn on_attribute_update(
        &self,
        phase: UpdatePhase,
        path: AttributePath,
        value: &AttrValue,
        driver: Option<DriverId>,
    ) -> Result<(), DriverError> {
        if phase != UpdatePhase::PreUpdate {
            return Ok(());
        }

        let Some(driver) = driver else {
            debug!("No driver bound for {}, accepting {}", path, value);
            return Ok(());
        };

        self.registry.handle_attribute_update(driver, path, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverUpdatable, Reading};
    use crate::matter::attribute::{AttributeError, AttributeUpdater};
    use parking_lot::Mutex;

    const ALL_EVENTS: [DeviceEvent; 7] = [
        DeviceEvent::InterfaceIpAddressChanged,
        DeviceEvent::CommissioningComplete,
        DeviceEvent::FailSafeTimerExpired,
        DeviceEvent::CommissioningSessionStarted,
        DeviceEvent::CommissioningSessionStopped,
        DeviceEvent::CommissioningWindowOpened,
        DeviceEvent::CommissioningWindowClosed,
    ];

    #[test]
    fn test_every_recognized_event_has_one_message() {
        let mut messages: Vec<_> = ALL_EVENTS.iter().filter_map(|e| e.description()).collect();
        assert_eq!(messages.len(), ALL_EVENTS.len());
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), ALL_EVENTS.len());

        assert_eq!(
            DeviceEvent::FailSafeTimerExpired.description(),
            Some("Commissioning failed, fail safe timer expired")
        );
        assert_eq!(DeviceEvent::Other(0x8000).description(), None);

        // Logging never fails, recognized or not
        AppEventLogger.on_device_event(DeviceEvent::Other(42));
        AppEventLogger.on_device_event(DeviceEvent::CommissioningComplete);
    }

    #[test]
    fn test_identification_always_ok() {
        for kind in [
            IdentificationKind::Start,
            IdentificationKind::Stop,
            IdentificationKind::Effect,
        ] {
            assert!(AppIdentification.on_identification(kind, 1, 0, 0).is_ok());
        }
    }

    /// Driver recording every call and returning a preset result.
    struct FakeDriver {
        calls: Mutex<Vec<(AttributePath, AttrValue)>>,
        reject: bool,
    }

    impl FakeDriver {
        fn new(reject: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reject,
            }
        }
    }

    impl DriverUpdatable for FakeDriver {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn handle_attribute_update(&self, path: AttributePath, value: &AttrValue) -> Result<(), DriverError> {
            self.calls.lock().push((path, *value));
            if self.reject {
                Err(DriverError::OutOfRange {
                    value: 1,
                    min: 2,
                    max: 3,
                })
            } else {
                Ok(())
            }
        }

        fn set_defaults(&self, _endpoint_id: EndpointId, _attributes: &AttributeUpdater) -> Result<(), AttributeError> {
            Ok(())
        }

        fn last_reading(&self) -> Option<Reading> {
            None
        }
    }

    fn dispatch(reject: bool) -> (DriverDispatch, Arc<FakeDriver>, DriverId) {
        let driver = Arc::new(FakeDriver::new(reject));
        let mut registry = DriverRegistry::new();
        let id = registry.register(driver.clone());
        (DriverDispatch::new(Arc::new(registry)), driver, id)
    }

    #[test]
    fn test_pre_update_calls_driver_once() {
        let (dispatch, driver, id) = dispatch(false);
        let path = AttributePath::new(1, 0x0402, 0);
        let value = AttrValue::NullableI16(Some(2150));

        dispatch
            .on_attribute_update(UpdatePhase::PreUpdate, path, &value, Some(id))
            .unwrap();

        let calls = driver.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (path, value));
    }

    #[test]
    fn test_pre_update_propagates_driver_error() {
        let (dispatch, driver, id) = dispatch(true);
        let path = AttributePath::new(2, 0x0403, 0);

        let err = dispatch
            .on_attribute_update(
                UpdatePhase::PreUpdate,
                path,
                &AttrValue::NullableI16(Some(1)),
                Some(id),
            )
            .unwrap_err();

        assert!(matches!(err, DriverError::OutOfRange { value: 1, min: 2, max: 3 }));
        assert_eq!(driver.calls.lock().len(), 1);
    }

    #[test]
    fn test_post_update_and_unbound_do_not_call_driver() {
        let (dispatch, driver, id) = dispatch(true);
        let path = AttributePath::new(1, 0x0402, 0);
        let value = AttrValue::NullableI16(Some(1));

        dispatch
            .on_attribute_update(UpdatePhase::PostUpdate, path, &value, Some(id))
            .unwrap();
        dispatch
            .on_attribute_update(UpdatePhase::PreUpdate, path, &value, None)
            .unwrap();

        assert!(driver.calls.lock().is_empty());
    }
}
