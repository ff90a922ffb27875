//! Reset button driver.
//!
//! A momentary button that triggers a factory reset when held long enough.
//! On the host build the button is pressed from the shell.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::DriverError;
use crate::storage::{NvsStore, StorageError};

/// How long the button must be held to trigger a factory reset
pub const FACTORY_RESET_HOLD: Duration = Duration::from_secs(5);

/// Action run by a long press.
pub trait ResetAction: Send + Sync {
    fn factory_reset(&self) -> Result<(), StorageError>;
}

/// What a press resulted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// Short press, nothing happens
    Short,
    /// Long press with no reset action registered
    Unhandled,
    /// Long press, the factory reset ran
    FactoryReset,
    /// Long press, the factory reset failed
    ResetFailed,
}

pub struct ButtonDriver {
    hold_threshold: Duration,
    reset: RwLock<Option<Arc<dyn ResetAction>>>,
}

impl ButtonDriver {
    pub fn init(hold_threshold: Duration) -> Result<Self, DriverError> {
        if hold_threshold.is_zero() {
            return Err(DriverError::InvalidConfig {
                driver: "button",
                reason: "hold threshold must be non-zero".to_string(),
            });
        }
        Ok(Self {
            hold_threshold,
            reset: RwLock::new(None),
        })
    }

    /// Register the action run on a long press, replacing any previous one.
    pub fn register_reset(&self, action: Arc<dyn ResetAction>) {
        *self.reset.write() = Some(action);
    }

    pub fn hold_threshold(&self) -> Duration {
        self.hold_threshold
    }

    /// Report a press that lasted `held`.
    pub fn press(&self, held: Duration) -> PressOutcome {
        if held < self.hold_threshold {
            info!("[Button] Short press ({} ms)", held.as_millis());
            return PressOutcome::Short;
        }

        let Some(action) = self.reset.read().clone() else {
            warn!("[Button] Long press but no reset action registered");
            return PressOutcome::Unhandled;
        };

        info!("[Button] Long press ({} ms), factory reset", held.as_millis());
        match action.factory_reset() {
            Ok(()) => PressOutcome::FactoryReset,
            Err(e) => {
                error!("[Button] Factory reset failed: {}", e);
                PressOutcome::ResetFailed
            }
        }
    }
}

/// Factory reset: erase persistent storage and request a restart.
pub struct FactoryReset {
    store: Arc<NvsStore>,
    restart: CancellationToken,
}

impl FactoryReset {
    pub fn new(store: Arc<NvsStore>, restart: CancellationToken) -> Self {
        Self { store, restart }
    }
}

impl ResetAction for FactoryReset {
    fn factory_reset(&self) -> Result<(), StorageError> {
        self.store.erase_all()?;
        info!("[Button] Storage erased, restarting node");
        self.restart.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::keys;

    #[test]
    fn test_init_rejects_zero_threshold() {
        assert!(ButtonDriver::init(Duration::ZERO).is_err());
        assert_eq!(
            ButtonDriver::init(FACTORY_RESET_HOLD).unwrap().hold_threshold(),
            FACTORY_RESET_HOLD
        );
    }

    #[test]
    fn test_short_press_does_not_reset() {
        let store = Arc::new(NvsStore::volatile());
        store.increment(keys::BOOT_COUNT).unwrap();
        let token = CancellationToken::new();

        let button = ButtonDriver::init(FACTORY_RESET_HOLD).unwrap();
        button.register_reset(Arc::new(FactoryReset::new(store.clone(), token.clone())));

        assert_eq!(button.press(Duration::from_millis(300)), PressOutcome::Short);
        assert_eq!(store.get_u64(keys::BOOT_COUNT), Some(1));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_long_press_erases_and_requests_restart() {
        let store = Arc::new(NvsStore::volatile());
        store.increment(keys::BOOT_COUNT).unwrap();
        let token = CancellationToken::new();

        let button = ButtonDriver::init(FACTORY_RESET_HOLD).unwrap();
        button.register_reset(Arc::new(FactoryReset::new(store.clone(), token.clone())));

        assert_eq!(button.press(FACTORY_RESET_HOLD), PressOutcome::FactoryReset);
        assert_eq!(store.get_u64(keys::BOOT_COUNT), None);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_long_press_without_action() {
        let button = ButtonDriver::init(FACTORY_RESET_HOLD).unwrap();
        assert_eq!(
            button.press(Duration::from_secs(10)),
            PressOutcome::Unhandled
        );
    }
}
