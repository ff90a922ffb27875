//! Interactive console on stdin.
//!
//! Each line is parsed with clap as a subcommand, for example
//! `set temperature 2150` or `identify 1 10`.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use log::{error, info};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::driver::{FACTORY_RESET_HOLD, PressOutcome};
use crate::matter::clusters::measurement::MEASURED_VALUE;
use crate::matter::netif::{resolve_interface, scan_interface};
use crate::matter::{AttrValue, AttributeError, EndpointId, EndpointKind};
use crate::node::SensorNode;
use crate::onboarding::OnboardingInfo;
use crate::storage::keys;

/// Error types for console commands.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The line is not a valid command.
    #[error("{0}")]
    Parse(String),

    /// The node has no endpoint for this sensor.
    #[error("no {0} endpoint on this node")]
    NoEndpoint(EndpointKind),

    /// The raw value does not fit the attribute type.
    #[error("{raw} is not a valid {kind} value")]
    InvalidValue { kind: EndpointKind, raw: i64 },

    /// No reset button was initialized.
    #[error("reset button unavailable")]
    NoButton,

    /// The network interface could not be read.
    #[error("network interface unavailable: {0}")]
    Interface(String),

    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

#[derive(Parser, Debug)]
#[command(name = "sensor-node", no_binary_name = true, disable_version_flag = true)]
struct Line {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum ShellCommand {
    /// Boot count, storage and endpoint readings
    Diagnostics,
    /// Addresses of the Matter network interface
    Netif,
    /// Manual pairing code and commissioning details
    Onboarding,
    /// Push a raw MeasuredValue to a sensor endpoint
    Set {
        /// temperature, pressure or humidity
        kind: EndpointKind,
        /// Value in cluster units (0.01°C, 0.1 kPa, 0.01 %RH)
        #[arg(allow_negative_numbers = true)]
        raw: i64,
    },
    /// Start (or with 0 stop) identification on an endpoint
    Identify { endpoint: EndpointId, secs: u16 },
    /// Long-press the reset button: erase storage and restart
    FactoryReset,
}

/// Executes console commands against the node.
pub struct Console {
    node: Arc<SensorNode>,
    onboarding: OnboardingInfo,
    interface: Option<String>,
}

impl Console {
    pub fn new(node: Arc<SensorNode>, onboarding: OnboardingInfo, interface: Option<String>) -> Self {
        Self {
            node,
            onboarding,
            interface,
        }
    }

    /// Run one command line and return its output.
    pub fn execute(&self, line: &str) -> Result<String, ShellError> {
        let parsed = match Line::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::DisplayHelp
                        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) =>
            {
                return Ok(e.render().to_string());
            }
            Err(e) => return Err(ShellError::Parse(e.render().to_string())),
        };

        match parsed.command {
            ShellCommand::Diagnostics => Ok(self.diagnostics()),
            ShellCommand::Netif => self.netif(),
            ShellCommand::Onboarding => Ok(self.onboarding.to_string()),
            ShellCommand::Set { kind, raw } => self.set(kind, raw),
            ShellCommand::Identify { endpoint, secs } => {
                self.node.identify().identify(endpoint, secs)?;
                Ok(format!("Identify on endpoint {} for {}s", endpoint, secs))
            }
            ShellCommand::FactoryReset => self.factory_reset(),
        }
    }

    fn diagnostics(&self) -> String {
        let store = self.node.store();
        let mut out = format!(
            "Boot count: {}\nFactory resets: {}\nStorage: {}\n",
            store.get_u64(keys::BOOT_COUNT).unwrap_or(0),
            store.get_u64(keys::FACTORY_RESETS).unwrap_or(0),
            if store.is_persistent() { "persistent" } else { "volatile" },
        );

        for entry in self.node.model().endpoints() {
            let value = self
                .node
                .attributes()
                .value(entry.id, entry.kind.cluster_id(), MEASURED_VALUE)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            let driver = entry
                .driver
                .map(|d| d.to_string())
                .unwrap_or_else(|| "unbound".to_string());
            out.push_str(&format!(
                "Endpoint {}: {} = {} ({})\n",
                entry.id, entry.kind, value, driver
            ));
        }
        out
    }

    fn netif(&self) -> Result<String, ShellError> {
        let name = resolve_interface(self.interface.as_deref())
            .map_err(|e| ShellError::Interface(format!("{:?}", e)))?;
        let snapshot =
            scan_interface(&name).ok_or_else(|| ShellError::Interface(name.clone()))?;

        let mut out = format!(
            "{} (index {}, {})\n",
            snapshot.name,
            snapshot.index,
            if snapshot.operational { "up" } else { "down" }
        );
        for addr in snapshot.addresses() {
            out.push_str(&format!("  {}\n", addr));
        }
        Ok(out)
    }

    fn set(&self, kind: EndpointKind, raw: i64) -> Result<String, ShellError> {
        let endpoint = self
            .node
            .context()
            .endpoint_id(kind)
            .ok_or(ShellError::NoEndpoint(kind))?;

        let invalid = || ShellError::InvalidValue { kind, raw };
        let value = match kind {
            EndpointKind::Temperature | EndpointKind::Pressure => {
                AttrValue::NullableI16(Some(i16::try_from(raw).map_err(|_| invalid())?))
            }
            EndpointKind::Humidity => {
                AttrValue::NullableU16(Some(u16::try_from(raw).map_err(|_| invalid())?))
            }
        };

        self.node
            .attributes()
            .update(endpoint, kind.cluster_id(), MEASURED_VALUE, value)?;
        Ok(format!("{} endpoint {} set to {}", kind, endpoint, value))
    }

    fn factory_reset(&self) -> Result<String, ShellError> {
        let button = self.node.button().ok_or(ShellError::NoButton)?;
        Ok(match button.press(FACTORY_RESET_HOLD) {
            PressOutcome::FactoryReset => "Factory reset done, restarting".to_string(),
            outcome => format!("Factory reset not performed: {:?}", outcome),
        })
    }
}

/// Read commands from stdin on a dedicated thread until EOF or cancellation.
pub fn run_shell(console: Console, token: CancellationToken) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("shell".into()).spawn(move || {
        info!("[Shell] Console ready, type 'help' for commands");
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            if token.is_cancelled() {
                break;
            }
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("[Shell] Failed to read stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let mut stdout = io::stdout().lock();
            let _ = match console.execute(&line) {
                Ok(output) => write!(stdout, "{}", output),
                Err(e) => writeln!(stdout, "Error: {}", e),
            };
            let _ = stdout.flush();
        }
        info!("[Shell] Console closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::driver::DriverError;
    use crate::storage::NvsStore;

    fn console_with_token() -> (Console, CancellationToken) {
        let config = Config::default();
        let token = CancellationToken::new();
        let store = Arc::new(NvsStore::volatile());
        store.increment(keys::BOOT_COUNT).unwrap();
        let node = Arc::new(SensorNode::bootstrap(&config, store, token.clone()));
        let console = Console::new(node, OnboardingInfo::from_config(&config.matter), None);
        (console, token)
    }

    fn console() -> Console {
        console_with_token().0
    }

    #[test]
    fn test_parse_commands() {
        let parse = |line: &str| Line::try_parse_from(line.split_whitespace()).map(|l| l.command);

        assert_eq!(parse("diagnostics").unwrap(), ShellCommand::Diagnostics);
        assert_eq!(
            parse("set temperature -500").unwrap(),
            ShellCommand::Set {
                kind: EndpointKind::Temperature,
                raw: -500
            }
        );
        assert_eq!(
            parse("identify 2 15").unwrap(),
            ShellCommand::Identify {
                endpoint: 2,
                secs: 15
            }
        );
        assert_eq!(parse("factory-reset").unwrap(), ShellCommand::FactoryReset);
        assert!(parse("set wind 5").is_err());
        assert!(parse("reboot").is_err());
    }

    #[test]
    fn test_help_lists_commands() {
        let help = console().execute("help").unwrap();
        assert!(help.contains("onboarding"));
        assert!(help.contains("factory-reset"));
    }

    #[test]
    fn test_set_updates_measured_value() {
        let console = console();
        console.execute("set pressure 990").unwrap();

        let ep = console.node.context().pressure.unwrap();
        assert_eq!(
            console.node.attributes().value(
                ep,
                EndpointKind::Pressure.cluster_id(),
                MEASURED_VALUE
            ),
            Some(AttrValue::NullableI16(Some(990)))
        );
        assert!(console.execute("diagnostics").unwrap().contains("pressure = 990"));
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let console = console();
        assert!(matches!(
            console.execute("set humidity -1"),
            Err(ShellError::InvalidValue { .. })
        ));
        assert!(matches!(
            console.execute("set humidity 10001"),
            Err(ShellError::Attribute(AttributeError::Rejected(
                DriverError::OutOfRange { .. }
            )))
        ));
        assert!(matches!(
            console.execute("set"),
            Err(ShellError::Parse(_))
        ));
    }

    #[test]
    fn test_onboarding_and_identify() {
        let console = console();
        assert!(console.execute("onboarding").unwrap().contains("3497-011-2332"));

        console.execute("identify 1 10").unwrap();
        let state = console.node.identify().state(1).unwrap();
        assert!(state.is_identifying(std::time::Instant::now()));

        assert!(console.execute("identify 9 10").is_err());
    }

    #[test]
    fn test_factory_reset_cancels_token() {
        let (console, token) = console_with_token();
        assert_eq!(
            console.node.store().get_u64(keys::BOOT_COUNT),
            Some(1)
        );

        let out = console.execute("factory-reset").unwrap();
        assert!(out.contains("restarting"));
        assert!(token.is_cancelled());
        assert_eq!(console.node.store().get_u64(keys::BOOT_COUNT), None);
        assert_eq!(console.node.store().get_u64(keys::FACTORY_RESETS), Some(1));
    }
}
