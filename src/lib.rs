//! Matter sensor node library.
//!
//! A Matter node with temperature, pressure and humidity sensor endpoints,
//! built on rs-matter.

#![recursion_limit = "256"]

pub mod callbacks;
pub mod config;
pub mod driver;
pub mod error;
pub mod instance_lock;
pub mod matter;
pub mod node;
pub mod onboarding;
#[cfg(feature = "shell")]
pub mod shell;
pub mod simulation;
pub mod storage;

pub use error::{NodeError, Result};
pub use node::{NodeContext, SensorNode};
