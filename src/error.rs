use thiserror::Error as ThisError;

use crate::driver::DriverError;
use crate::matter::attribute::AttributeError;
use crate::storage::StorageError;

#[derive(ThisError, Debug)]
pub enum NodeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Attribute update failed: {0}")]
    Attribute(#[from] AttributeError),

    #[error("Endpoint creation failed for {kind}: {reason}")]
    EndpointCreationFailed { kind: &'static str, reason: String },

    #[error("Node endpoint table is full ({0} endpoints)")]
    EndpointCapacityReached(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;
