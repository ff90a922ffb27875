mod device_info;
mod handler;
mod lifecycle;
mod logging_udp;
mod stack;

pub mod attribute;
pub mod clusters;
pub mod device_types;
pub mod netif;
pub mod node;
pub mod notifier;

pub use device_info::{comm_data, device_info, serial_number};
pub use stack::{StackContext, run_matter_stack};

pub use attribute::{
    AttrValue, AttributeBinding, AttributeError, AttributePath, AttributeUpdater, EndpointId,
    UpdatePhase,
};
pub use notifier::ClusterNotifier;
pub use node::{
    EndpointKind, HumiditySensorConfig, NodeBuilder, NodeModel, PowerSourceConfig,
    PressureSensorConfig, TemperatureSensorConfig,
};
