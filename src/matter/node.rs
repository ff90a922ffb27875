//! Declarative node and endpoint construction.
//!
//! [`NodeBuilder`] takes one config per sensor endpoint, assigns endpoint ids
//! from 1 upwards and creates the cluster state behind each endpoint.
//! The resulting [`NodeModel`] yields the rs-matter `Node` metadata and the
//! attribute bindings used by [`AttributeUpdater`](super::attribute::AttributeUpdater).

use std::sync::Arc;

use log::info;
use rs_matter::dm::clusters::desc;
use rs_matter::dm::clusters::net_comm::NetworkType;
use rs_matter::dm::{Cluster, DeviceType, Endpoint, Node, endpoints};
use rs_matter::{clusters, devices};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::attribute::{AttributeBinding, AttributeSink, EndpointId};
use super::clusters::{
    IdentifyState, MeasuredValues, Measurement, PowerSourceState, identify, power_source,
    pressure_measurement, relative_humidity, temperature_measurement,
};
use super::device_types::{
    DEV_TYPE_HUMIDITY_SENSOR, DEV_TYPE_POWER_SOURCE, DEV_TYPE_PRESSURE_SENSOR,
    DEV_TYPE_TEMPERATURE_SENSOR,
};
use crate::driver::DriverId;
use crate::driver::humidity::{MAX_CENTI_PERCENT, MIN_CENTI_PERCENT};
use crate::driver::pressure::{MAX_DECI_KPA, MIN_DECI_KPA};
use crate::driver::temperature::{MAX_CENTI_CELSIUS, MIN_CENTI_CELSIUS};
use crate::error::{NodeError, Result};

/// Maximum number of application endpoints on the node
pub const MAX_ENDPOINTS: usize = 8;

const TEMPERATURE_DEVICE_TYPES: &[DeviceType] = devices!(DEV_TYPE_TEMPERATURE_SENSOR);
const TEMPERATURE_CLUSTERS: &[Cluster<'static>] = clusters!(
    desc::DescHandler::CLUSTER,
    identify::CLUSTER,
    temperature_measurement::CLUSTER
);

const PRESSURE_DEVICE_TYPES: &[DeviceType] = devices!(DEV_TYPE_PRESSURE_SENSOR);
const PRESSURE_CLUSTERS: &[Cluster<'static>] = clusters!(
    desc::DescHandler::CLUSTER,
    identify::CLUSTER,
    pressure_measurement::CLUSTER
);

const HUMIDITY_DEVICE_TYPES: &[DeviceType] = devices!(DEV_TYPE_HUMIDITY_SENSOR);
const HUMIDITY_CLUSTERS: &[Cluster<'static>] = clusters!(
    desc::DescHandler::CLUSTER,
    identify::CLUSTER,
    relative_humidity::CLUSTER
);

const BATTERY_HUMIDITY_DEVICE_TYPES: &[DeviceType] =
    devices!(DEV_TYPE_HUMIDITY_SENSOR, DEV_TYPE_POWER_SOURCE);
const BATTERY_HUMIDITY_CLUSTERS: &[Cluster<'static>] = clusters!(
    desc::DescHandler::CLUSTER,
    identify::CLUSTER,
    relative_humidity::CLUSTER,
    power_source::CLUSTER
);

/// Sensor role of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum EndpointKind {
    Temperature,
    Pressure,
    Humidity,
}

impl EndpointKind {
    /// Measurement cluster served by endpoints of this kind.
    pub fn cluster_id(&self) -> u32 {
        match self {
            Self::Temperature => temperature_measurement::CLUSTER_ID,
            Self::Pressure => pressure_measurement::CLUSTER_ID,
            Self::Humidity => relative_humidity::CLUSTER_ID,
        }
    }
}

/// Temperature sensor endpoint configuration, centidegrees Celsius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureSensorConfig {
    pub measured_value: Option<i16>,
    pub min_measured_value: Option<i16>,
    pub max_measured_value: Option<i16>,
    pub tolerance: u16,
}

impl Default for TemperatureSensorConfig {
    fn default() -> Self {
        Self {
            measured_value: None,
            min_measured_value: Some(MIN_CENTI_CELSIUS),
            max_measured_value: Some(MAX_CENTI_CELSIUS),
            tolerance: 0,
        }
    }
}

/// Pressure sensor endpoint configuration, 0.1 kPa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureSensorConfig {
    pub measured_value: Option<i16>,
    pub min_measured_value: Option<i16>,
    pub max_measured_value: Option<i16>,
    pub tolerance: u16,
}

impl Default for PressureSensorConfig {
    fn default() -> Self {
        Self {
            measured_value: None,
            min_measured_value: Some(MIN_DECI_KPA),
            max_measured_value: Some(MAX_DECI_KPA),
            tolerance: 0,
        }
    }
}

/// Battery attached to an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSourceConfig {
    pub description: String,
    /// Initial charge, 0-100; `None` reports the charge as unknown
    pub battery_percent: Option<u8>,
}

/// Humidity sensor endpoint configuration, centi-percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumiditySensorConfig {
    pub measured_value: Option<u16>,
    pub min_measured_value: Option<u16>,
    pub max_measured_value: Option<u16>,
    pub tolerance: u16,
    /// Adds a PowerSource cluster to the endpoint when set
    pub power_source: Option<PowerSourceConfig>,
}

impl Default for HumiditySensorConfig {
    fn default() -> Self {
        Self {
            measured_value: None,
            min_measured_value: Some(MIN_CENTI_PERCENT),
            max_measured_value: Some(MAX_CENTI_PERCENT),
            tolerance: 0,
            power_source: None,
        }
    }
}

/// Cluster state behind a sensor endpoint.
#[derive(Clone)]
pub enum EndpointState {
    Temperature(Arc<Measurement<i16>>),
    Pressure(Arc<Measurement<i16>>),
    Humidity {
        measurement: Arc<Measurement<u16>>,
        power_source: Option<Arc<PowerSourceState>>,
    },
}

/// One application endpoint of the node.
#[derive(Clone)]
pub struct EndpointEntry {
    pub id: EndpointId,
    pub kind: EndpointKind,
    pub driver: Option<DriverId>,
    pub identify: Arc<IdentifyState>,
    pub state: EndpointState,
}

impl EndpointEntry {
    /// rs-matter metadata for this endpoint.
    fn endpoint(&self) -> Endpoint<'static> {
        let (device_types, clusters) = match &self.state {
            EndpointState::Temperature(_) => (TEMPERATURE_DEVICE_TYPES, TEMPERATURE_CLUSTERS),
            EndpointState::Pressure(_) => (PRESSURE_DEVICE_TYPES, PRESSURE_CLUSTERS),
            EndpointState::Humidity {
                power_source: None,
                ..
            } => (HUMIDITY_DEVICE_TYPES, HUMIDITY_CLUSTERS),
            EndpointState::Humidity {
                power_source: Some(_),
                ..
            } => (BATTERY_HUMIDITY_DEVICE_TYPES, BATTERY_HUMIDITY_CLUSTERS),
        };

        Endpoint {
            id: self.id,
            device_types,
            clusters,
        }
    }

    fn bindings(&self) -> Vec<AttributeBinding> {
        let binding = |cluster_id: u32, sink: Arc<dyn AttributeSink>| AttributeBinding {
            endpoint_id: self.id,
            cluster_id,
            driver: self.driver,
            sink,
        };

        let mut bindings = vec![binding(identify::CLUSTER_ID, self.identify.clone())];
        match &self.state {
            EndpointState::Temperature(m) | EndpointState::Pressure(m) => {
                bindings.push(binding(self.kind.cluster_id(), m.clone()));
            }
            EndpointState::Humidity {
                measurement,
                power_source: battery,
            } => {
                bindings.push(binding(self.kind.cluster_id(), measurement.clone()));
                if let Some(power) = battery {
                    bindings.push(binding(power_source::CLUSTER_ID, power.clone()));
                }
            }
        }
        bindings
    }
}

fn check_range<T: PartialOrd + Copy + std::fmt::Display>(
    kind: &'static str,
    measured: Option<T>,
    min: Option<T>,
    max: Option<T>,
) -> Result<()> {
    let fail = |reason: String| NodeError::EndpointCreationFailed { kind, reason };

    if let (Some(min), Some(max)) = (min, max)
        && min > max
    {
        return Err(fail(format!("min {} above max {}", min, max)));
    }
    if let Some(v) = measured {
        if let Some(min) = min
            && v < min
        {
            return Err(fail(format!("measured value {} below min {}", v, min)));
        }
        if let Some(max) = max
            && v > max
        {
            return Err(fail(format!("measured value {} above max {}", v, max)));
        }
    }
    Ok(())
}

/// Builds the endpoint table of the node.
#[derive(Default)]
pub struct NodeBuilder {
    entries: heapless::Vec<EndpointEntry, MAX_ENDPOINTS>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> EndpointId {
        self.entries.len() as EndpointId + 1
    }

    fn push(&mut self, kind: EndpointKind, driver: Option<DriverId>, state: EndpointState) -> Result<EndpointId> {
        let entry = EndpointEntry {
            id: self.next_id(),
            kind,
            driver,
            identify: Arc::new(IdentifyState::new()),
            state,
        };
        let id = entry.id;
        self.entries
            .push(entry)
            .map_err(|_| NodeError::EndpointCapacityReached(MAX_ENDPOINTS))?;
        info!("[Node] Created {} endpoint {}", kind, id);
        Ok(id)
    }

    fn ensure_capacity(&self) -> Result<()> {
        if self.entries.is_full() {
            return Err(NodeError::EndpointCapacityReached(MAX_ENDPOINTS));
        }
        Ok(())
    }

    pub fn add_temperature_sensor(
        &mut self,
        config: &TemperatureSensorConfig,
        driver: Option<DriverId>,
    ) -> Result<EndpointId> {
        self.ensure_capacity()?;
        check_range(
            "temperature",
            config.measured_value,
            config.min_measured_value,
            config.max_measured_value,
        )?;
        let state = Arc::new(Measurement::new(MeasuredValues {
            measured: config.measured_value,
            min: config.min_measured_value,
            max: config.max_measured_value,
            tolerance: config.tolerance,
        }));
        self.push(EndpointKind::Temperature, driver, EndpointState::Temperature(state))
    }

    pub fn add_pressure_sensor(
        &mut self,
        config: &PressureSensorConfig,
        driver: Option<DriverId>,
    ) -> Result<EndpointId> {
        self.ensure_capacity()?;
        check_range(
            "pressure",
            config.measured_value,
            config.min_measured_value,
            config.max_measured_value,
        )?;
        let state = Arc::new(Measurement::new(MeasuredValues {
            measured: config.measured_value,
            min: config.min_measured_value,
            max: config.max_measured_value,
            tolerance: config.tolerance,
        }));
        self.push(EndpointKind::Pressure, driver, EndpointState::Pressure(state))
    }

    pub fn add_humidity_sensor(
        &mut self,
        config: &HumiditySensorConfig,
        driver: Option<DriverId>,
    ) -> Result<EndpointId> {
        self.ensure_capacity()?;
        check_range(
            "humidity",
            config.measured_value,
            config.min_measured_value,
            config.max_measured_value,
        )?;

        let power_source = match &config.power_source {
            Some(PowerSourceConfig {
                battery_percent: Some(percent),
                ..
            }) if *percent > 100 => {
                return Err(NodeError::EndpointCreationFailed {
                    kind: "humidity",
                    reason: format!("battery level {}% above 100%", percent),
                });
            }
            Some(power) => Some(Arc::new(PowerSourceState::new(
                power.description.clone(),
                power.battery_percent.map(|percent| percent * 2),
            ))),
            None => None,
        };

        let measurement = Arc::new(Measurement::new(MeasuredValues {
            measured: config.measured_value,
            min: config.min_measured_value,
            max: config.max_measured_value,
            tolerance: config.tolerance,
        }));
        self.push(
            EndpointKind::Humidity,
            driver,
            EndpointState::Humidity {
                measurement,
                power_source,
            },
        )
    }

    pub fn build(self) -> NodeModel {
        NodeModel {
            entries: self.entries.into_iter().collect(),
        }
    }
}

/// The node's application endpoints, built once at startup.
pub struct NodeModel {
    entries: Vec<EndpointEntry>,
}

impl NodeModel {
    pub fn endpoints(&self) -> &[EndpointEntry] {
        &self.entries
    }

    pub fn endpoint(&self, id: EndpointId) -> Option<&EndpointEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Id of the first endpoint of `kind`.
    pub fn endpoint_id(&self, kind: EndpointKind) -> Option<EndpointId> {
        self.entries.iter().find(|e| e.kind == kind).map(|e| e.id)
    }

    /// Bindings of every cluster with updatable state.
    pub fn attribute_bindings(&self) -> Vec<AttributeBinding> {
        self.entries.iter().flat_map(EndpointEntry::bindings).collect()
    }

    /// rs-matter node metadata: the Ethernet root endpoint plus every sensor endpoint.
    ///
    /// The endpoint table is leaked; call once per process.
    pub fn matter_node(&self) -> Node<'static> {
        let table: Vec<Endpoint<'static>> =
            std::iter::once(endpoints::root_endpoint(NetworkType::Ethernet))
                .chain(self.entries.iter().map(EndpointEntry::endpoint))
                .collect();

        Node {
            id: 0,
            endpoints: Box::leak(table.into_boxed_slice()),
        }
    }
}
