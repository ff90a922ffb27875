//! Sensor node bootstrap.
//!
//! Brings up drivers and endpoints in order and wires the callbacks between
//! them. Nothing here halts startup: a failed driver leaves its endpoint
//! unbound with unknown values and a failed endpoint is left out of the node.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::callbacks::{AppIdentification, DeviceEventListener, DriverDispatch};
use crate::config::{Config, MatterConfig, SensorDefaults};
use crate::driver::{
    ButtonDriver, DriverError, DriverId, DriverRegistry, DriverUpdatable, FACTORY_RESET_HOLD,
    FactoryReset, HumidityDriver, PressureDriver, TemperatureDriver,
};
use crate::error::Result;
use crate::matter::clusters::IdentifyControl;
use crate::matter::node::{
    EndpointKind, HumiditySensorConfig, NodeBuilder, NodeModel, PowerSourceConfig,
    PressureSensorConfig, TemperatureSensorConfig,
};
use crate::matter::{AttributeUpdater, EndpointId, StackContext};
use crate::storage::NvsStore;

/// Description published by the humidity sensor's PowerSource cluster
const BATTERY_DESCRIPTION: &str = "Primary Battery";

/// Endpoint ids of the sensor roles; `None` when the endpoint couldn't be created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeContext {
    pub temperature: Option<EndpointId>,
    pub pressure: Option<EndpointId>,
    pub humidity: Option<EndpointId>,
}

impl NodeContext {
    pub fn endpoint_id(&self, kind: EndpointKind) -> Option<EndpointId> {
        match kind {
            EndpointKind::Temperature => self.temperature,
            EndpointKind::Pressure => self.pressure,
            EndpointKind::Humidity => self.humidity,
        }
    }
}

fn register_driver<D: DriverUpdatable + 'static>(
    registry: &mut DriverRegistry,
    kind: EndpointKind,
    driver: std::result::Result<D, DriverError>,
) -> Option<DriverId> {
    match driver {
        Ok(driver) => Some(registry.register(Arc::new(driver))),
        Err(e) => {
            error!("[Node] Failed to initialize {} driver: {}", kind, e);
            None
        }
    }
}

fn log_endpoint(kind: EndpointKind, result: Result<EndpointId>) -> Option<EndpointId> {
    match result {
        Ok(id) => Some(id),
        Err(e) => {
            error!("[Node] Failed to create {} endpoint: {}", kind, e);
            None
        }
    }
}

/// The bootstrapped node: drivers, endpoints and the attribute system.
pub struct SensorNode {
    context: NodeContext,
    model: Arc<NodeModel>,
    registry: Arc<DriverRegistry>,
    attributes: Arc<AttributeUpdater>,
    identify: Arc<IdentifyControl>,
    button: Option<Arc<ButtonDriver>>,
    store: Arc<NvsStore>,
}

impl SensorNode {
    /// Initialize drivers, create the three sensor endpoints and wire callbacks.
    ///
    /// `restart` is cancelled by a factory reset.
    pub fn bootstrap(config: &Config, store: Arc<NvsStore>, restart: CancellationToken) -> Self {
        let defaults = &config.sensors;
        let mut registry = DriverRegistry::new();

        let temperature_driver = register_driver(
            &mut registry,
            EndpointKind::Temperature,
            TemperatureDriver::init(defaults.temperature_centi_celsius),
        );
        let pressure_driver = register_driver(
            &mut registry,
            EndpointKind::Pressure,
            PressureDriver::init(defaults.pressure_deci_kpa),
        );
        let humidity_driver = register_driver(
            &mut registry,
            EndpointKind::Humidity,
            HumidityDriver::init(
                defaults.humidity_centi_percent,
                Some(defaults.battery_percent),
            ),
        );

        let button = match ButtonDriver::init(FACTORY_RESET_HOLD) {
            Ok(button) => {
                button.register_reset(Arc::new(FactoryReset::new(store.clone(), restart)));
                Some(Arc::new(button))
            }
            Err(e) => {
                error!("[Node] Failed to initialize reset button: {}", e);
                None
            }
        };

        let (context, model) = build_endpoints(
            defaults,
            temperature_driver,
            pressure_driver,
            humidity_driver,
        );
        let model = Arc::new(model);
        let registry = Arc::new(registry);

        let attributes = Arc::new(AttributeUpdater::new(
            model.attribute_bindings(),
            Arc::new(DriverDispatch::new(registry.clone())),
        ));
        let identify = Arc::new(IdentifyControl::new(
            attributes.clone(),
            Arc::new(AppIdentification),
            model
                .endpoints()
                .iter()
                .map(|e| (e.id, e.identify.clone()))
                .collect(),
        ));

        info!(
            "[Node] Endpoints: temperature={:?} pressure={:?} humidity={:?}",
            context.temperature, context.pressure, context.humidity
        );

        Self {
            context,
            model,
            registry,
            attributes,
            identify,
            button,
            store,
        }
    }

    pub fn context(&self) -> &NodeContext {
        &self.context
    }

    pub fn model(&self) -> &Arc<NodeModel> {
        &self.model
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    pub fn attributes(&self) -> &Arc<AttributeUpdater> {
        &self.attributes
    }

    pub fn identify(&self) -> &Arc<IdentifyControl> {
        &self.identify
    }

    pub fn button(&self) -> Option<&Arc<ButtonDriver>> {
        self.button.as_ref()
    }

    pub fn store(&self) -> &Arc<NvsStore> {
        &self.store
    }

    /// What the Matter stack needs to serve this node.
    pub fn stack_context(
        &self,
        config: &MatterConfig,
        events: Arc<dyn DeviceEventListener>,
    ) -> StackContext {
        StackContext {
            config: config.clone(),
            model: self.model.clone(),
            identify: self.identify.clone(),
            events,
            changes: self.attributes.notifier().clone(),
            persist_path: self.store.matter_path(),
        }
    }

    /// Push each driver's default values through the attribute system.
    ///
    /// Returns how many endpoints received their defaults.
    pub fn push_defaults(&self) -> usize {
        let mut pushed = 0;
        for entry in self.model.endpoints() {
            let Some(driver) = entry.driver else {
                debug!("[Node] Endpoint {} has no driver, keeping its value", entry.id);
                continue;
            };
            match self
                .registry
                .set_defaults(driver, entry.id, &self.attributes)
            {
                Ok(()) => pushed += 1,
                Err(e) => warn!(
                    "[Node] Failed to push defaults to {} endpoint {}: {}",
                    entry.kind, entry.id, e
                ),
            }
        }
        pushed
    }
}

fn build_endpoints(
    defaults: &SensorDefaults,
    temperature_driver: Option<DriverId>,
    pressure_driver: Option<DriverId>,
    humidity_driver: Option<DriverId>,
) -> (NodeContext, NodeModel) {
    let mut builder = NodeBuilder::new();

    // Defaults a driver rejected are not published; the value stays unknown
    let temperature = log_endpoint(
        EndpointKind::Temperature,
        builder.add_temperature_sensor(
            &TemperatureSensorConfig {
                measured_value: temperature_driver.map(|_| defaults.temperature_centi_celsius),
                ..Default::default()
            },
            temperature_driver,
        ),
    );

    let pressure = log_endpoint(
        EndpointKind::Pressure,
        builder.add_pressure_sensor(
            &PressureSensorConfig {
                measured_value: pressure_driver.map(|_| defaults.pressure_deci_kpa),
                ..Default::default()
            },
            pressure_driver,
        ),
    );

    let humidity = log_endpoint(
        EndpointKind::Humidity,
        builder.add_humidity_sensor(
            &HumiditySensorConfig {
                measured_value: humidity_driver.map(|_| defaults.humidity_centi_percent),
                power_source: Some(PowerSourceConfig {
                    description: BATTERY_DESCRIPTION.to_string(),
                    battery_percent: humidity_driver.map(|_| defaults.battery_percent),
                }),
                ..Default::default()
            },
            humidity_driver,
        ),
    );

    if temperature_driver.is_none() || pressure_driver.is_none() || humidity_driver.is_none() {
        warn!("[Node] Some endpoints have no driver; their updates are not validated");
    }

    let context = NodeContext {
        temperature,
        pressure,
        humidity,
    };
    (context, builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::AttrValue;
    use crate::matter::clusters::measurement::MEASURED_VALUE;
    use crate::matter::clusters::power_source::{self, PowerSourceAttribute};
    use crate::matter::clusters::{relative_humidity, temperature_measurement};

    fn bootstrap(config: &Config) -> SensorNode {
        SensorNode::bootstrap(
            config,
            Arc::new(NvsStore::volatile()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_endpoints_have_distinct_nonzero_ids() {
        let node = bootstrap(&Config::default());
        let ctx = node.context();

        let ids = [ctx.temperature, ctx.pressure, ctx.humidity].map(|id| id.unwrap());
        assert!(ids.iter().all(|&id| id != 0));
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[2]);

        assert_eq!(node.registry().len(), 3);
        assert!(node.button().is_some());
        assert!(
            node.model()
                .endpoints()
                .iter()
                .all(|e| e.driver.is_some())
        );
    }

    #[test]
    fn test_driver_failure_leaves_endpoint_unbound() {
        let mut config = Config::default();
        config.sensors.temperature_centi_celsius = 20000;
        config.sensors.battery_percent = 150;

        let node = bootstrap(&config);
        let ctx = node.context();
        let model = node.model();

        assert_eq!(ctx.temperature, Some(1));
        assert_eq!(ctx.pressure, Some(2));
        assert_eq!(ctx.humidity, Some(3));
        assert_eq!(node.registry().len(), 1);

        let temperature = model.endpoint(1).unwrap();
        assert_eq!(temperature.driver, None);
        assert!(model.endpoint(2).unwrap().driver.is_some());
        assert_eq!(model.endpoint(3).unwrap().driver, None);

        // Rejected defaults are not published
        let attributes = node.attributes();
        assert_eq!(
            attributes.value(1, temperature_measurement::CLUSTER_ID, MEASURED_VALUE),
            Some(AttrValue::NullableI16(None))
        );
        assert_eq!(
            attributes.value(
                3,
                power_source::CLUSTER_ID,
                PowerSourceAttribute::BatPercentRemaining as u32
            ),
            Some(AttrValue::NullableU8(None))
        );

        // Only the bound pressure endpoint receives defaults
        assert_eq!(node.push_defaults(), 1);
        assert_eq!(
            attributes.value(1, temperature_measurement::CLUSTER_ID, MEASURED_VALUE),
            Some(AttrValue::NullableI16(None))
        );

        // Unbound endpoints still take updates, without driver validation
        attributes
            .update(
                1,
                temperature_measurement::CLUSTER_ID,
                MEASURED_VALUE,
                AttrValue::NullableI16(Some(2100)),
            )
            .unwrap();
        assert_eq!(
            attributes.value(1, temperature_measurement::CLUSTER_ID, MEASURED_VALUE),
            Some(AttrValue::NullableI16(Some(2100)))
        );
    }

    #[test]
    fn test_endpoint_failure_leaves_role_empty() {
        use crate::error::NodeError;

        assert_eq!(
            log_endpoint(
                EndpointKind::Pressure,
                Err(NodeError::EndpointCapacityReached(8))
            ),
            None
        );
        assert_eq!(log_endpoint(EndpointKind::Pressure, Ok(2)), Some(2));
    }

    #[test]
    fn test_out_of_range_update_is_rejected_and_not_applied() {
        let node = bootstrap(&Config::default());
        let ep = node.context().temperature.unwrap();
        let attributes = node.attributes();

        let before = attributes.value(ep, temperature_measurement::CLUSTER_ID, MEASURED_VALUE);
        assert_eq!(before, Some(AttrValue::NullableI16(Some(2200))));

        let result = attributes.update(
            ep,
            temperature_measurement::CLUSTER_ID,
            MEASURED_VALUE,
            AttrValue::NullableI16(Some(20000)),
        );
        assert!(matches!(
            result,
            Err(crate::matter::AttributeError::Rejected(DriverError::OutOfRange { .. }))
        ));
        assert_eq!(
            attributes.value(ep, temperature_measurement::CLUSTER_ID, MEASURED_VALUE),
            before
        );
    }

    #[test]
    fn test_push_defaults_sets_measurements_and_battery() {
        let mut config = Config::default();
        config.sensors.humidity_centi_percent = 6000;
        config.sensors.battery_percent = 50;

        let node = bootstrap(&config);
        let ep = node.context().humidity.unwrap();
        let attributes = node.attributes();

        attributes
            .update(
                ep,
                relative_humidity::CLUSTER_ID,
                MEASURED_VALUE,
                AttrValue::NullableU16(Some(1000)),
            )
            .unwrap();

        assert_eq!(node.push_defaults(), 3);
        assert_eq!(
            attributes.value(ep, relative_humidity::CLUSTER_ID, MEASURED_VALUE),
            Some(AttrValue::NullableU16(Some(6000)))
        );
        assert_eq!(
            attributes.value(
                ep,
                power_source::CLUSTER_ID,
                PowerSourceAttribute::BatPercentRemaining as u32
            ),
            Some(AttrValue::NullableU8(Some(100)))
        );
    }

    #[test]
    fn test_stack_context_without_persistence() {
        let node = bootstrap(&Config::default());
        let ctx = node.stack_context(
            &Config::default().matter,
            Arc::new(crate::callbacks::AppEventLogger),
        );
        assert!(ctx.persist_path.is_none());
        assert_eq!(ctx.model.endpoints().len(), 3);
        assert!(Arc::ptr_eq(&ctx.changes, node.attributes().notifier()));
    }
}
