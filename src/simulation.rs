//! Sensor simulation.
//!
//! Stands in for hardware sampling: every tick each sensor value takes a
//! bounded random step and is pushed through the attribute system, so the
//! drivers validate it like a real reading.

use std::sync::Arc;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::driver::humidity::{MAX_CENTI_PERCENT, MIN_CENTI_PERCENT};
use crate::driver::pressure::{MAX_DECI_KPA, MIN_DECI_KPA};
use crate::driver::temperature::{MAX_CENTI_CELSIUS, MIN_CENTI_CELSIUS};
use crate::matter::clusters::measurement::MEASURED_VALUE;
use crate::matter::clusters::power_source::{self, PowerSourceAttribute};
use crate::matter::clusters::{pressure_measurement, relative_humidity, temperature_measurement};
use crate::matter::{AttrValue, AttributeUpdater, EndpointId};
use crate::node::NodeContext;

/// Bounded random walk over an integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomWalk {
    min: i32,
    max: i32,
    max_step: i32,
}

impl RandomWalk {
    pub const fn new(min: i32, max: i32, max_step: i32) -> Self {
        Self { min, max, max_step }
    }

    /// Next value after `current`, clamped to the range.
    pub fn step<R: Rng>(&self, current: i32, rng: &mut R) -> i32 {
        let delta = rng.gen_range(-self.max_step..=self.max_step);
        current.saturating_add(delta).clamp(self.min, self.max)
    }
}

/// ±0.5°C per tick
const TEMPERATURE_WALK: RandomWalk =
    RandomWalk::new(MIN_CENTI_CELSIUS as i32, MAX_CENTI_CELSIUS as i32, 50);
/// ±0.5 kPa per tick
const PRESSURE_WALK: RandomWalk = RandomWalk::new(MIN_DECI_KPA as i32, MAX_DECI_KPA as i32, 5);
/// ±2% per tick
const HUMIDITY_WALK: RandomWalk =
    RandomWalk::new(MIN_CENTI_PERCENT as i32, MAX_CENTI_PERCENT as i32, 200);

/// Battery loses half a percent every this many ticks
const BATTERY_DRAIN_TICKS: u64 = 20;

/// One simulation tick over the node's sensors.
pub struct SensorSimulation<R> {
    attributes: Arc<AttributeUpdater>,
    context: NodeContext,
    rng: R,
    ticks: u64,
}

impl SensorSimulation<StdRng> {
    pub fn new(attributes: Arc<AttributeUpdater>, context: NodeContext) -> Self {
        Self::with_rng(attributes, context, StdRng::from_entropy())
    }
}

impl<R: Rng> SensorSimulation<R> {
    pub fn with_rng(attributes: Arc<AttributeUpdater>, context: NodeContext, rng: R) -> Self {
        Self {
            attributes,
            context,
            rng,
            ticks: 0,
        }
    }

    /// Advance every sensor by one step. Returns how many values were accepted.
    pub fn tick(&mut self) -> usize {
        self.ticks += 1;
        let mut accepted = 0;

        if let Some(ep) = self.context.temperature {
            let next = self.walk(ep, temperature_measurement::CLUSTER_ID, TEMPERATURE_WALK);
            accepted += self.push(
                ep,
                temperature_measurement::CLUSTER_ID,
                MEASURED_VALUE,
                AttrValue::NullableI16(next.map(|v| v as i16)),
            );
        }

        if let Some(ep) = self.context.pressure {
            let next = self.walk(ep, pressure_measurement::CLUSTER_ID, PRESSURE_WALK);
            accepted += self.push(
                ep,
                pressure_measurement::CLUSTER_ID,
                MEASURED_VALUE,
                AttrValue::NullableI16(next.map(|v| v as i16)),
            );
        }

        if let Some(ep) = self.context.humidity {
            let next = self.walk(ep, relative_humidity::CLUSTER_ID, HUMIDITY_WALK);
            accepted += self.push(
                ep,
                relative_humidity::CLUSTER_ID,
                MEASURED_VALUE,
                AttrValue::NullableU16(next.map(|v| v as u16)),
            );

            if self.ticks % BATTERY_DRAIN_TICKS == 0 {
                accepted += self.drain_battery(ep);
            }
        }

        accepted
    }

    /// Next value for the MeasuredValue of `cluster_id`; `None` while it is unknown.
    fn walk(&mut self, endpoint_id: EndpointId, cluster_id: u32, walk: RandomWalk) -> Option<i32> {
        let current = match self.attributes.value(endpoint_id, cluster_id, MEASURED_VALUE)? {
            AttrValue::NullableI16(v) => v.map(i32::from),
            AttrValue::NullableU16(v) => v.map(i32::from),
            _ => None,
        }?;
        Some(walk.step(current, &mut self.rng))
    }

    fn drain_battery(&mut self, endpoint_id: EndpointId) -> usize {
        let attribute = PowerSourceAttribute::BatPercentRemaining as u32;
        let Some(AttrValue::NullableU8(Some(remaining))) =
            self.attributes
                .value(endpoint_id, power_source::CLUSTER_ID, attribute)
        else {
            return 0;
        };
        self.push(
            endpoint_id,
            power_source::CLUSTER_ID,
            attribute,
            AttrValue::NullableU8(Some(remaining.saturating_sub(1))),
        )
    }

    fn push(&self, endpoint_id: EndpointId, cluster_id: u32, attribute_id: u32, value: AttrValue) -> usize {
        if value.is_null() {
            return 0;
        }
        match self
            .attributes
            .update(endpoint_id, cluster_id, attribute_id, value)
        {
            Ok(()) => {
                debug!("[Sim] Endpoint {} -> {}", endpoint_id, value);
                1
            }
            Err(e) => {
                warn!("[Sim] Update on endpoint {} rejected: {}", endpoint_id, e);
                0
            }
        }
    }
}

/// Spawn the periodic simulation, `None` when `interval_secs` is 0.
///
/// The task stops when `token` is cancelled.
pub fn run_sensor_simulation(
    attributes: Arc<AttributeUpdater>,
    context: NodeContext,
    interval_secs: u64,
    token: CancellationToken,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        info!("[Sim] Sensor simulation disabled");
        return None;
    }

    info!("[Sim] Simulating sensor readings every {}s", interval_secs);
    Some(tokio::spawn(async move {
        let mut simulation = SensorSimulation::new(attributes, context);
        let mut interval = interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; keep the defaults for one period
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    simulation.tick();
                }
            }
        }
        info!("[Sim] Sensor simulation stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::node::SensorNode;
    use crate::storage::NvsStore;

    fn node() -> SensorNode {
        SensorNode::bootstrap(
            &Config::default(),
            Arc::new(NvsStore::volatile()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_random_walk_stays_in_range() {
        let walk = RandomWalk::new(-10, 10, 7);
        let mut rng = StdRng::seed_from_u64(7);
        let mut value = 0;
        for _ in 0..1000 {
            let next = walk.step(value, &mut rng);
            assert!((-10..=10).contains(&next));
            assert!((next - value).abs() <= 7);
            value = next;
        }
    }

    #[test]
    fn test_tick_updates_every_sensor_within_range() {
        let node = node();
        let mut sim = SensorSimulation::with_rng(
            node.attributes().clone(),
            *node.context(),
            StdRng::seed_from_u64(1),
        );

        for tick in 1..=50u64 {
            let expected = if tick % BATTERY_DRAIN_TICKS == 0 { 4 } else { 3 };
            assert_eq!(sim.tick(), expected);
        }

        let ep = node.context().pressure.unwrap();
        let Some(AttrValue::NullableI16(Some(v))) =
            node.attributes()
                .value(ep, pressure_measurement::CLUSTER_ID, MEASURED_VALUE)
        else {
            panic!("pressure value missing");
        };
        assert!((MIN_DECI_KPA..=MAX_DECI_KPA).contains(&v));

        let ep = node.context().humidity.unwrap();
        assert_eq!(
            node.attributes().value(
                ep,
                power_source::CLUSTER_ID,
                PowerSourceAttribute::BatPercentRemaining as u32
            ),
            Some(AttrValue::NullableU8(Some(198)))
        );
        assert!(
            node.attributes()
                .notifier()
                .take_pending()
                .contains(&(ep, power_source::CLUSTER_ID))
        );
    }

    #[test]
    fn test_disabled_when_interval_is_zero() {
        let node = node();
        let handle = run_sensor_simulation(
            node.attributes().clone(),
            *node.context(),
            0,
            CancellationToken::new(),
        );
        assert!(handle.is_none());
    }

    #[test]
    fn test_task_stops_on_cancel() {
        let node = node();
        tokio_test::block_on(async {
            let token = CancellationToken::new();
            let handle = run_sensor_simulation(
                node.attributes().clone(),
                *node.context(),
                3600,
                token.clone(),
            )
            .unwrap();

            token.cancel();
            let joined = tokio::time::timeout(Duration::from_secs(5), handle).await;
            tokio_test::assert_ok!(tokio_test::assert_ok!(joined));
        });
    }
}
