//! Data model handler for the sensor endpoints.
//!
//! The endpoint table is only known at startup, so instead of one
//! `EpClMatcher` chain entry per cluster the stack registers a single
//! [`SensorNodeHandler`] that routes by endpoint and cluster id.

use std::sync::Arc;

use rs_matter::dm::clusters::desc;
use rs_matter::dm::{
    Dataver, Handler, InvokeContext, InvokeReply, NonBlockingHandler, ReadContext, ReadReply,
    WriteContext,
};
use rs_matter::error::{Error, ErrorCode};

use super::attribute::EndpointId;
use super::clusters::{
    IdentifyControl, IdentifyHandler, MeasurementHandler, PowerSourceHandler, identify,
    power_source, pressure_measurement, relative_humidity, temperature_measurement,
};
use super::node::{EndpointState, NodeModel};

enum MeasurementHandlers {
    Signed(MeasurementHandler<i16>),
    Unsigned(MeasurementHandler<u16>),
}

/// Cluster handlers of one sensor endpoint.
struct EndpointHandlers {
    endpoint_id: EndpointId,
    measurement_cluster: u32,
    measurement: MeasurementHandlers,
    identify: IdentifyHandler,
    power_source: Option<PowerSourceHandler>,
}

enum ClusterRef<'a> {
    Signed(&'a MeasurementHandler<i16>),
    Unsigned(&'a MeasurementHandler<u16>),
    Identify(&'a IdentifyHandler),
    PowerSource(&'a PowerSourceHandler),
}

/// Routes reads, writes and invokes to the handler of the addressed cluster.
///
/// `D` is the Descriptor handler shared by all sensor endpoints.
pub struct SensorNodeHandler<D> {
    desc: D,
    endpoints: Vec<EndpointHandlers>,
}

impl<D> SensorNodeHandler<D> {
    /// Create handlers for every endpoint of `model`.
    ///
    /// `dataver` yields a fresh, randomly seeded data version per cluster.
    pub fn new(
        desc: D,
        model: &NodeModel,
        identify: &Arc<IdentifyControl>,
        mut dataver: impl FnMut() -> Dataver,
    ) -> Self {
        let endpoints = model
            .endpoints()
            .iter()
            .map(|entry| {
                let (measurement_cluster, measurement, power_source) = match &entry.state {
                    EndpointState::Temperature(m) => (
                        temperature_measurement::CLUSTER_ID,
                        MeasurementHandlers::Signed(MeasurementHandler::new(
                            dataver(),
                            &temperature_measurement::CLUSTER,
                            m.clone(),
                        )),
                        None,
                    ),
                    EndpointState::Pressure(m) => (
                        pressure_measurement::CLUSTER_ID,
                        MeasurementHandlers::Signed(MeasurementHandler::new(
                            dataver(),
                            &pressure_measurement::CLUSTER,
                            m.clone(),
                        )),
                        None,
                    ),
                    EndpointState::Humidity {
                        measurement,
                        power_source: battery,
                    } => (
                        relative_humidity::CLUSTER_ID,
                        MeasurementHandlers::Unsigned(MeasurementHandler::new(
                            dataver(),
                            &relative_humidity::CLUSTER,
                            measurement.clone(),
                        )),
                        battery
                            .as_ref()
                            .map(|state| PowerSourceHandler::new(dataver(), state.clone())),
                    ),
                };

                EndpointHandlers {
                    endpoint_id: entry.id,
                    measurement_cluster,
                    measurement,
                    identify: IdentifyHandler::new(
                        dataver(),
                        entry.id,
                        entry.identify.clone(),
                        identify.clone(),
                    ),
                    power_source,
                }
            })
            .collect();

        Self { desc, endpoints }
    }

    fn cluster(&self, endpoint_id: EndpointId, cluster_id: u32) -> Result<ClusterRef<'_>, Error> {
        let endpoint = self
            .endpoints
            .iter()
            .find(|e| e.endpoint_id == endpoint_id)
            .ok_or(ErrorCode::EndpointNotFound)?;

        if cluster_id == endpoint.measurement_cluster {
            return Ok(match &endpoint.measurement {
                MeasurementHandlers::Signed(h) => ClusterRef::Signed(h),
                MeasurementHandlers::Unsigned(h) => ClusterRef::Unsigned(h),
            });
        }

        match cluster_id {
            identify::CLUSTER_ID => Ok(ClusterRef::Identify(&endpoint.identify)),
            power_source::CLUSTER_ID => endpoint
                .power_source
                .as_ref()
                .map(ClusterRef::PowerSource)
                .ok_or_else(|| ErrorCode::ClusterNotFound.into()),
            _ => Err(ErrorCode::ClusterNotFound.into()),
        }
    }
}

impl<D: Handler> Handler for SensorNodeHandler<D> {
    fn read(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        let (endpoint_id, cluster_id) = {
            let attr = ctx.attr();
            (attr.endpoint_id, attr.cluster_id)
        };

        if cluster_id == desc::DescHandler::CLUSTER.id {
            return self.desc.read(ctx, reply);
        }

        match self.cluster(endpoint_id, cluster_id)? {
            ClusterRef::Signed(h) => h.read(ctx, reply),
            ClusterRef::Unsigned(h) => h.read(ctx, reply),
            ClusterRef::Identify(h) => h.read(ctx, reply),
            ClusterRef::PowerSource(h) => h.read(ctx, reply),
        }
    }

    fn write(&self, ctx: impl WriteContext) -> Result<(), Error> {
        let (endpoint_id, cluster_id) = {
            let attr = ctx.attr();
            (attr.endpoint_id, attr.cluster_id)
        };

        if cluster_id == desc::DescHandler::CLUSTER.id {
            return self.desc.write(ctx);
        }

        match self.cluster(endpoint_id, cluster_id)? {
            ClusterRef::Signed(h) => h.write(ctx),
            ClusterRef::Unsigned(h) => h.write(ctx),
            ClusterRef::Identify(h) => h.write(ctx),
            ClusterRef::PowerSource(h) => h.write(ctx),
        }
    }

    fn invoke(&self, ctx: impl InvokeContext, reply: impl InvokeReply) -> Result<(), Error> {
        let (endpoint_id, cluster_id) = {
            let cmd = ctx.cmd();
            (cmd.endpoint_id, cmd.cluster_id)
        };

        if cluster_id == desc::DescHandler::CLUSTER.id {
            return self.desc.invoke(ctx, reply);
        }

        match self.cluster(endpoint_id, cluster_id)? {
            ClusterRef::Signed(h) => h.invoke(ctx, reply),
            ClusterRef::Unsigned(h) => h.invoke(ctx, reply),
            ClusterRef::Identify(h) => h.invoke(ctx, reply),
            ClusterRef::PowerSource(h) => h.invoke(ctx, reply),
        }
    }
}

impl<D: NonBlockingHandler> NonBlockingHandler for SensorNodeHandler<D> {}
