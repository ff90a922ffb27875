//! Identify cluster handler.
//!
//! The Identify cluster (0x0003) lets a controller ask an endpoint to make
//! itself noticeable. Starting, stopping and effects are reported to the
//! application's [`IdentificationListener`]; the remaining time is kept in
//! [`IdentifyState`] and written through the attribute system.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::RwLock;
use rs_matter::dm::{
    Access, Attribute, Cluster, Command, Dataver, Handler, InvokeContext, InvokeReply,
    NonBlockingHandler, Quality, ReadContext, ReadReply, Reply, WriteContext,
};
use rs_matter::error::{Error, ErrorCode};
use rs_matter::tlv::TLVWrite;
use rs_matter::{attribute_enum, attributes, command_enum, commands, with};
use strum::FromRepr;

use super::{Sensor, sync_dataver_with_sensor};
use crate::callbacks::{IdentificationKind, IdentificationListener};
use crate::matter::attribute::{
    AttrValue, AttributeError, AttributePath, AttributeSink, AttributeUpdater, EndpointId,
};

/// Matter Cluster ID for Identify
pub const CLUSTER_ID: u32 = 0x0003;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 4;

/// IdentifyType reported by every endpoint: the board's status LED
pub const IDENTIFY_TYPE_VISIBLE_INDICATOR: u8 = 0x02;

/// Attribute IDs for the Identify cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum IdentifyAttribute {
    /// Remaining identification time in seconds
    IdentifyTime = 0x0000,
    IdentifyType = 0x0001,
}

attribute_enum!(IdentifyAttribute);

/// Command IDs for the Identify cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum IdentifyCommand {
    Identify = 0x00,
    TriggerEffect = 0x40,
}

command_enum!(IdentifyCommand);

/// Cluster metadata definition
pub const CLUSTER: Cluster<'static> = Cluster {
    id: CLUSTER_ID,
    revision: CLUSTER_REVISION,
    feature_map: 0,
    attributes: attributes!(
        Attribute::new(
            IdentifyAttribute::IdentifyTime as _,
            Access::RWVM,
            Quality::NONE
        ),
        Attribute::new(
            IdentifyAttribute::IdentifyType as _,
            Access::RV,
            Quality::FIXED
        ),
    ),
    commands: commands!(
        Command::new(IdentifyCommand::Identify as _, None, Access::WO),
        Command::new(IdentifyCommand::TriggerEffect as _, None, Access::WO),
    ),
    with_attrs: with!(all),
    with_cmds: with!(all),
};

/// Identification deadline of one endpoint.
#[derive(Default)]
pub struct IdentifyState {
    deadline: RwLock<Option<Instant>>,
    version: AtomicU32,
}

impl IdentifyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining identification time in whole seconds, rounded up.
    pub fn remaining_secs(&self, now: Instant) -> u16 {
        match *self.deadline.read() {
            Some(deadline) if deadline > now => {
                let left = deadline - now;
                let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
                secs.min(u64::from(u16::MAX)) as u16
            }
            _ => 0,
        }
    }

    pub fn is_identifying(&self, now: Instant) -> bool {
        self.remaining_secs(now) > 0
    }

    /// Whether identification was started and not stopped yet, expired or not.
    pub fn is_active(&self) -> bool {
        self.deadline.read().is_some()
    }

    /// Whether a running identification has run out at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(*self.deadline.read(), Some(deadline) if deadline <= now)
    }
}

impl Sensor for IdentifyState {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

impl AttributeSink for IdentifyState {
    fn apply(&self, path: AttributePath, value: &AttrValue) -> Result<bool, AttributeError> {
        if path.attribute_id != IdentifyAttribute::IdentifyTime as u32 {
            return Err(AttributeError::UnsupportedAttribute(path));
        }
        let AttrValue::U16(secs) = value else {
            return Err(AttributeError::TypeMismatch {
                path,
                expected: "uint16",
                actual: value.type_name(),
            });
        };

        let mut deadline = self.deadline.write();
        if *secs == 0 && deadline.is_none() {
            return Ok(false);
        }
        *deadline = (*secs > 0).then(|| Instant::now() + Duration::from_secs(u64::from(*secs)));
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn value(&self, attribute_id: u32) -> Option<AttrValue> {
        (attribute_id == IdentifyAttribute::IdentifyTime as u32)
            .then(|| AttrValue::U16(self.remaining_secs(Instant::now())))
    }
}

/// Starts and stops identification and reports it to the application.
///
/// Shared by the cluster handlers, the shell and the expiry poll.
pub struct IdentifyControl {
    attributes: Arc<AttributeUpdater>,
    listener: Arc<dyn IdentificationListener>,
    states: Vec<(EndpointId, Arc<IdentifyState>)>,
}

impl IdentifyControl {
    pub fn new(
        attributes: Arc<AttributeUpdater>,
        listener: Arc<dyn IdentificationListener>,
        states: Vec<(EndpointId, Arc<IdentifyState>)>,
    ) -> Self {
        Self {
            attributes,
            listener,
            states,
        }
    }

    pub fn state(&self, endpoint_id: EndpointId) -> Option<&Arc<IdentifyState>> {
        self.states
            .iter()
            .find(|(ep, _)| *ep == endpoint_id)
            .map(|(_, state)| state)
    }

    /// Identify for `secs` seconds; zero stops a running identification.
    ///
    /// Stop is only reported for an endpoint that was identifying.
    pub fn identify(&self, endpoint_id: EndpointId, secs: u16) -> Result<(), AttributeError> {
        let was_active = self.state(endpoint_id).is_some_and(|state| state.is_active());

        self.attributes.update(
            endpoint_id,
            CLUSTER_ID,
            IdentifyAttribute::IdentifyTime as u32,
            AttrValue::U16(secs),
        )?;

        if secs > 0 {
            self.notify(IdentificationKind::Start, endpoint_id, 0, 0);
        } else if was_active {
            self.notify(IdentificationKind::Stop, endpoint_id, 0, 0);
        }
        Ok(())
    }

    pub fn trigger_effect(&self, endpoint_id: EndpointId, effect_id: u8, variant: u8) {
        self.notify(IdentificationKind::Effect, endpoint_id, effect_id, variant);
    }

    /// Stop every identification whose time ran out. Returns how many stopped.
    pub fn poll_expired(&self, now: Instant) -> usize {
        let mut stopped = 0;
        for (endpoint_id, state) in &self.states {
            if !state.is_expired(now) {
                continue;
            }
            match self.identify(*endpoint_id, 0) {
                Ok(()) => stopped += 1,
                Err(e) => warn!("Failed to stop identify on endpoint {}: {}", endpoint_id, e),
            }
        }
        stopped
    }

    fn notify(&self, kind: IdentificationKind, endpoint_id: EndpointId, effect_id: u8, variant: u8) {
        if let Err(e) = self
            .listener
            .on_identification(kind, endpoint_id, effect_id, variant)
        {
            warn!("Identification callback failed on endpoint {}: {}", endpoint_id, e);
        }
    }
}

/// Handler that serves the Identify cluster of one endpoint.
pub struct IdentifyHandler {
    dataver: Dataver,
    endpoint_id: EndpointId,
    state: Arc<IdentifyState>,
    control: Arc<IdentifyControl>,
    last_version: AtomicU32,
}

impl IdentifyHandler {
    /// Cluster definition for use in the data model
    pub const CLUSTER: Cluster<'static> = CLUSTER;

    pub fn new(
        dataver: Dataver,
        endpoint_id: EndpointId,
        state: Arc<IdentifyState>,
        control: Arc<IdentifyControl>,
    ) -> Self {
        Self {
            dataver,
            endpoint_id,
            state,
            control,
            last_version: AtomicU32::new(0),
        }
    }

    fn read_impl(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        sync_dataver_with_sensor(&*self.state, &self.last_version, &self.dataver);

        let attr = ctx.attr();

        let Some(mut writer) = reply.with_dataver(self.dataver.get())? else {
            return Ok(());
        };

        // Global attributes
        if attr.is_system() {
            return CLUSTER.read(attr, writer);
        }

        let tag = writer.tag();
        {
            let mut tw = writer.writer();

            match attr.attr_id.try_into()? {
                IdentifyAttribute::IdentifyTime => {
                    tw.u16(tag, self.state.remaining_secs(Instant::now()))?
                }
                IdentifyAttribute::IdentifyType => tw.u8(tag, IDENTIFY_TYPE_VISIBLE_INDICATOR)?,
            }
        }

        writer.complete()
    }

    fn write_impl(&self, ctx: impl WriteContext) -> Result<(), Error> {
        let attr = ctx.attr();
        let data = ctx.data();

        attr.check_dataver(self.dataver.get())?;

        match attr.attr_id.try_into()? {
            IdentifyAttribute::IdentifyTime => {
                let secs = data.u16()?;
                self.start(secs)?;
                self.dataver.changed();
                Ok(())
            }
            IdentifyAttribute::IdentifyType => Err(ErrorCode::UnsupportedAccess.into()),
        }
    }

    fn invoke_impl(&self, ctx: impl InvokeContext, _reply: impl InvokeReply) -> Result<(), Error> {
        let cmd = ctx.cmd();
        let data = ctx.data();

        match cmd.cmd_id.try_into()? {
            IdentifyCommand::Identify => {
                let mut seq = data.structure()?;
                let secs = seq.scan_ctx(0)?.u16()?;
                self.start(secs)?;
                self.dataver.changed();
                Ok(())
            }
            IdentifyCommand::TriggerEffect => {
                let mut seq = data.structure()?;
                let effect_id = seq.scan_ctx(0)?.u8()?;
                let variant = seq.scan_ctx(1)?.u8()?;
                self.control.trigger_effect(self.endpoint_id, effect_id, variant);
                Ok(())
            }
        }
    }

    fn start(&self, secs: u16) -> Result<(), Error> {
        self.control.identify(self.endpoint_id, secs).map_err(|e| {
            warn!("Identify on endpoint {} rejected: {}", self.endpoint_id, e);
            Error::new(ErrorCode::ConstraintError)
        })
    }
}

impl Handler for IdentifyHandler {
    fn read(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        self.read_impl(ctx, reply)
    }

    fn write(&self, ctx: impl WriteContext) -> Result<(), Error> {
        self.write_impl(ctx)
    }

    fn invoke(&self, ctx: impl InvokeContext, reply: impl InvokeReply) -> Result<(), Error> {
        self.invoke_impl(ctx, reply)
    }
}

impl NonBlockingHandler for IdentifyHandler {}
