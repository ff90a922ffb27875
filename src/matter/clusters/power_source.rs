//! PowerSource cluster handler for battery powered sensors.
//!
//! The PowerSource cluster (0x002F) with the Battery feature. Only the
//! remaining charge changes at runtime; everything else is derived from it
//! or fixed at endpoint creation.
//!
//! BatPercentRemaining is in half-percent units: 200 is 100%.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use rs_matter::dm::{
    Access, Attribute, Cluster, Dataver, Handler, NonBlockingHandler, Quality, ReadContext,
    ReadReply, Reply, WriteContext,
};
use rs_matter::error::{Error, ErrorCode};
use rs_matter::tlv::TLVWrite;
use rs_matter::{attribute_enum, attributes, with};
use strum::FromRepr;

use super::{Sensor, sync_dataver_with_sensor};
use crate::matter::attribute::{AttrValue, AttributeError, AttributePath, AttributeSink};

/// Matter Cluster ID for PowerSource
pub const CLUSTER_ID: u32 = 0x002F;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 1;

/// Battery feature bit
pub const FEATURE_BATTERY: u32 = 0x02;

/// Highest valid BatPercentRemaining (100%)
pub const BAT_PERCENT_MAX: u8 = 200;

/// Charge level at or below which the battery is reported as Warning (20%)
const WARNING_HALF_PERCENT: u8 = 40;
/// Charge level at or below which the battery is reported as Critical (10%)
const CRITICAL_HALF_PERCENT: u8 = 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PowerSourceStatus {
    Unspecified = 0,
    Active = 1,
    Standby = 2,
    Unavailable = 3,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum BatChargeLevel {
    Ok = 0,
    Warning = 1,
    Critical = 2,
}

impl BatChargeLevel {
    /// Charge level for a BatPercentRemaining value; unknown charge is Ok.
    pub fn from_half_percent(remaining: Option<u8>) -> Self {
        match remaining {
            Some(v) if v <= CRITICAL_HALF_PERCENT => Self::Critical,
            Some(v) if v <= WARNING_HALF_PERCENT => Self::Warning,
            _ => Self::Ok,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum BatReplaceability {
    Unspecified = 0,
    NotReplaceable = 1,
    UserReplaceable = 2,
    FactoryReplaceable = 3,
}

/// Attribute IDs for the PowerSource cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum PowerSourceAttribute {
    Status = 0x0000,
    Order = 0x0001,
    Description = 0x0002,
    BatPercentRemaining = 0x000C,
    BatChargeLevel = 0x000E,
    BatReplacementNeeded = 0x000F,
    BatReplaceability = 0x0010,
}

attribute_enum!(PowerSourceAttribute);

/// Cluster metadata definition
pub const CLUSTER: Cluster<'static> = Cluster {
    id: CLUSTER_ID,
    revision: CLUSTER_REVISION,
    feature_map: FEATURE_BATTERY,
    attributes: attributes!(
        Attribute::new(PowerSourceAttribute::Status as _, Access::RV, Quality::NONE),
        Attribute::new(PowerSourceAttribute::Order as _, Access::RV, Quality::NONE),
        Attribute::new(
            PowerSourceAttribute::Description as _,
            Access::RV,
            Quality::FIXED
        ),
        Attribute::new(
            PowerSourceAttribute::BatPercentRemaining as _,
            Access::RV,
            Quality::NULLABLE
        ),
        Attribute::new(
            PowerSourceAttribute::BatChargeLevel as _,
            Access::RV,
            Quality::NONE
        ),
        Attribute::new(
            PowerSourceAttribute::BatReplacementNeeded as _,
            Access::RV,
            Quality::NONE
        ),
        Attribute::new(
            PowerSourceAttribute::BatReplaceability as _,
            Access::RV,
            Quality::FIXED
        ),
    ),
    commands: &[],
    with_attrs: with!(all),
    with_cmds: with!(all),
};

/// Battery state of one endpoint.
pub struct PowerSourceState {
    description: String,
    remaining: RwLock<Option<u8>>,
    version: AtomicU32,
}

impl PowerSourceState {
    /// `remaining` is the initial BatPercentRemaining, half-percent units.
    pub fn new(description: impl Into<String>, remaining: Option<u8>) -> Self {
        Self {
            description: description.into(),
            remaining: RwLock::new(remaining),
            version: AtomicU32::new(0),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// BatPercentRemaining in half-percent units.
    pub fn remaining(&self) -> Option<u8> {
        *self.remaining.read()
    }

    pub fn charge_level(&self) -> BatChargeLevel {
        BatChargeLevel::from_half_percent(self.remaining())
    }
}

impl Sensor for PowerSourceState {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

impl AttributeSink for PowerSourceState {
    fn apply(&self, path: AttributePath, value: &AttrValue) -> Result<bool, AttributeError> {
        if path.attribute_id != PowerSourceAttribute::BatPercentRemaining as u32 {
            return Err(AttributeError::UnsupportedAttribute(path));
        }
        let AttrValue::NullableU8(remaining) = value else {
            return Err(AttributeError::TypeMismatch {
                path,
                expected: "nullable uint8",
                actual: value.type_name(),
            });
        };

        let mut current = self.remaining.write();
        if *current == *remaining {
            return Ok(false);
        }
        *current = *remaining;
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn value(&self, attribute_id: u32) -> Option<AttrValue> {
        (attribute_id == PowerSourceAttribute::BatPercentRemaining as u32)
            .then(|| AttrValue::NullableU8(self.remaining()))
    }
}

/// Handler that serves a read-only PowerSource cluster.
pub struct PowerSourceHandler {
    dataver: Dataver,
    state: Arc<PowerSourceState>,
    last_version: AtomicU32,
}

impl PowerSourceHandler {
    /// Cluster definition for use in the data model
    pub const CLUSTER: Cluster<'static> = CLUSTER;

    pub fn new(dataver: Dataver, state: Arc<PowerSourceState>) -> Self {
        Self {
            dataver,
            state,
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
                PowerSourceAttribute::Status => tw.u8(tag, PowerSourceStatus::Active as u8)?,
                // Single source on the endpoint
                PowerSourceAttribute::Order => tw.u8(tag, 0)?,
                PowerSourceAttribute::Description => tw.utf8(tag, self.state.description())?,
                PowerSourceAttribute::BatPercentRemaining => match self.state.remaining() {
                    Some(v) => tw.u8(tag, v)?,
                    None => tw.null(tag)?,
                },
                PowerSourceAttribute::BatChargeLevel => {
                    tw.u8(tag, self.state.charge_level() as u8)?
                }
                PowerSourceAttribute::BatReplacementNeeded => {
                    tw.bool(tag, self.state.charge_level() == BatChargeLevel::Critical)?
                }
                PowerSourceAttribute::BatReplaceability => {
                    tw.u8(tag, BatReplaceability::UserReplaceable as u8)?
                }
            }
        }

        writer.complete()
    }

    fn write_impl(&self, _ctx: impl WriteContext) -> Result<(), Error> {
        // Cluster is read-only
        Err(ErrorCode::UnsupportedAccess.into())
    }
}

impl Handler for PowerSourceHandler {
    fn read(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        self.read_impl(ctx, reply)
    }

    fn write(&self, ctx: impl WriteContext) -> Result<(), Error> {
        self.write_impl(ctx)
    }
}

impl NonBlockingHandler for PowerSourceHandler {}
