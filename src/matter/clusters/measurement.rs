//! Shared state for the measurement clusters.
//!
//! TemperatureMeasurement (0x0402), PressureMeasurement (0x0403) and
//! RelativeHumidityMeasurement (0x0405) share the same first four attributes.
//! [`Measurement`] holds them for one endpoint and is written through the
//! attribute system, read by the cluster handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use rs_matter::dm::{
    Access, Attribute, Cluster, Dataver, Handler, NonBlockingHandler, Quality, ReadContext,
    ReadReply, Reply, WriteContext,
};
use rs_matter::error::{Error, ErrorCode};
use rs_matter::tlv::{TLVTag, TLVWrite};
use rs_matter::{attribute_enum, attributes};
use strum::FromRepr;

use super::{Sensor, sync_dataver_with_sensor};
use crate::matter::attribute::{AttrValue, AttributeError, AttributePath, AttributeSink};

pub const MEASURED_VALUE: u32 = MeasurementAttribute::MeasuredValue as u32;
pub const MIN_MEASURED_VALUE: u32 = MeasurementAttribute::MinMeasuredValue as u32;
pub const MAX_MEASURED_VALUE: u32 = MeasurementAttribute::MaxMeasuredValue as u32;
pub const TOLERANCE: u32 = MeasurementAttribute::Tolerance as u32;

/// Attribute IDs shared by the measurement clusters
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum MeasurementAttribute {
    MeasuredValue = 0x0000,
    MinMeasuredValue = 0x0001,
    MaxMeasuredValue = 0x0002,
    Tolerance = 0x0003,
}

attribute_enum!(MeasurementAttribute);

/// Attribute metadata shared by the measurement cluster definitions
pub const ATTRIBUTES: &[Attribute] = attributes!(
    Attribute::new(
        MeasurementAttribute::MeasuredValue as _,
        Access::RV,
        Quality::NULLABLE
    ),
    Attribute::new(
        MeasurementAttribute::MinMeasuredValue as _,
        Access::RV,
        Quality::NULLABLE
    ),
    Attribute::new(
        MeasurementAttribute::MaxMeasuredValue as _,
        Access::RV,
        Quality::NULLABLE
    ),
    Attribute::new(MeasurementAttribute::Tolerance as _, Access::RV, Quality::NONE),
);

/// Numeric type carried by a measurement cluster.
pub trait MeasurementValue: Copy + PartialEq + Send + Sync + 'static {
    /// [`AttrValue::type_name`] of the nullable variant for this type.
    const TYPE_NAME: &'static str;

    fn from_attr(value: &AttrValue) -> Option<Option<Self>>;

    fn to_attr(value: Option<Self>) -> AttrValue;

    /// Write a nullable value, `None` as TLV null.
    fn write_tlv<W: TLVWrite>(tw: &mut W, tag: &TLVTag, value: Option<Self>) -> Result<(), Error>;
}

impl MeasurementValue for i16 {
    const TYPE_NAME: &'static str = "nullable int16";

    fn from_attr(value: &AttrValue) -> Option<Option<Self>> {
        match value {
            AttrValue::NullableI16(v) => Some(*v),
            _ => None,
        }
    }

    fn to_attr(value: Option<Self>) -> AttrValue {
        AttrValue::NullableI16(value)
    }

    fn write_tlv<W: TLVWrite>(tw: &mut W, tag: &TLVTag, value: Option<Self>) -> Result<(), Error> {
        match value {
            Some(v) => tw.i16(tag, v),
            None => tw.null(tag),
        }
    }
}

impl MeasurementValue for u16 {
    const TYPE_NAME: &'static str = "nullable uint16";

    fn from_attr(value: &AttrValue) -> Option<Option<Self>> {
        match value {
            AttrValue::NullableU16(v) => Some(*v),
            _ => None,
        }
    }

    fn to_attr(value: Option<Self>) -> AttrValue {
        AttrValue::NullableU16(value)
    }

    fn write_tlv<W: TLVWrite>(tw: &mut W, tag: &TLVTag, value: Option<Self>) -> Result<(), Error> {
        match value {
            Some(v) => tw.u16(tag, v),
            None => tw.null(tag),
        }
    }
}

/// Attribute values of a measurement cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredValues<T> {
    pub measured: Option<T>,
    pub min: Option<T>,
    pub max: Option<T>,
    /// Tolerance in the cluster's unit, 0 when unknown
    pub tolerance: u16,
}

/// Thread-safe measurement state with version tracking.
pub struct Measurement<T> {
    values: RwLock<MeasuredValues<T>>,
    version: AtomicU32,
}

impl<T: MeasurementValue> Measurement<T> {
    pub fn new(values: MeasuredValues<T>) -> Self {
        Self {
            values: RwLock::new(values),
            version: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> MeasuredValues<T> {
        *self.values.read()
    }

    pub fn measured(&self) -> Option<T> {
        self.values.read().measured
    }

    fn store(&self, apply: impl FnOnce(&mut MeasuredValues<T>)) -> bool {
        let mut values = self.values.write();
        let before = *values;
        apply(&mut values);
        let changed = *values != before;
        if changed {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
        changed
    }
}

impl<T: MeasurementValue> Sensor for Measurement<T> {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

impl<T: MeasurementValue> AttributeSink for Measurement<T> {
    fn apply(&self, path: AttributePath, value: &AttrValue) -> Result<bool, AttributeError> {
        if path.attribute_id == TOLERANCE {
            let AttrValue::U16(tolerance) = value else {
                return Err(AttributeError::TypeMismatch {
                    path,
                    expected: "uint16",
                    actual: value.type_name(),
                });
            };
            return Ok(self.store(|v| v.tolerance = *tolerance));
        }

        let Some(new) = T::from_attr(value) else {
            return Err(AttributeError::TypeMismatch {
                path,
                expected: T::TYPE_NAME,
                actual: value.type_name(),
            });
        };

        match path.attribute_id {
            MEASURED_VALUE => Ok(self.store(|v| v.measured = new)),
            MIN_MEASURED_VALUE => Ok(self.store(|v| v.min = new)),
            MAX_MEASURED_VALUE => Ok(self.store(|v| v.max = new)),
            _ => Err(AttributeError::UnsupportedAttribute(path)),
        }
    }

    fn value(&self, attribute_id: u32) -> Option<AttrValue> {
        let values = self.values.read();
        match attribute_id {
            MEASURED_VALUE => Some(T::to_attr(values.measured)),
            MIN_MEASURED_VALUE => Some(T::to_attr(values.min)),
            MAX_MEASURED_VALUE => Some(T::to_attr(values.max)),
            TOLERANCE => Some(AttrValue::U16(values.tolerance)),
            _ => None,
        }
    }
}

/// Handler that serves a read-only measurement cluster.
///
/// The same handler backs TemperatureMeasurement, PressureMeasurement and
/// RelativeHumidityMeasurement; `cluster` selects the metadata.
pub struct MeasurementHandler<T> {
    dataver: Dataver,
    cluster: &'static Cluster<'static>,
    state: Arc<Measurement<T>>,
    last_version: AtomicU32,
}

impl<T: MeasurementValue> MeasurementHandler<T> {
    pub fn new(dataver: Dataver, cluster: &'static Cluster<'static>, state: Arc<Measurement<T>>) -> Self {
        Self {
            dataver,
            cluster,
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
            return self.cluster.read(attr, writer);
        }

        let values = self.state.snapshot();
        let tag = writer.tag();
        {
            let mut tw = writer.writer();

            match attr.attr_id.try_into()? {
                MeasurementAttribute::MeasuredValue => T::write_tlv(&mut tw, tag, values.measured)?,
                MeasurementAttribute::MinMeasuredValue => T::write_tlv(&mut tw, tag, values.min)?,
                MeasurementAttribute::MaxMeasuredValue => T::write_tlv(&mut tw, tag, values.max)?,
                MeasurementAttribute::Tolerance => tw.u16(tag, values.tolerance)?,
            }
        }

        writer.complete()
    }

    fn write_impl(&self, _ctx: impl WriteContext) -> Result<(), Error> {
        // Cluster is read-only
        Err(ErrorCode::UnsupportedAccess.into())
    }
}

impl<T: MeasurementValue> Handler for MeasurementHandler<T> {
    fn read(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        self.read_impl(ctx, reply)
    }

    fn write(&self, ctx: impl WriteContext) -> Result<(), Error> {
        self.write_impl(ctx)
    }
}

impl<T: MeasurementValue> NonBlockingHandler for MeasurementHandler<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement() -> Measurement<i16> {
        Measurement::new(MeasuredValues {
            measured: Some(2000),
            min: Some(-4000),
            max: Some(12500),
            tolerance: 0,
        })
    }

    #[test]
    fn test_apply_bumps_version_only_on_change() {
        let m = measurement();
        let path = AttributePath::new(1, 0x0402, MEASURED_VALUE);
        assert_eq!(m.version(), 0);

        assert!(m.apply(path, &AttrValue::NullableI16(Some(2100))).unwrap());
        assert_eq!(m.measured(), Some(2100));
        assert_eq!(m.version(), 1);

        // Same value doesn't increment
        assert!(!m.apply(path, &AttrValue::NullableI16(Some(2100))).unwrap());
        assert_eq!(m.version(), 1);

        m.apply(path, &AttrValue::NullableI16(None)).unwrap();
        assert_eq!(m.measured(), None);
        assert_eq!(m.version(), 2);
    }

    #[test]
    fn test_apply_range_and_tolerance() {
        let m = measurement();
        m.apply(
            AttributePath::new(1, 0x0402, MIN_MEASURED_VALUE),
            &AttrValue::NullableI16(Some(-1000)),
        )
        .unwrap();
        m.apply(AttributePath::new(1, 0x0402, TOLERANCE), &AttrValue::U16(50))
            .unwrap();

        let snapshot = m.snapshot();
        assert_eq!(snapshot.min, Some(-1000));
        assert_eq!(snapshot.max, Some(12500));
        assert_eq!(snapshot.tolerance, 50);
        assert_eq!(m.value(TOLERANCE), Some(AttrValue::U16(50)));
    }

    #[test]
    fn test_apply_rejects_wrong_type_and_unknown_attribute() {
        let m = measurement();
        let err = m
            .apply(
                AttributePath::new(1, 0x0402, MEASURED_VALUE),
                &AttrValue::NullableU16(Some(1)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AttributeError::TypeMismatch {
                expected: "nullable int16",
                actual: "nullable uint16",
                ..
            }
        ));

        let err = m
            .apply(
                AttributePath::new(1, 0x0402, 0x0010),
                &AttrValue::NullableI16(Some(1)),
            )
            .unwrap_err();
        assert!(matches!(err, AttributeError::UnsupportedAttribute(_)));
        assert_eq!(m.version(), 0);
    }

    #[test]
    fn test_unsigned_values() {
        let m: Measurement<u16> = Measurement::new(MeasuredValues {
            measured: None,
            min: Some(0),
            max: Some(10000),
            tolerance: 0,
        });
        assert_eq!(m.value(MEASURED_VALUE), Some(AttrValue::NullableU16(None)));
        m.apply(
            AttributePath::new(3, 0x0405, MEASURED_VALUE),
            &AttrValue::NullableU16(Some(5550)),
        )
        .unwrap();
        assert_eq!(m.value(MEASURED_VALUE), Some(AttrValue::NullableU16(Some(5550))));
    }
}
