//! Attribute values and the attribute update path.
//!
//! Every local change to a cluster attribute (default values, simulated
//! readings, shell input, IdentifyTime writes from controllers) goes through
//! [`AttributeUpdater::update`]:
//!
//! 1. the registered [`AttributeUpdateListener`] sees the change in the
//!    [`UpdatePhase::PreUpdate`] phase and may reject it,
//! 2. the value is applied to the cluster state (bumping its version so the
//!    cluster handler changes its dataver),
//! 3. a real change is queued on the [`ClusterNotifier`] for subscribers,
//! 4. the listener sees the change again in [`UpdatePhase::PostUpdate`].

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use super::notifier::ClusterNotifier;
use crate::driver::{DriverError, DriverId};

/// Matter endpoint identifier.
pub type EndpointId = u16;

/// Tagged, nullable attribute value.
///
/// `None` inside a nullable variant is the Matter `null` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrValue {
    NullableI16(Option<i16>),
    NullableU16(Option<u16>),
    NullableU8(Option<u8>),
    U16(u16),
}

impl AttrValue {
    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NullableI16(_) => "nullable int16",
            Self::NullableU16(_) => "nullable uint16",
            Self::NullableU8(_) => "nullable uint8",
            Self::U16(_) => "uint16",
        }
    }

    /// Whether the value is the Matter `null` value.
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Self::NullableI16(None) | Self::NullableU16(None) | Self::NullableU8(None)
        )
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullableI16(Some(v)) => write!(f, "{}", v),
            Self::NullableU16(Some(v)) => write!(f, "{}", v),
            Self::NullableU8(Some(v)) => write!(f, "{}", v),
            Self::U16(v) => write!(f, "{}", v),
            _ => write!(f, "null"),
        }
    }
}

/// Fully qualified attribute address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributePath {
    pub endpoint_id: EndpointId,
    pub cluster_id: u32,
    pub attribute_id: u32,
}

impl AttributePath {
    pub const fn new(endpoint_id: EndpointId, cluster_id: u32, attribute_id: u32) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            attribute_id,
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ep{}/0x{:04X}/0x{:04X}",
            self.endpoint_id, self.cluster_id, self.attribute_id
        )
    }
}

/// Phase of an attribute update reported to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    /// Before the value is stored; an error rejects the update.
    PreUpdate,
    /// After the value is stored; errors are only logged.
    PostUpdate,
}

/// Errors from the attribute update path.
#[derive(Debug, Error)]
pub enum AttributeError {
    /// No cluster state is bound to this endpoint/cluster pair.
    #[error("no cluster bound at {0}")]
    UnknownCluster(AttributePath),

    /// The cluster does not accept updates for this attribute.
    #[error("attribute {0} is not updatable")]
    UnsupportedAttribute(AttributePath),

    /// The value's type does not match the attribute.
    #[error("attribute {path} expects {expected}, got {actual}")]
    TypeMismatch {
        path: AttributePath,
        expected: &'static str,
        actual: &'static str,
    },

    /// The pre-update listener rejected the change.
    #[error("update rejected: {0}")]
    Rejected(#[from] DriverError),
}

/// Cluster state that accepts attribute values.
pub trait AttributeSink: Send + Sync {
    /// Store `value` for `path.attribute_id`. Returns whether the state changed.
    fn apply(&self, path: AttributePath, value: &AttrValue) -> Result<bool, AttributeError>;

    /// Current value of an attribute, if this sink owns it.
    fn value(&self, attribute_id: u32) -> Option<AttrValue>;
}

/// Listener notified around every attribute update.
pub trait AttributeUpdateListener: Send + Sync {
    /// `driver` is the handle bound to the endpoint at creation, if any.
    fn on_attribute_update(
        &self,
        phase: UpdatePhase,
        path: AttributePath,
        value: &AttrValue,
        driver: Option<DriverId>,
    ) -> Result<(), DriverError>;
}

/// Binding of one cluster on one endpoint to its state.
pub struct AttributeBinding {
    pub endpoint_id: EndpointId,
    pub cluster_id: u32,
    pub driver: Option<DriverId>,
    pub sink: Arc<dyn AttributeSink>,
}

/// The attribute system: routes updates through the listener into cluster state.
pub struct AttributeUpdater {
    bindings: Vec<AttributeBinding>,
    listener: Arc<dyn AttributeUpdateListener>,
    notifier: Arc<ClusterNotifier>,
}

impl AttributeUpdater {
    pub fn new(bindings: Vec<AttributeBinding>, listener: Arc<dyn AttributeUpdateListener>) -> Self {
        Self {
            bindings,
            listener,
            notifier: Arc::new(ClusterNotifier::new()),
        }
    }

    /// Clusters changed by updates, for the Matter stack to report.
    pub fn notifier(&self) -> &Arc<ClusterNotifier> {
        &self.notifier
    }

    fn binding(&self, endpoint_id: EndpointId, cluster_id: u32) -> Option<&AttributeBinding> {
        self.bindings
            .iter()
            .find(|b| b.endpoint_id == endpoint_id && b.cluster_id == cluster_id)
    }

    /// Update an attribute value.
    pub fn update(
        &self,
        endpoint_id: EndpointId,
        cluster_id: u32,
        attribute_id: u32,
        value: AttrValue,
    ) -> Result<(), AttributeError> {
        let path = AttributePath::new(endpoint_id, cluster_id, attribute_id);
        let binding = self
            .binding(endpoint_id, cluster_id)
            .ok_or(AttributeError::UnknownCluster(path))?;

        self.listener
            .on_attribute_update(UpdatePhase::PreUpdate, path, &value, binding.driver)?;

        if binding.sink.apply(path, &value)? {
            debug!("Attribute {} set to {}", path, value);
            self.notifier.notify(endpoint_id, cluster_id);
        }

        if let Err(e) =
            self.listener
                .on_attribute_update(UpdatePhase::PostUpdate, path, &value, binding.driver)
        {
            warn!("Post-update handling of {} failed: {}", path, e);
        }

        Ok(())
    }

    /// Read the current value of an attribute.
    pub fn value(&self, endpoint_id: EndpointId, cluster_id: u32, attribute_id: u32) -> Option<AttrValue> {
        self.binding(endpoint_id, cluster_id)
            .and_then(|b| b.sink.value(attribute_id))
    }
}
