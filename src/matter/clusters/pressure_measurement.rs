//! PressureMeasurement cluster (0x0403).
//!
//! Pressure is reported in units of 0.1 kPa, so 101.3 kPa is 1013.
//! Only the mandatory attributes are served (no extended feature).

use rs_matter::dm::Cluster;
use rs_matter::with;

use super::measurement;

/// Matter Cluster ID for PressureMeasurement
pub const CLUSTER_ID: u32 = 0x0403;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 3;

pub const CLUSTER: Cluster<'static> = Cluster {
    id: CLUSTER_ID,
    revision: CLUSTER_REVISION,
    feature_map: 0,
    attributes: measurement::ATTRIBUTES,
    commands: &[],
    with_attrs: with!(all),
    with_cmds: with!(all),
};
