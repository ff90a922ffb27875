//! TemperatureMeasurement cluster (0x0402).
//!
//! Temperature is reported in centidegrees Celsius (value * 100).
//! For example: 21.5°C is reported as 2150.

use rs_matter::dm::Cluster;
use rs_matter::with;

use super::measurement;

/// Matter Cluster ID for TemperatureMeasurement
pub const CLUSTER_ID: u32 = 0x0402;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 4;

/// Cluster metadata definition
pub const CLUSTER: Cluster<'static> = Cluster {
    id: CLUSTER_ID,
    revision: CLUSTER_REVISION,
    feature_map: 0,
    attributes: measurement::ATTRIBUTES,
    commands: &[],
    with_attrs: with!(all),
    with_cmds: with!(all),
};
