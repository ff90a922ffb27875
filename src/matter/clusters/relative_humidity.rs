//! RelativeHumidityMeasurement cluster (0x0405).
//!
//! Humidity is reported in centi-percent (value * 100).
//! For example: 55.5% is reported as 5550.

use rs_matter::dm::Cluster;
use rs_matter::with;

use super::measurement;

/// Matter Cluster ID for RelativeHumidityMeasurement
pub const CLUSTER_ID: u32 = 0x0405;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 3;

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
