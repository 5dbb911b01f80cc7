use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One telemetry sample from a load generator host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub time: DateTime<Utc>,
    /// Selected fields by alias, e.g. `system`, `user`, `load1`. `None` when the host reported
    /// nothing for the field in this bucket.
    pub values: BTreeMap<String, Option<f64>>,
}

/// Health samples per host, in the order the store returned them.
///
/// Hosts are not aligned to a shared axis, each keeps its own sampling cadence.
pub type HostSeries = BTreeMap<String, Vec<HealthSample>>;
