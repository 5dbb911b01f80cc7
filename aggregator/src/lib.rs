//! Aggregation of raw performance test telemetry into chart series.
//!
//! [ChartAggregator] picks a bucket width for a run, computes the concurrent users and the shared
//! timestamp axis, and builds response time, throughput, hits, error and response code series
//! that can be overlaid on that axis. It also produces whole-run rollups, comparison tables and
//! load generator health telemetry.

mod aggregator;
pub mod config;
mod frame;
pub mod model;
pub mod query;
mod rebucket;
pub mod store;

#[cfg(any(test, feature = "test_data"))]
pub mod test_data;

pub use aggregator::ChartAggregator;
pub use config::EngineConfig;
pub use store::{InfluxStore, StoreError, TimeSeriesStore};
