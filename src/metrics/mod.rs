pub mod bucket;
pub mod collector;
pub mod histogram;
pub mod sharded;

pub use bucket::{Bucket, EndpointStats};
pub use collector::{Collector, DataPoint, Stats};
pub use histogram::LatencyHistogram;
pub use sharded::ShardedStats;
