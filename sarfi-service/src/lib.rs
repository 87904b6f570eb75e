pub mod aggregate;
pub mod config;
pub mod http_api;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sources;

pub use aggregate::{SarfiDataPoint, SarfiReport, SarfiThreshold, WeightedSummary};
pub use pipeline::{SarfiError, SarfiFilters, SarfiPipeline};
