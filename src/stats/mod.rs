//! Statistics about what the pipeline has processed.

pub mod log;

pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, BuildStats, SharedStats,
    StatsSnapshot,
};
