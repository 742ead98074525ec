pub mod cli;
pub mod cluster;
pub mod commands;
pub mod config;
pub mod executor;
pub mod fleet;
pub mod pool;
pub mod registry;
pub mod shared;
pub mod target;
pub mod transport;
pub mod ui;
pub mod utils;

pub use cluster::ClusterRegistry;
pub use config::Config;
pub use executor::ParallelExecutor;
pub use fleet::Fleet;
pub use pool::ConnectionPool;
pub use registry::TargetRegistry;
pub use target::TargetConfig;
