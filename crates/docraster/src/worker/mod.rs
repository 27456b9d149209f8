pub mod pool;

pub use pool::{PoolConfig, WorkerPool};
