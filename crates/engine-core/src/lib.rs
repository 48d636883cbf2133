pub mod cache;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod rate_limit;
pub mod resource;
pub mod retry;
pub mod transport;
