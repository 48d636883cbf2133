pub mod metrics;
pub mod opportunity;
pub mod quota;
