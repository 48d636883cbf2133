pub mod analyzer;
pub mod collector;
pub mod progress;
