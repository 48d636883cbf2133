pub mod coordinator;
pub mod error;
pub mod retry;
pub mod strategy;
pub mod streaming;

pub use coordinator::{BatchCoordinator, results::RunResults};
pub use error::RunError;
