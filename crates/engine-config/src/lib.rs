pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{
    batch::{BatchConfig, BatchConfigBuilder, DEFAULT_COMMON_MANIFEST_FILES},
    resource::ResourceConfig,
    streaming::StreamingConfig,
};
