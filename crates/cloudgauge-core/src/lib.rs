pub mod config;
pub mod error;
pub mod types;

pub use config::{CloudConfig, CollectionConfig, ExporterConfig, ServerConfig, ServiceEndpoint};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
