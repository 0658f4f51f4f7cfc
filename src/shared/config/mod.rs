pub mod global;
pub mod model;

pub use global::CONFIG;
pub use model::{
    BulkConfig, BulkStoreKind, DispatchConfig, EngineConfig, LoggingConfig, RegistryConfig,
    RetentionKind, ServerConfig, Settings, TableFormat, TableSource,
};
