pub mod channels;
pub mod dispatch;
pub mod errors;
pub mod export;
pub mod prepared;
pub mod query_engine;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod types;

pub use errors::*;
pub use service::{GlideService, GlideServiceBuilder};
