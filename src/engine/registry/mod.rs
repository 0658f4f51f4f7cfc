mod result_set_registry;
mod retention;

pub use result_set_registry::{EvictionListener, ResultSetRegistry};
pub use retention::RetentionPolicy;

#[cfg(test)]
mod result_set_registry_test;
