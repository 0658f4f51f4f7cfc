use std::num::NonZeroUsize;
use std::time::Duration;

use crate::shared::config::{RegistryConfig, RetentionKind};

/// How long the registry keeps result sets around.
///
/// Only terminal (completed or failed) entries are ever evicted; an evicted handle is
/// indistinguishable from one that never existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    #[default]
    Unbounded,
    /// Evict entries not read or written for this long.
    Idle(Duration),
    /// Keep at most this many entries, evicting the least recently used first.
    Lru(NonZeroUsize),
}

impl RetentionPolicy {
    pub fn from_config(cfg: &RegistryConfig) -> Self {
        match cfg.retention {
            RetentionKind::Unbounded => RetentionPolicy::Unbounded,
            RetentionKind::Ttl => {
                RetentionPolicy::Idle(Duration::from_secs(cfg.ttl_secs.unwrap_or(3600)))
            }
            RetentionKind::Lru => cfg
                .max_entries
                .and_then(NonZeroUsize::new)
                .map(RetentionPolicy::Lru)
                .unwrap_or(RetentionPolicy::Unbounded),
        }
    }
}
