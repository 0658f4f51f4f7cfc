use std::sync::atomic::{AtomicU64, Ordering};

use rand::{Rng, distributions::Alphanumeric};

/// Source of handles and tickets.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random alphanumeric tokens.
pub struct RandomIds {
    len: usize,
}

impl RandomIds {
    pub fn new(len: usize) -> Self {
        Self { len: len.max(8) }
    }
}

impl Default for RandomIds {
    fn default() -> Self {
        Self::new(16)
    }
}

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(char::from)
            .collect()
    }
}

/// `prefix-1`, `prefix-2`, ... for deterministic tests.
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}
