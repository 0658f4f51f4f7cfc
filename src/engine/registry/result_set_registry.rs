use std::sync::Arc;
use std::time::Instant;

use arrow_schema::SchemaRef;
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::engine::errors::RegistryError;
use crate::engine::registry::retention::RetentionPolicy;
use crate::engine::types::{Endpoint, ExecutionFailure, ResultSet, ResultStatus};

/// Told about every handle the retention policy drops.
pub trait EvictionListener: Send + Sync {
    fn evicted(&self, handle: &str);
}

struct Entry {
    result_set: ResultSet,
    touched: Instant,
}

/// Owns every `ResultSet` of the process, keyed by handle.
///
/// Every read returns a snapshot, so an endpoint is either fully visible or not at all.
/// Endpoints are append-only and the lifecycle only moves `in-progress -> completed` or
/// `in-progress -> failed`.
pub struct ResultSetRegistry {
    entries: Mutex<LruCache<String, Entry>>,
    policy: RetentionPolicy,
    listener: Option<Arc<dyn EvictionListener>>,
}

impl ResultSetRegistry {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            policy,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn EvictionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn create(&self, handle: &str, schema: SchemaRef) -> Result<ResultSet, RegistryError> {
        let mut entries = self.entries.lock();
        self.evict(&mut entries, Instant::now());

        if entries.contains(handle) {
            return Err(RegistryError::DuplicateHandle(handle.to_string()));
        }
        let result_set = ResultSet::new(handle, schema);
        entries.put(
            handle.to_string(),
            Entry {
                result_set: result_set.clone(),
                touched: Instant::now(),
            },
        );
        self.evict(&mut entries, Instant::now());
        debug!(target: "glide::registry", handle, size = entries.len(), "Result set created");
        Ok(result_set)
    }

    pub fn get(&self, handle: &str) -> Result<ResultSet, RegistryError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let entry = self.live_entry(&mut entries, handle, now)?;
        entry.touched = now;
        Ok(entry.result_set.clone())
    }

    /// Appends an endpoint and returns the new endpoint count.
    pub fn append_endpoint(
        &self,
        handle: &str,
        endpoint: Endpoint,
    ) -> Result<usize, RegistryError> {
        self.mutate(handle, |result_set| {
            if result_set.status != ResultStatus::InProgress {
                return Err(RegistryError::Sealed {
                    handle: result_set.handle.clone(),
                    status: result_set.status,
                });
            }
            debug!(target: "glide::registry", handle = %result_set.handle, ticket = %endpoint.ticket, "Endpoint appended");
            result_set.endpoints.push(endpoint);
            Ok(result_set.endpoints.len())
        })
    }

    /// Marks the result set completed. Completing an already completed set is a no-op.
    pub fn complete(&self, handle: &str) -> Result<ResultSet, RegistryError> {
        self.transition(handle, ResultStatus::Completed, None)
    }

    /// Marks the result set failed with `failure`. Failing an already failed set is a no-op.
    pub fn fail(
        &self,
        handle: &str,
        failure: ExecutionFailure,
    ) -> Result<ResultSet, RegistryError> {
        self.transition(handle, ResultStatus::Failed, Some(failure))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn transition(
        &self,
        handle: &str,
        to: ResultStatus,
        failure: Option<ExecutionFailure>,
    ) -> Result<ResultSet, RegistryError> {
        self.mutate(handle, |result_set| {
            match (result_set.status, to) {
                (from, to) if from == to => return Ok(result_set.clone()),
                (ResultStatus::InProgress, _) => {}
                (from, to) => {
                    return Err(RegistryError::InvalidTransition {
                        handle: result_set.handle.clone(),
                        from,
                        to,
                    });
                }
            }
            result_set.status = to;
            result_set.error = failure;
            info!(
                target: "glide::registry",
                handle = %result_set.handle,
                status = %to,
                endpoints = result_set.endpoints.len(),
                "Result set finished"
            );
            Ok(result_set.clone())
        })
    }

    fn mutate<T>(
        &self,
        handle: &str,
        apply: impl FnOnce(&mut ResultSet) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let entry = self.live_entry(&mut entries, handle, now)?;
        entry.touched = now;
        let result = apply(&mut entry.result_set)?;
        entry.result_set.updated_at = Utc::now();
        Ok(result)
    }

    fn live_entry<'a>(
        &self,
        entries: &'a mut LruCache<String, Entry>,
        handle: &str,
        now: Instant,
    ) -> Result<&'a mut Entry, RegistryError> {
        let expired = match (self.policy, entries.peek(handle)) {
            (_, None) => return Err(RegistryError::UnknownHandle(handle.to_string())),
            (RetentionPolicy::Idle(ttl), Some(entry)) => {
                entry.result_set.status.is_terminal() && now.duration_since(entry.touched) > ttl
            }
            _ => false,
        };
        if expired {
            entries.pop(handle);
            debug!(target: "glide::registry", handle, "Result set expired");
            self.notify_evicted(handle);
            return Err(RegistryError::UnknownHandle(handle.to_string()));
        }
        entries
            .get_mut(handle)
            .ok_or_else(|| RegistryError::UnknownHandle(handle.to_string()))
    }

    fn evict(&self, entries: &mut LruCache<String, Entry>, now: Instant) {
        let victims: Vec<String> = match self.policy {
            RetentionPolicy::Unbounded => return,
            RetentionPolicy::Idle(ttl) => entries
                .iter()
                .rev()
                .take_while(|(_, entry)| now.duration_since(entry.touched) > ttl)
                .filter(|(_, entry)| entry.result_set.status.is_terminal())
                .map(|(handle, _)| handle.clone())
                .collect(),
            RetentionPolicy::Lru(max) => {
                let excess = entries.len().saturating_sub(max.get());
                entries
                    .iter()
                    .rev()
                    .filter(|(_, entry)| entry.result_set.status.is_terminal())
                    .take(excess)
                    .map(|(handle, _)| handle.clone())
                    .collect()
            }
        };
        for handle in victims {
            entries.pop(&handle);
            debug!(target: "glide::registry", handle = %handle, "Result set evicted");
            self.notify_evicted(&handle);
        }
    }

    fn notify_evicted(&self, handle: &str) {
        if let Some(listener) = &self.listener {
            listener.evicted(handle);
        }
    }
}

impl Default for ResultSetRegistry {
    fn default() -> Self {
        Self::new(RetentionPolicy::Unbounded)
    }
}
