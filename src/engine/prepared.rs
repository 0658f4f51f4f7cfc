use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::engine::errors::GlideError;
use crate::engine::types::Statement;
use crate::shared::ids::IdGenerator;

/// Named, re-executable statements. A handle is an opaque reference to a resolved
/// statement; nothing about the result is cached.
pub struct PreparedStatementStore {
    ids: Arc<dyn IdGenerator>,
    statements: RwLock<HashMap<String, Statement>>,
}

impl PreparedStatementStore {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            ids,
            statements: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, statement: Statement) -> String {
        let handle = format!("ps-{}", self.ids.next_id());
        debug!(target: "glide::prepared", handle = %handle, kind = %statement.kind(), "Prepared statement registered");
        self.statements.write().insert(handle.clone(), statement);
        handle
    }

    pub fn resolve(&self, handle: &str) -> Result<Statement, GlideError> {
        self.statements
            .read()
            .get(handle)
            .cloned()
            .ok_or_else(|| GlideError::NotFound(format!("Unknown prepared statement: {handle}")))
    }

    pub fn len(&self) -> usize {
        self.statements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
