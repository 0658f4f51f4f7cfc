use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub catalog_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSchema {
    pub catalog_name: String,
    pub db_schema_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub catalog_name: String,
    pub db_schema_name: String,
    pub table_name: String,
    pub table_type: String,
    /// Hex-encoded Arrow IPC schema message.
    pub table_schema: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableType {
    pub table_type: String,
}

/// Filters of the metadata listing routes. Empty means "any".
///
/// Patterns use SQL LIKE syntax: `%` matches any run of characters, `_` exactly one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CatalogFilter {
    #[serde(default)]
    pub catalog: String,
    #[serde(default)]
    pub db_schema_filter_pattern: String,
    #[serde(default)]
    pub table_name_filter_pattern: String,
}

impl CatalogFilter {
    pub fn matches_catalog(&self, catalog: &str) -> bool {
        self.catalog.is_empty() || self.catalog == catalog
    }

    pub fn matches_schema(&self, schema: &str) -> bool {
        like_match(&self.db_schema_filter_pattern, schema)
    }

    pub fn matches_table(&self, table: &str) -> bool {
        like_match(&self.table_name_filter_pattern, table)
    }
}

pub fn like_match(pattern: &str, value: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    // Greedy wildcard matching with single-point backtracking on the last '%'.
    let (mut p, mut v) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;
    while v < value.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == value[v]) {
            p += 1;
            v += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some(p);
            p += 1;
            resume = v;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            v = resume;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }
    p == pattern.len()
}
