//! Table definitions.

use super::column::Column;
use super::hash::{SchemaHash, StructuralHasher};
use super::value::Value;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A named index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Indexed columns, in key order.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    /// Create a non-unique index.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
        }
    }

    /// Create a unique index.
    pub fn unique(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: true,
        }
    }

    /// Whether two indexes cover the same columns with the same uniqueness.
    pub fn same_shape(&self, columns: &[String], unique: bool) -> bool {
        self.unique == unique && self.columns == columns
    }
}

/// Seed rows applied once per data version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedData {
    /// Data version; rows are applied when it exceeds the tracked one.
    pub version: u32,
    /// Rows, with values in column order. Trailing columns may be omitted.
    pub rows: Vec<Vec<Value>>,
}

/// A recorded table rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRename {
    /// Tracking id of the table's persisted identity.
    pub internal_id: u64,
    /// Name the table had.
    pub previous_name: String,
    /// Table version under that name.
    pub previous_version: u32,
}

fn default_version() -> u32 {
    1
}

/// A table definition (desired state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Free-form comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// Category label.
    #[serde(default)]
    pub category: Option<String>,
    /// Storage hint for table data.
    #[serde(default)]
    pub tablespace: Option<String>,
    /// Storage hint for indexes.
    #[serde(default)]
    pub index_space: Option<String>,
    /// Declared table version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Columns in physical order.
    pub columns: Vec<Column>,
    /// Declared multi-column indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    /// Seed data.
    #[serde(default)]
    pub data: Option<SeedData>,
    /// Rename history, oldest first.
    #[serde(default)]
    pub renames: Vec<TableRename>,
}

impl Table {
    /// Create an empty table definition.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            comment: None,
            category: None,
            tablespace: None,
            index_space: None,
            version,
            columns: Vec::new(),
            indexes: Vec::new(),
            data: None,
            renames: Vec::new(),
        }
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the category label.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set storage hints.
    pub fn with_storage(
        mut self,
        tablespace: impl Into<String>,
        index_space: impl Into<String>,
    ) -> Self {
        self.tablespace = Some(tablespace.into());
        self.index_space = Some(index_space.into());
        self
    }

    /// Append a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Append the primary-key column. Key columns are always NOT NULL.
    pub fn with_pk_column(mut self, column: Column) -> Self {
        let mut column = column.not_null();
        column.primary_key = true;
        self.columns.push(column);
        self
    }

    /// Register a non-unique composite index.
    pub fn with_index(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.indexes.push(IndexDef::new(
            name,
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }

    /// Register a unique composite index.
    pub fn with_unique_index(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.indexes.push(IndexDef::unique(
            name,
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }

    /// Set the seed data version. Existing rows are kept.
    pub fn with_data_version(mut self, version: u32) -> Self {
        match &mut self.data {
            Some(data) => data.version = version,
            None => {
                self.data = Some(SeedData {
                    version,
                    rows: Vec::new(),
                })
            }
        }
        self
    }

    /// Append a seed row (primary key first, then the remaining columns in order).
    pub fn with_data(mut self, row: Vec<Value>) -> Self {
        self.data
            .get_or_insert_with(|| SeedData {
                version: 1,
                rows: Vec::new(),
            })
            .rows
            .push(row);
        self
    }

    /// Record that this table was previously known as `previous_name`.
    pub fn renamed_from(
        mut self,
        internal_id: u64,
        previous_name: impl Into<String>,
        previous_version: u32,
    ) -> Self {
        self.renames.push(TableRename {
            internal_id,
            previous_name: previous_name.into(),
            previous_version,
        });
        self
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get the primary-key column.
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Get the auto-increment key column, if any.
    pub fn auto_increment_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key && c.auto_increment)
    }

    /// Seed data version, 0 when the table declares none.
    pub fn data_version(&self) -> u32 {
        self.data.as_ref().map(|d| d.version).unwrap_or(0)
    }

    /// Every index the table needs: one per `unique`/`indexed` column, then
    /// the declared composite indexes.
    pub fn effective_indexes(&self) -> Vec<IndexDef> {
        let mut indexes = Vec::new();
        for column in &self.columns {
            if column.primary_key {
                continue;
            }
            if column.unique {
                indexes.push(IndexDef::unique(
                    format!("UX_{}_{}", self.name, column.name),
                    vec![column.name.clone()],
                ));
            } else if column.indexed {
                indexes.push(IndexDef::new(
                    format!("IX_{}_{}", self.name, column.name),
                    vec![column.name.clone()],
                ));
            }
        }
        indexes.extend(self.indexes.iter().cloned());
        indexes
    }

    /// Aggregate hash over the table name, every column (name and hash, in
    /// order) and the declared indexes.
    pub fn hash(&self) -> SchemaHash {
        let mut hasher = StructuralHasher::new("table");
        hasher.str(&self.name).u64(self.columns.len() as u64);
        for column in &self.columns {
            hasher.str(&column.name).u64(column.hash().0);
        }
        hasher.u64(self.indexes.len() as u64);
        for index in &self.indexes {
            hasher.str(&index.name).bool(index.unique);
            for column in &index.columns {
                hasher.str(column);
            }
        }
        hasher.finish()
    }

    /// Check structural consistency.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::invalid_schema(&self.name, "table has no columns"));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(Error::invalid_schema(
                    &self.name,
                    format!("duplicate column '{}'", column.name),
                ));
            }
            if column.auto_increment && !(column.primary_key && column.sql_type.is_integer()) {
                return Err(Error::invalid_schema(
                    &self.name,
                    format!(
                        "auto-increment column '{}' must be an integer primary key",
                        column.name
                    ),
                ));
            }
            if column.primary_key && column.nullable {
                return Err(Error::invalid_schema(
                    &self.name,
                    format!("primary key '{}' cannot be nullable", column.name),
                ));
            }
            for previous in &column.previous_names {
                if previous == &column.name {
                    return Err(Error::invalid_schema(
                        &self.name,
                        format!("column '{}' lists itself as a previous name", column.name),
                    ));
                }
            }
        }

        if self.columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(Error::invalid_schema(
                &self.name,
                "more than one primary-key column",
            ));
        }

        let mut index_names = HashSet::new();
        for index in self.effective_indexes() {
            if !index_names.insert(index.name.to_ascii_lowercase()) {
                return Err(Error::invalid_schema(
                    &self.name,
                    format!("duplicate index name '{}'", index.name),
                ));
            }
            if index.columns.is_empty() {
                return Err(Error::invalid_schema(
                    &self.name,
                    format!("index '{}' has no columns", index.name),
                ));
            }
            for column in &index.columns {
                if self.column(column).is_none() {
                    return Err(Error::invalid_schema(
                        &self.name,
                        format!("index '{}' names unknown column '{}'", index.name, column),
                    ));
                }
            }
        }

        if let Some(data) = &self.data {
            for (idx, row) in data.rows.iter().enumerate() {
                if row.len() > self.columns.len() {
                    return Err(Error::invalid_schema(
                        &self.name,
                        format!(
                            "seed row {} has {} values for {} columns",
                            idx,
                            row.len(),
                            self.columns.len()
                        ),
                    ));
                }
            }
        }

        Ok(())
    }
}
