//! In-memory collaborator fixtures and an `ast!`-style builder, used by
//! unit tests throughout the crate and by `tests/scenarios.rs`. Mirrors the
//! teacher's `test-utils`-equivalent: a small in-memory catalog plus
//! helpers for building IR by hand, gated behind a `test-util` feature so
//! integration tests can depend on it without pulling it into release
//! builds (SPEC_FULL.md §14).

use std::collections::BTreeMap;

use crate::ast::{AstNode, TokenKind};
use crate::error::{Result, SemanticError, SemanticErrorKind};
use crate::ir::types::{PrimitiveType, TypeInfo};
use crate::metastore::{ColumnSchema, FileFormat, Metastore, Partition, Table};

#[derive(Debug, Default)]
pub struct FixtureMetastore {
    tables: BTreeMap<String, Table>,
    partitions: BTreeMap<String, Vec<Partition>>,
}

impl FixtureMetastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    pub fn with_partitions(mut self, table_name: &str, partitions: Vec<Partition>) -> Self {
        self.partitions.insert(table_name.to_string(), partitions);
        self
    }

    /// A single unpartitioned, unbucketed table with one integer column
    /// `key` and one string column `value` — the default shape used
    /// whenever a test only cares about plumbing, not schema.
    pub fn with_unpartitioned_table(name: &str) -> Self {
        FixtureMetastore::new().with_table(Table {
            name: name.to_string(),
            schema: vec![
                ColumnSchema {
                    name: "key".to_string(),
                    ty: TypeInfo::Primitive(PrimitiveType::Integer),
                },
                ColumnSchema {
                    name: "value".to_string(),
                    ty: TypeInfo::Primitive(PrimitiveType::String),
                },
            ],
            partition_cols: vec![],
            bucket_cols: vec![],
            num_buckets: None,
            input_format: FileFormat::Text,
            output_format: FileFormat::Text,
            location: format!("/warehouse/{name}"),
        })
    }

    pub fn with_partitioned_table(name: &str, partition_col: &str) -> Self {
        let mut ms = Self::with_unpartitioned_table(name);
        if let Some(t) = ms.tables.get_mut(name) {
            t.partition_cols.push(ColumnSchema {
                name: partition_col.to_string(),
                ty: TypeInfo::Primitive(PrimitiveType::String),
            });
        }
        ms
    }
}

impl Metastore for FixtureMetastore {
    fn get_table(&self, name: &str) -> Result<Table> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| SemanticError::new(SemanticErrorKind::InvalidTable, format!("table `{name}` does not exist")))
    }

    fn list_partitions(&self, table: &Table) -> Result<Vec<Partition>> {
        Ok(self.partitions.get(&table.name).cloned().unwrap_or_default())
    }
}

/// Builds a leaf `AstNode` with no children, for concise hand-written test
/// trees (`leaf(TokenKind::Identifier, "x")`).
pub fn leaf(kind: TokenKind, text: impl Into<String>) -> AstNode {
    AstNode::new(kind, text)
}

/// Builds an interior `AstNode`.
pub fn node(kind: TokenKind, children: Vec<AstNode>) -> AstNode {
    AstNode::new(kind, "").with_children(children)
}
