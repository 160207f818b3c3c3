//! Row resolver (spec.md §3 "Row resolver", §4.3).
//!
//! Two-level mapping `tableAlias -> (columnName -> ColumnInfo)` with reverse
//! lookup by internal name. Case-insensitive on both alias and column name;
//! `IndexMap` (as the teacher's `Scope` uses for its own two-level
//! declaration tables) keeps insertion order so `*`-expansion and
//! `genColLists` produce deterministic projections (spec.md §3 invariant
//! "Row-schema density").

use indexmap::IndexMap;

use crate::error::{Result, SemanticError, SemanticErrorKind};
use crate::ir::types::TypeInfo;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub internal_name: String,
    pub ty: TypeInfo,
    /// Table alias this column is physically defined on, kept for lineage
    /// (SPEC_FULL.md §15) even after several operators have passed it
    /// through unchanged.
    pub origin_alias: Option<String>,
    pub is_hidden: bool,
}

impl ColumnInfo {
    pub fn new(internal_name: impl Into<String>, ty: TypeInfo) -> Self {
        ColumnInfo {
            internal_name: internal_name.into(),
            ty,
            origin_alias: None,
            is_hidden: false,
        }
    }

    pub fn from_alias(mut self, alias: impl Into<String>) -> Self {
        self.origin_alias = Some(alias.into());
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct RowResolver {
    // alias -> (column name lowercased -> ColumnInfo)
    by_alias: IndexMap<String, IndexMap<String, ColumnInfo>>,
    // internal name -> (alias, column name lowercased)
    by_internal_name: IndexMap<String, (String, String)>,
}

impl RowResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, alias: &str, column_name: &str, info: ColumnInfo) {
        let alias_key = alias.to_ascii_lowercase();
        let col_key = column_name.to_ascii_lowercase();
        self.by_internal_name
            .insert(info.internal_name.clone(), (alias_key.clone(), col_key.clone()));
        self.by_alias
            .entry(alias_key)
            .or_default()
            .insert(col_key, info);
    }

    pub fn get(&self, alias: Option<&str>, column_name: &str) -> Result<&ColumnInfo> {
        let col_key = column_name.to_ascii_lowercase();
        match alias {
            Some(alias) => {
                let alias_key = alias.to_ascii_lowercase();
                self.by_alias
                    .get(&alias_key)
                    .and_then(|cols| cols.get(&col_key))
                    .ok_or_else(|| {
                        SemanticError::new(
                            SemanticErrorKind::InvalidColumn,
                            format!("column `{alias}.{column_name}` not found"),
                        )
                    })
            }
            None => {
                let mut hits = self
                    .by_alias
                    .values()
                    .filter_map(|cols| cols.get(&col_key))
                    .collect::<Vec<_>>();
                match hits.len() {
                    0 => Err(SemanticError::new(
                        SemanticErrorKind::InvalidColumn,
                        format!("column `{column_name}` not found"),
                    )),
                    1 => Ok(hits.pop().unwrap()),
                    _ => Err(SemanticError::new(
                        SemanticErrorKind::AmbiguousColumn,
                        format!("column `{column_name}` is ambiguous across multiple tables"),
                    )),
                }
            }
        }
    }

    pub fn get_by_internal_name(&self, internal_name: &str) -> Option<&ColumnInfo> {
        let (alias, col) = self.by_internal_name.get(internal_name)?;
        self.by_alias.get(alias)?.get(col)
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.by_alias.contains_key(&alias.to_ascii_lowercase())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.by_alias.keys().map(|s| s.as_str())
    }

    /// All columns for one alias, in insertion order — used for `alias.*`
    /// expansion (spec.md §4.9 step 3).
    pub fn columns_for_alias(&self, alias: &str) -> Vec<&ColumnInfo> {
        self.by_alias
            .get(&alias.to_ascii_lowercase())
            .map(|cols| cols.values().filter(|c| !c.is_hidden).collect())
            .unwrap_or_default()
    }

    /// All visible columns across all aliases, in insertion order — used for
    /// bare `*` expansion.
    pub fn all_columns(&self) -> Vec<(&str, &ColumnInfo)> {
        self.by_alias
            .iter()
            .flat_map(|(alias, cols)| {
                cols.values()
                    .filter(|c| !c.is_hidden)
                    .map(move |c| (alias.as_str(), c))
            })
            .collect()
    }

    /// Like [`columns_for_alias`](Self::columns_for_alias) but also yields
    /// each column's own name, needed wherever a downstream operator must
    /// re-key a column under a new internal name (operator-tree planning,
    /// spec.md §4.9 `*`/`table.*` expansion and schema rebuilding).
    pub fn columns_for_alias_named(&self, alias: &str) -> Vec<(&str, &ColumnInfo)> {
        self.by_alias
            .get(&alias.to_ascii_lowercase())
            .map(|cols| {
                cols.iter()
                    .filter(|(_, c)| !c.is_hidden)
                    .map(|(name, c)| (name.as_str(), c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Like [`all_columns`](Self::all_columns) but also yields each column's
    /// own name.
    pub fn all_columns_full(&self) -> Vec<(&str, &str, &ColumnInfo)> {
        self.by_alias
            .iter()
            .flat_map(|(alias, cols)| {
                cols.iter()
                    .filter(|(_, c)| !c.is_hidden)
                    .map(move |(name, c)| (alias.as_str(), name.as_str(), c))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_internal_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_internal_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{PrimitiveType, TypeInfo};

    fn ty() -> TypeInfo {
        TypeInfo::Primitive(PrimitiveType::Integer)
    }

    #[test]
    fn resolves_case_insensitively() {
        let mut rr = RowResolver::new();
        rr.put("A", "Key", ColumnInfo::new("0", ty()));
        assert_eq!(rr.get(Some("a"), "key").unwrap().internal_name, "0");
        assert_eq!(rr.get(Some("A"), "KEY").unwrap().internal_name, "0");
    }

    #[test]
    fn unqualified_lookup_fails_when_ambiguous() {
        let mut rr = RowResolver::new();
        rr.put("a", "key", ColumnInfo::new("0", ty()));
        rr.put("b", "key", ColumnInfo::new("1", ty()));
        let err = rr.get(None, "key").unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::AmbiguousColumn);
    }

    #[test]
    fn unqualified_lookup_succeeds_when_unique() {
        let mut rr = RowResolver::new();
        rr.put("a", "key", ColumnInfo::new("0", ty()));
        rr.put("a", "value", ColumnInfo::new("1", ty()));
        assert_eq!(rr.get(None, "value").unwrap().internal_name, "1");
    }

    #[test]
    fn columns_preserve_insertion_order() {
        let mut rr = RowResolver::new();
        rr.put("a", "z", ColumnInfo::new("0", ty()));
        rr.put("a", "a", ColumnInfo::new("1", ty()));
        let cols = rr.columns_for_alias("a");
        assert_eq!(
            cols.iter().map(|c| &c.internal_name).collect::<Vec<_>>(),
            vec!["0", "1"]
        );
    }
}
