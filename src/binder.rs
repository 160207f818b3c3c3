//! Metadata binder (spec.md §4.2).
//!
//! Resolves table aliases against the metastore collaborator and
//! materializes directory destinations to scratch paths. Kept as a thin
//! pass over an already-populated `Qb` rather than folded into phase-1, the
//! same way the teacher keeps its resolver's catalog lookups (`Resolver::
//! fold_table_ref`) separate from parsing.

use log::debug;

use crate::error::{Result, SemanticError, SemanticErrorKind};
use crate::ir::qb::{Destination, Qb};
use crate::metastore::Metastore;
use crate::session::AnalyzerSession;

/// Binds every table alias in `qb` (and any nested subquery QB, recursively
/// via `qb.subq_for_alias`) against `catalog`, populating `qb.meta_data`.
pub fn bind_tables(qb: &mut Qb, catalog: &dyn Metastore) -> Result<()> {
    for alias in qb.tab_aliases.clone() {
        let table_name = qb
            .tab_name_for_alias
            .get(&alias)
            .cloned()
            .unwrap_or_else(|| alias.clone());
        let table = catalog.get_table(&table_name)?;
        validate_format(&table)?;
        debug!("bound alias `{alias}` to table `{table_name}`");
        qb.meta_data.tables.insert(alias, table);
    }

    for (alias, subq) in qb.subq_for_alias.iter_mut() {
        debug!("descending into subquery alias `{alias}`");
        bind_qb_expr(subq, catalog)?;
    }
    Ok(())
}

fn bind_qb_expr(expr: &mut crate::ir::qb::QbExpr, catalog: &dyn Metastore) -> Result<()> {
    use crate::ir::qb::QbExpr::*;
    match expr {
        Single(qb) => bind_tables(qb, catalog),
        UnionAll(lhs, rhs) => {
            bind_qb_expr(lhs, catalog)?;
            bind_qb_expr(rhs, catalog)
        }
    }
}

/// spec.md §4.2: "verify the declared input/output format type is
/// acceptable". `FileFormat::Other` is how a metastore reports a
/// format-class name this core doesn't implement a reader/writer for;
/// every other variant is always acceptable.
fn validate_format(table: &crate::metastore::Table) -> Result<()> {
    if let crate::metastore::FileFormat::Other(name) = &table.input_format {
        return Err(invalid_format_error(SemanticErrorKind::InvalidInputFormatType, name));
    }
    if let crate::metastore::FileFormat::Other(name) = &table.output_format {
        return Err(invalid_format_error(SemanticErrorKind::InvalidOutputFormatType, name));
    }
    Ok(())
}

/// Resolves every destination in `qb`: table/partition destinations are
/// verified against the catalog, directory destinations are materialized
/// to a session-unique scratch path (spec.md §4.2, §6 destination layout).
pub fn bind_destinations(qb: &mut Qb, catalog: &dyn Metastore, session: &mut AnalyzerSession) -> Result<()> {
    let names = qb.destination_names();
    for name in names {
        let clause = qb.dest_mut(&name);
        match &clause.destination {
            Destination::Table { name: table_name, .. } => {
                catalog.get_table(table_name)?;
            }
            Destination::File { .. } => {}
            Destination::Unresolved => {
                let path = session.next_scratch_path(&name);
                debug!("materialized destination `{name}` to scratch path `{path}`");
                clause.destination = Destination::File { path };
            }
        }
    }
    Ok(())
}

pub fn invalid_format_error(kind: SemanticErrorKind, format_name: &str) -> SemanticError {
    SemanticError::new(kind, format!("unsupported storage format `{format_name}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::qb::Qb;
    use crate::metastore::BuiltinRegistry;
    use crate::testutil::FixtureMetastore;

    #[test]
    fn binds_known_table_alias() {
        let mut qb = Qb::new("", None, false);
        qb.tab_aliases.insert("t".to_string());
        qb.tab_name_for_alias.insert("t".to_string(), "orders".to_string());
        let ms = FixtureMetastore::with_unpartitioned_table("orders");
        bind_tables(&mut qb, &ms).unwrap();
        assert!(qb.meta_data.tables.contains_key("t"));
        let _ = BuiltinRegistry;
    }

    #[test]
    fn unrecognized_input_format_is_rejected() {
        let mut qb = Qb::new("", None, false);
        qb.tab_aliases.insert("t".to_string());
        qb.tab_name_for_alias.insert("t".to_string(), "weird".to_string());
        let mut table = FixtureMetastore::with_unpartitioned_table("weird")
            .get_table("weird")
            .unwrap();
        table.input_format = crate::metastore::FileFormat::Other("com.example.CustomInputFormat".to_string());
        let ms = FixtureMetastore::new().with_table(table);
        let err = bind_tables(&mut qb, &ms).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::InvalidInputFormatType);
    }

    #[test]
    fn unknown_table_name_errors() {
        let mut qb = Qb::new("", None, false);
        qb.tab_aliases.insert("t".to_string());
        qb.tab_name_for_alias.insert("t".to_string(), "missing".to_string());
        let ms = FixtureMetastore::with_unpartitioned_table("orders");
        let err = bind_tables(&mut qb, &ms).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::InvalidTable);
    }

    #[test]
    fn unresolved_destination_gets_scratch_path() {
        let mut qb = Qb::new("", None, false);
        qb.dest_mut("insclause-0");
        let ms = FixtureMetastore::with_unpartitioned_table("orders");
        let mut session = AnalyzerSession::new("sess1");
        bind_destinations(&mut qb, &ms, &mut session).unwrap();
        match &qb.dest("insclause-0").unwrap().destination {
            Destination::File { path } => assert_eq!(path, "sess1.0.insclause-0"),
            other => panic!("expected File destination, got {other:?}"),
        }
    }
}
