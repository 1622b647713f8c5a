//! Catalog store: constraints.

use metacat_proto::{ConstraintDef, ConstraintKind, ConstraintType, TableConstraints, TableDef, TableRef};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;
use tracing::{debug, info, warn};

use super::keys;
use super::store::CatalogStore;
use super::table::load_parents;
use crate::storage::txn::{abort, finish, get, read, write};
use crate::constraint::ConstraintValidator;
use crate::error::Error;
use crate::storage::record::Record;

impl CatalogStore {
    /// Add a batch of constraints to one table atomically.
    ///
    /// Unnamed constraints receive a derived name. Any rejected constraint
    /// rejects the whole batch. Returns the constraints as stored.
    pub fn add_constraints(&self, batch: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        let Some(first) = batch.first() else {
            return Ok(Vec::new());
        };
        let table_ref = first.table.clone();
        let table_key = keys::table(&table_ref);

        let result = (&self.tables, &self.constraints).transaction(|(tables, constraint_sets)| {
            let Some(table) = read::<TableDef>(tables, &table_key)? else {
                return abort(Error::InvalidSchemaObject(format!(
                    "Table {} does not exist",
                    table_ref
                )));
            };
            let mut existing = read::<TableConstraints>(constraint_sets, &table_key)?.unwrap_or_default();

            let parents = load_parents(tables, constraint_sets, &table_ref, &batch)?;
            let prepared = ConstraintValidator::new(&table, &existing, &parents)
                .prepare(batch.clone())
                .map_err(ConflictableTransactionError::Abort)?;

            for constraint in &prepared {
                existing.push(constraint.clone());
            }
            write(constraint_sets, &table_key, &existing)?;
            Ok(prepared)
        });

        let added = finish(result)
            .inspect_err(|e| warn!(table = %table_ref, error = %e, "Rejected constraint batch"))?;
        for c in &added {
            info!(
                table = %table_ref,
                constraint = c.name().unwrap_or_default(),
                kind = ?c.constraint_type(),
                "Added constraint"
            );
        }
        Ok(added)
    }

    /// Constraints of one kind on a table, in commit order.
    ///
    /// Empty when the table, its database or its catalog is absent.
    pub fn get_constraints(&self, table: &TableRef, constraint_type: ConstraintType) -> Result<Vec<ConstraintDef>, Error> {
        debug!(table = %table, kind = ?constraint_type, "Looking up constraints");
        Ok(self.get_table_constraints(table)?.of_type(constraint_type).to_vec())
    }

    /// Every constraint on a table, grouped by kind.
    pub fn get_table_constraints(&self, table: &TableRef) -> Result<TableConstraints, Error> {
        Ok(get::<TableConstraints>(&self.constraints, &keys::table(table))?.unwrap_or_default())
    }

    /// Foreign keys, in any table, that reference `parent`.
    pub fn get_foreign_keys_referencing(&self, parent: &TableRef) -> Result<Vec<ConstraintDef>, Error> {
        let mut out = Vec::new();
        for item in self.constraints.iter() {
            let (_, bytes) = item?;
            let set = TableConstraints::from_bytes(&bytes)?;
            out.extend(set.foreign_keys.into_iter().filter(|fk| {
                matches!(&fk.kind, ConstraintKind::ForeignKey { references, .. } if references.same_table(parent))
            }));
        }
        Ok(out)
    }

    /// Drop a constraint by name.
    ///
    /// A missing table or constraint is reported as `NotFound`. Dropping a
    /// constraint frees its name for reuse.
    pub fn drop_constraint(&self, table: &TableRef, name: &str) -> Result<ConstraintDef, Error> {
        let table_key = keys::table(table);

        let result = (&self.tables, &self.constraints).transaction(|(tables, constraint_sets)| {
            if tables.get(&table_key)?.is_none() {
                return abort(Error::NotFound(format!("Table {} does not exist", table)));
            }
            let mut existing = read::<TableConstraints>(constraint_sets, &table_key)?.unwrap_or_default();
            let Some(removed) = existing.remove(name) else {
                return abort(Error::NotFound(format!(
                    "The constraint: {} does not exist for the associated table: {}",
                    name, table
                )));
            };

            if existing.is_empty() {
                constraint_sets.remove(table_key.as_slice())?;
            } else {
                write(constraint_sets, &table_key, &existing)?;
            }
            Ok(removed)
        });

        let removed = finish(result)
            .inspect_err(|e| warn!(table = %table, constraint = %name, error = %e, "Rejected constraint drop"))?;
        info!(table = %table, constraint = %name, "Dropped constraint");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::tests::test_store;

    fn table_1() -> TableDef {
        TableDef::new("test_table_1")
            .with_column("col1", "int")
            .with_column("col2", "varchar(32)")
    }

    #[test]
    fn test_add_get_drop_readd() {
        let store = test_store();
        let t = store.create_table(table_1()).unwrap().table_ref();

        assert!(store.get_constraints(&t, ConstraintType::Unique).unwrap().is_empty());

        let input = ConstraintDef::unique(t.clone(), ["col1"]);
        store.add_constraints(vec![input.clone()]).unwrap();

        let fetched = store.get_constraints(&t, ConstraintType::Unique).unwrap();
        assert_eq!(fetched.len(), 1);
        let name = fetched[0].name().unwrap().to_string();
        assert_eq!(name, "test_table_1_uk");
        assert_eq!(input.with_name(name.clone()), fetched[0]);

        store.drop_constraint(&t, &name).unwrap();
        assert!(store.get_constraints(&t, ConstraintType::Unique).unwrap().is_empty());

        store
            .add_constraints(vec![ConstraintDef::unique(t.clone(), ["col1"])])
            .unwrap();
        assert_eq!(store.get_constraints(&t, ConstraintType::Unique).unwrap().len(), 1);
    }

    #[test]
    fn test_second_unnamed_unique_fails_atomically() {
        let store = test_store();
        let t = store.create_table(table_1()).unwrap().table_ref();
        store.add_constraints(vec![ConstraintDef::unique(t.clone(), ["col1"])]).unwrap();

        let result = store.add_constraints(vec![
            ConstraintDef::not_null(t.clone(), "col2"),
            ConstraintDef::unique(t.clone(), ["col2"]),
        ]);
        assert!(matches!(result, Err(Error::AlreadyExists(_))));

        // The not-null constraint from the rejected batch was not persisted.
        assert!(store.get_constraints(&t, ConstraintType::NotNull).unwrap().is_empty());
    }

    #[test]
    fn test_lenient_reads_strict_writes() {
        let store = test_store();
        for t in [
            TableRef::new("hive", "default", "missing"),
            TableRef::new("hive", "missing", "t"),
            TableRef::new("missing", "default", "t"),
        ] {
            assert!(store.get_constraints(&t, ConstraintType::Unique).unwrap().is_empty());
            assert!(matches!(
                store.add_constraints(vec![ConstraintDef::unique(t.clone(), ["col1"])]),
                Err(Error::InvalidSchemaObject(_))
            ));
        }
    }

    #[test]
    fn test_drop_missing_constraint() {
        let store = test_store();
        let t = store.create_table(table_1()).unwrap().table_ref();
        assert!(matches!(store.drop_constraint(&t, "nope"), Err(Error::NotFound(_))));
        let missing = TableRef::in_default_catalog("default", "missing");
        assert!(matches!(store.drop_constraint(&missing, "nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_foreign_keys_across_tables() {
        let store = test_store();
        let parent = TableDef::new("parent").with_column("id", "int");
        let p = parent.table_ref();
        store
            .create_table_with_constraints(
                parent,
                TableConstraints::from_list(vec![ConstraintDef::primary_key(p.clone(), ["id"])]),
            )
            .unwrap();
        let child = store.create_table(table_1()).unwrap().table_ref();

        store
            .add_constraints(vec![
                ConstraintDef::foreign_key(child.clone(), ["col1"], p.clone(), ["id"]).with_name("child_to_parent"),
            ])
            .unwrap();

        let referencing = store.get_foreign_keys_referencing(&p).unwrap();
        assert_eq!(referencing.len(), 1);
        assert_eq!(referencing[0].name(), Some("child_to_parent"));
        assert!(store.get_foreign_keys_referencing(&child).unwrap().is_empty());

        let grouped = store.get_table_constraints(&child).unwrap();
        assert_eq!(grouped.foreign_keys.len(), 1);
    }
}
