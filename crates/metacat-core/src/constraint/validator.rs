//! Constraint batch validation.

use std::collections::{HashMap, HashSet};

use metacat_proto::{ConstraintDef, ConstraintKind, ConstraintType, TableConstraints, TableDef, TableRef};

use crate::error::Error;

use super::{derive_name, parent_key};

/// Definition and current keys of a table referenced by a foreign key.
#[derive(Debug, Clone)]
pub struct ParentTable {
    /// Parent definition.
    pub table: TableDef,
    /// Parent's persisted constraints.
    pub constraints: TableConstraints,
}

/// Validator for one batch of constraints against one table.
pub struct ConstraintValidator<'a> {
    table: &'a TableDef,
    existing: &'a TableConstraints,
    parents: &'a HashMap<String, ParentTable>,
}

impl<'a> ConstraintValidator<'a> {
    /// Create a validator.
    ///
    /// `parents` must hold every foreign-key parent other than `table`
    /// itself, keyed by [`parent_key`]; absent parents are rejected.
    pub fn new(
        table: &'a TableDef,
        existing: &'a TableConstraints,
        parents: &'a HashMap<String, ParentTable>,
    ) -> Self {
        Self {
            table,
            existing,
            parents,
        }
    }

    /// Validate a batch and assign names to unnamed constraints.
    ///
    /// Either the whole batch is returned, named and in input order, or the
    /// first violation is reported.
    pub fn prepare(&self, batch: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        let table_ref = self.table.table_ref();

        let mut taken: HashSet<String> = self
            .existing
            .iter()
            .filter_map(|c| c.name().map(str::to_lowercase))
            .collect();
        let mut has_primary_key = !self.existing.primary_keys.is_empty();

        // Keys declared in this batch may be referenced by self-referencing foreign keys.
        let batch_keys: Vec<&ConstraintDef> = batch.iter().filter(|c| c.is_key()).collect();

        let mut prepared = Vec::with_capacity(batch.len());
        for mut constraint in batch.iter().cloned() {
            if !constraint.table.same_table(&table_ref) {
                return Err(Error::InvalidSchemaObject(format!(
                    "Constraint targets {} but the batch is for {}",
                    constraint.table, table_ref
                )));
            }

            self.check_columns(&constraint)?;
            self.check_kind(&constraint, &batch_keys)?;

            if constraint.constraint_type() == ConstraintType::PrimaryKey {
                if has_primary_key {
                    return Err(Error::AlreadyExists(format!(
                        "Primary key already exists for: {}",
                        table_ref
                    )));
                }
                has_primary_key = true;
            }

            let name = match constraint.name() {
                Some(name) if !name.trim().is_empty() => name.to_string(),
                _ => derive_name(&self.table.name, constraint.constraint_type()),
            };
            if !taken.insert(name.to_lowercase()) {
                return Err(Error::AlreadyExists(format!(
                    "Constraint name already exists: {}",
                    name
                )));
            }
            constraint.name = Some(name);
            prepared.push(constraint);
        }

        Ok(prepared)
    }

    fn check_columns(&self, constraint: &ConstraintDef) -> Result<(), Error> {
        if constraint.columns.is_empty() && constraint.constraint_type() != ConstraintType::Check {
            return Err(Error::InvalidSchemaObject(format!(
                "{:?} constraint on {} has no columns",
                constraint.constraint_type(),
                self.table.table_ref()
            )));
        }

        for column in &constraint.columns {
            if !self.table.has_column(column) {
                return Err(Error::InvalidSchemaObject(format!(
                    "Column {} not found in table {}",
                    column,
                    self.table.table_ref()
                )));
            }
        }

        let distinct: HashSet<String> = constraint.columns.iter().map(|c| c.to_lowercase()).collect();
        if distinct.len() != constraint.columns.len() {
            return Err(Error::InvalidSchemaObject(format!(
                "Constraint on {} lists a column twice",
                self.table.table_ref()
            )));
        }

        Ok(())
    }

    fn check_kind(&self, constraint: &ConstraintDef, batch_keys: &[&ConstraintDef]) -> Result<(), Error> {
        match &constraint.kind {
            ConstraintKind::PrimaryKey | ConstraintKind::Unique => Ok(()),
            ConstraintKind::NotNull => single_column(constraint),
            ConstraintKind::Default { value } => {
                single_column(constraint)?;
                if value.is_empty() {
                    return Err(Error::InvalidSchemaObject(
                        "Default constraint value cannot be empty".to_string(),
                    ));
                }
                Ok(())
            }
            ConstraintKind::Check { expression } => {
                if expression.trim().is_empty() {
                    return Err(Error::InvalidSchemaObject(
                        "Check constraint expression cannot be empty".to_string(),
                    ));
                }
                Ok(())
            }
            ConstraintKind::ForeignKey {
                references,
                referenced_columns,
                ..
            } => self.check_foreign_key(constraint, references, referenced_columns, batch_keys),
        }
    }

    fn check_foreign_key(
        &self,
        constraint: &ConstraintDef,
        references: &TableRef,
        referenced_columns: &[String],
        batch_keys: &[&ConstraintDef],
    ) -> Result<(), Error> {
        if referenced_columns.len() != constraint.columns.len() {
            return Err(Error::InvalidSchemaObject(format!(
                "Foreign key has {} columns but references {}",
                constraint.columns.len(),
                referenced_columns.len()
            )));
        }

        let (parent, mut keys): (&TableDef, Vec<&ConstraintDef>) = if references.same_table(&self.table.table_ref()) {
            let mut keys: Vec<&ConstraintDef> = self
                .existing
                .primary_keys
                .iter()
                .chain(&self.existing.unique)
                .collect();
            keys.extend(batch_keys.iter().copied());
            (self.table, keys)
        } else {
            let parent = self.parents.get(&parent_key(references)).ok_or_else(|| {
                Error::InvalidSchemaObject(format!("Parent table not found: {}", references))
            })?;
            let keys = parent
                .constraints
                .primary_keys
                .iter()
                .chain(&parent.constraints.unique)
                .collect();
            (&parent.table, keys)
        };

        for column in referenced_columns {
            if !parent.has_column(column) {
                return Err(Error::InvalidSchemaObject(format!(
                    "Column {} not found in parent table {}",
                    column, references
                )));
            }
        }

        let wanted = lowered(referenced_columns);
        keys.retain(|k| lowered(&k.columns) == wanted);
        if keys.is_empty() {
            return Err(Error::InvalidSchemaObject(format!(
                "Foreign key references ({}) of {}, which is neither a primary key nor a unique key",
                referenced_columns.join(", "),
                references
            )));
        }

        Ok(())
    }
}

fn single_column(constraint: &ConstraintDef) -> Result<(), Error> {
    if constraint.columns.len() != 1 {
        return Err(Error::InvalidSchemaObject(format!(
            "{:?} constraint must name exactly one column",
            constraint.constraint_type()
        )));
    }
    Ok(())
}

fn lowered(columns: &[String]) -> HashSet<String> {
    columns.iter().map(|c| c.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_1() -> TableDef {
        TableDef::new("test_table_1")
            .with_column("col1", "int")
            .with_column("col2", "varchar(32)")
            .with_partition_key("ds", "string")
    }

    fn t1() -> TableRef {
        table_1().table_ref()
    }

    fn parent() -> ParentTable {
        let table = TableDef::new("parent")
            .with_column("id", "int")
            .with_column("code", "string");
        let pk = ConstraintDef::primary_key(table.table_ref(), ["id"]).with_name("parent_pk");
        ParentTable {
            constraints: TableConstraints::from_list(vec![pk]),
            table,
        }
    }

    fn prepare(existing: &TableConstraints, batch: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        let mut parents = HashMap::new();
        let p = parent();
        parents.insert(parent_key(&p.table.table_ref()), p);
        let table = table_1();
        ConstraintValidator::new(&table, existing, &parents).prepare(batch)
    }

    #[test]
    fn test_unnamed_constraint_gets_derived_name() {
        let out = prepare(&TableConstraints::default(), vec![ConstraintDef::unique(t1(), ["col1"])]).unwrap();
        assert_eq!(out[0].name(), Some("test_table_1_uk"));
        assert_eq!(out[0].columns, vec!["col1".to_string()]);
    }

    #[test]
    fn test_second_unnamed_same_kind_collides() {
        let existing = TableConstraints::from_list(
            prepare(&TableConstraints::default(), vec![ConstraintDef::unique(t1(), ["col1"])]).unwrap(),
        );
        let result = prepare(&existing, vec![ConstraintDef::unique(t1(), ["col2"])]);
        assert!(matches!(result, Err(Error::AlreadyExists(_))));

        // A different kind derives a different name.
        let ok = prepare(&existing, vec![ConstraintDef::not_null(t1(), "col2")]).unwrap();
        assert_eq!(ok[0].name(), Some("test_table_1_nn"));
    }

    #[test]
    fn test_collision_inside_one_batch() {
        let result = prepare(
            &TableConstraints::default(),
            vec![
                ConstraintDef::unique(t1(), ["col1"]).with_name("u"),
                ConstraintDef::unique(t1(), ["col2"]).with_name("U"),
            ],
        );
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_missing_column() {
        let result = prepare(&TableConstraints::default(), vec![ConstraintDef::unique(t1(), ["col9"])]);
        assert!(matches!(result, Err(Error::InvalidSchemaObject(_))));

        // Partition keys are valid constraint columns.
        assert!(prepare(&TableConstraints::default(), vec![ConstraintDef::not_null(t1(), "DS")]).is_ok());
    }

    #[test]
    fn test_single_primary_key() {
        let result = prepare(
            &TableConstraints::default(),
            vec![
                ConstraintDef::primary_key(t1(), ["col1"]).with_name("a"),
                ConstraintDef::primary_key(t1(), ["col2"]).with_name("b"),
            ],
        );
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_kind_shape_rules() {
        let empty = TableConstraints::default();
        let mut two_column_nn = ConstraintDef::not_null(t1(), "col1");
        two_column_nn.columns.push("col2".to_string());
        assert!(prepare(&empty, vec![two_column_nn]).is_err());
        assert!(prepare(&empty, vec![ConstraintDef::default_value(t1(), "col1", "")]).is_err());
        assert!(prepare(&empty, vec![ConstraintDef::check(t1(), Vec::<String>::new(), " ")]).is_err());
        assert!(prepare(&empty, vec![ConstraintDef::check(t1(), Vec::<String>::new(), "col1 > 0")]).is_ok());
    }

    #[test]
    fn test_foreign_key_to_parent_key() {
        let parent_ref = parent().table.table_ref();
        let empty = TableConstraints::default();

        let fk = ConstraintDef::foreign_key(t1(), ["col1"], parent_ref.clone(), ["id"]);
        assert_eq!(prepare(&empty, vec![fk]).unwrap()[0].name(), Some("test_table_1_fk"));

        let not_a_key = ConstraintDef::foreign_key(t1(), ["col2"], parent_ref.clone(), ["code"]);
        assert!(matches!(prepare(&empty, vec![not_a_key]), Err(Error::InvalidSchemaObject(_))));

        let missing_parent = ConstraintDef::foreign_key(t1(), ["col1"], TableRef::in_default_catalog("default", "nope"), ["id"]);
        assert!(matches!(prepare(&empty, vec![missing_parent]), Err(Error::InvalidSchemaObject(_))));

        let arity = ConstraintDef::foreign_key(t1(), ["col1", "col2"], parent_ref, ["id"]);
        assert!(matches!(prepare(&empty, vec![arity]), Err(Error::InvalidSchemaObject(_))));
    }

    #[test]
    fn test_self_reference_within_batch() {
        let batch = vec![
            ConstraintDef::foreign_key(t1(), ["col2"], t1(), ["col1"]),
            ConstraintDef::primary_key(t1(), ["col1"]),
        ];
        let out = prepare(&TableConstraints::default(), batch).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].name(), Some("test_table_1_pk"));
    }

    #[test]
    fn test_batch_must_target_one_table() {
        let other = TableRef::in_default_catalog("default", "other");
        let result = prepare(
            &TableConstraints::default(),
            vec![ConstraintDef::unique(t1(), ["col1"]), ConstraintDef::unique(other, ["col1"])],
        );
        assert!(matches!(result, Err(Error::InvalidSchemaObject(_))));
    }
}
