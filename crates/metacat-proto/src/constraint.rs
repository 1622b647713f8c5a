//! Relational constraint declarations.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::object::TableRef;

/// Constraint kind tag, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum ConstraintType {
    /// Primary key.
    PrimaryKey,
    /// Foreign key.
    ForeignKey,
    /// Unique key.
    Unique,
    /// Not-null column.
    NotNull,
    /// Column default value.
    Default,
    /// Check expression.
    Check,
}

impl ConstraintType {
    /// Every constraint type, in lookup order.
    pub const ALL: [ConstraintType; 6] = [
        ConstraintType::PrimaryKey,
        ConstraintType::ForeignKey,
        ConstraintType::Unique,
        ConstraintType::NotNull,
        ConstraintType::Default,
        ConstraintType::Check,
    ];

    /// Suffix appended to the table name for unnamed constraints.
    pub fn suffix(&self) -> &'static str {
        match self {
            ConstraintType::PrimaryKey => "pk",
            ConstraintType::ForeignKey => "fk",
            ConstraintType::Unique => "uk",
            ConstraintType::NotNull => "nn",
            ConstraintType::Default => "dc",
            ConstraintType::Check => "cc",
        }
    }
}

/// Action taken on the referencing rows when a referenced key changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum ReferentialAction {
    /// No action.
    NoAction,
    /// Reject the change.
    Restrict,
    /// Propagate the change.
    Cascade,
    /// Set referencing columns to NULL.
    SetNull,
    /// Set referencing columns to their default.
    SetDefault,
}

/// Kind-specific constraint payload.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum ConstraintKind {
    /// Primary key over the constraint columns.
    PrimaryKey,
    /// Unique key over the constraint columns.
    Unique,
    /// The single constraint column rejects NULL.
    NotNull,
    /// Default value for the single constraint column.
    Default {
        /// Default value as a literal.
        value: String,
    },
    /// Boolean check expression.
    Check {
        /// Expression text.
        expression: String,
    },
    /// Foreign key from the constraint columns to a parent key.
    ForeignKey {
        /// Parent table.
        references: TableRef,
        /// Parent columns, positionally matching the constraint columns.
        referenced_columns: Vec<String>,
        /// Action on parent update.
        on_update: ReferentialAction,
        /// Action on parent delete.
        on_delete: ReferentialAction,
    },
}

/// A constraint bound to one table.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct ConstraintDef {
    /// Constraint name. `None` asks the server to derive one.
    pub name: Option<String>,
    /// Owning table.
    pub table: TableRef,
    /// Referenced columns, in key order.
    pub columns: Vec<String>,
    /// Kind and kind-specific payload.
    pub kind: ConstraintKind,
    /// Constraint is enabled.
    pub enable: bool,
    /// Existing data was validated.
    pub validate: bool,
    /// Optimizer may rely on the constraint.
    pub rely: bool,
}

impl ConstraintDef {
    fn new(table: TableRef, columns: Vec<String>, kind: ConstraintKind) -> Self {
        Self {
            name: None,
            table,
            columns,
            kind,
            enable: true,
            validate: false,
            rely: false,
        }
    }

    /// Primary key over `columns`.
    pub fn primary_key(table: TableRef, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(table, columns.into_iter().map(Into::into).collect(), ConstraintKind::PrimaryKey)
    }

    /// Unique key over `columns`.
    pub fn unique(table: TableRef, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(table, columns.into_iter().map(Into::into).collect(), ConstraintKind::Unique)
    }

    /// Not-null on `column`.
    pub fn not_null(table: TableRef, column: impl Into<String>) -> Self {
        Self::new(table, vec![column.into()], ConstraintKind::NotNull)
    }

    /// Default `value` for `column`.
    pub fn default_value(table: TableRef, column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            table,
            vec![column.into()],
            ConstraintKind::Default {
                value: value.into(),
            },
        )
    }

    /// Check `expression`, optionally scoped to `columns`.
    pub fn check(
        table: TableRef,
        columns: impl IntoIterator<Item = impl Into<String>>,
        expression: impl Into<String>,
    ) -> Self {
        Self::new(
            table,
            columns.into_iter().map(Into::into).collect(),
            ConstraintKind::Check {
                expression: expression.into(),
            },
        )
    }

    /// Foreign key from `columns` to `referenced_columns` of `references`.
    pub fn foreign_key(
        table: TableRef,
        columns: impl IntoIterator<Item = impl Into<String>>,
        references: TableRef,
        referenced_columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::new(
            table,
            columns.into_iter().map(Into::into).collect(),
            ConstraintKind::ForeignKey {
                references,
                referenced_columns: referenced_columns.into_iter().map(Into::into).collect(),
                on_update: ReferentialAction::NoAction,
                on_delete: ReferentialAction::NoAction,
            },
        )
    }

    /// Set an explicit name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the enable/validate/rely flags.
    pub fn with_flags(mut self, enable: bool, validate: bool, rely: bool) -> Self {
        self.enable = enable;
        self.validate = validate;
        self.rely = rely;
        self
    }

    /// The kind tag.
    pub fn constraint_type(&self) -> ConstraintType {
        match self.kind {
            ConstraintKind::PrimaryKey => ConstraintType::PrimaryKey,
            ConstraintKind::Unique => ConstraintType::Unique,
            ConstraintKind::NotNull => ConstraintType::NotNull,
            ConstraintKind::Default { .. } => ConstraintType::Default,
            ConstraintKind::Check { .. } => ConstraintType::Check,
            ConstraintKind::ForeignKey { .. } => ConstraintType::ForeignKey,
        }
    }

    /// The name, if assigned.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Check whether this constraint keys rows (primary or unique key).
    pub fn is_key(&self) -> bool {
        matches!(self.kind, ConstraintKind::PrimaryKey | ConstraintKind::Unique)
    }
}

/// Constraints of one table, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct TableConstraints {
    /// Primary keys.
    pub primary_keys: Vec<ConstraintDef>,
    /// Foreign keys.
    pub foreign_keys: Vec<ConstraintDef>,
    /// Unique keys.
    pub unique: Vec<ConstraintDef>,
    /// Not-null constraints.
    pub not_null: Vec<ConstraintDef>,
    /// Default-value constraints.
    pub defaults: Vec<ConstraintDef>,
    /// Check constraints.
    pub checks: Vec<ConstraintDef>,
}

impl TableConstraints {
    /// Group a flat list by kind, preserving order within each kind.
    pub fn from_list(constraints: impl IntoIterator<Item = ConstraintDef>) -> Self {
        let mut grouped = Self::default();
        for c in constraints {
            grouped.push(c);
        }
        grouped
    }

    fn slot_mut(&mut self, constraint_type: ConstraintType) -> &mut Vec<ConstraintDef> {
        match constraint_type {
            ConstraintType::PrimaryKey => &mut self.primary_keys,
            ConstraintType::ForeignKey => &mut self.foreign_keys,
            ConstraintType::Unique => &mut self.unique,
            ConstraintType::NotNull => &mut self.not_null,
            ConstraintType::Default => &mut self.defaults,
            ConstraintType::Check => &mut self.checks,
        }
    }

    /// Append a constraint to its kind's list.
    pub fn push(&mut self, constraint: ConstraintDef) {
        self.slot_mut(constraint.constraint_type()).push(constraint);
    }

    /// Constraints of one kind.
    pub fn of_type(&self, constraint_type: ConstraintType) -> &[ConstraintDef] {
        match constraint_type {
            ConstraintType::PrimaryKey => &self.primary_keys,
            ConstraintType::ForeignKey => &self.foreign_keys,
            ConstraintType::Unique => &self.unique,
            ConstraintType::NotNull => &self.not_null,
            ConstraintType::Default => &self.defaults,
            ConstraintType::Check => &self.checks,
        }
    }

    /// Iterate over every constraint, kind by kind.
    pub fn iter(&self) -> impl Iterator<Item = &ConstraintDef> {
        ConstraintType::ALL.into_iter().flat_map(move |t| self.of_type(t).iter())
    }

    /// Find a constraint by name, case-insensitively.
    pub fn find(&self, name: &str) -> Option<&ConstraintDef> {
        self.iter()
            .find(|c| c.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }

    /// Remove a constraint by name, case-insensitively.
    pub fn remove(&mut self, name: &str) -> Option<ConstraintDef> {
        for t in ConstraintType::ALL {
            let slot = self.slot_mut(t);
            if let Some(pos) = slot
                .iter()
                .position(|c| c.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            {
                return Some(slot.remove(pos));
            }
        }
        None
    }

    /// Flatten in commit order: keys first so foreign keys can see them.
    pub fn into_list(self) -> Vec<ConstraintDef> {
        let mut all = self.primary_keys;
        all.extend(self.unique);
        all.extend(self.foreign_keys);
        all.extend(self.not_null);
        all.extend(self.defaults);
        all.extend(self.checks);
        all
    }

    /// Total number of constraints.
    pub fn len(&self) -> usize {
        self.primary_keys.len()
            + self.foreign_keys.len()
            + self.unique.len()
            + self.not_null.len()
            + self.defaults.len()
            + self.checks.len()
    }

    /// Check if there are no constraints.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableRef {
        TableRef::in_default_catalog("default", "test_table_1")
    }

    #[test]
    fn test_unique_defaults() {
        let uc = ConstraintDef::unique(table(), ["col1"]);
        assert_eq!(uc.constraint_type(), ConstraintType::Unique);
        assert!(uc.name().is_none());
        assert!(uc.enable && !uc.validate && !uc.rely);
        assert!(uc.is_key());
    }

    #[test]
    fn test_foreign_key_payload() {
        let parent = TableRef::in_default_catalog("default", "parent");
        let fk = ConstraintDef::foreign_key(table(), ["col1"], parent.clone(), ["id"]).with_name("fk1");

        assert_eq!(fk.constraint_type(), ConstraintType::ForeignKey);
        assert_eq!(fk.name(), Some("fk1"));
        if let ConstraintKind::ForeignKey {
            references,
            referenced_columns,
            ..
        } = &fk.kind
        {
            assert_eq!(references, &parent);
            assert_eq!(referenced_columns, &vec!["id".to_string()]);
        } else {
            panic!("Expected foreign key payload");
        }
    }

    #[test]
    fn test_grouping_keeps_keys_before_foreign_keys() {
        let parent = TableRef::in_default_catalog("default", "parent");
        let grouped = TableConstraints::from_list(vec![
            ConstraintDef::foreign_key(table(), ["col2"], parent, ["id"]),
            ConstraintDef::not_null(table(), "col1"),
            ConstraintDef::primary_key(table(), ["col1"]),
        ]);

        assert_eq!(grouped.len(), 3);
        let order: Vec<ConstraintType> = grouped.into_list().iter().map(|c| c.constraint_type()).collect();
        assert_eq!(
            order,
            vec![ConstraintType::PrimaryKey, ConstraintType::ForeignKey, ConstraintType::NotNull]
        );
    }

    #[test]
    fn test_find_and_remove_by_name() {
        let mut grouped = TableConstraints::from_list(vec![
            ConstraintDef::unique(table(), ["col1"]).with_name("test_table_1_uk"),
            ConstraintDef::not_null(table(), "col2").with_name("nn_col2"),
        ]);

        assert!(grouped.find("TEST_TABLE_1_UK").is_some());
        let removed = grouped.remove("nn_col2").unwrap();
        assert_eq!(removed.constraint_type(), ConstraintType::NotNull);
        assert!(grouped.remove("nn_col2").is_none());
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped.of_type(ConstraintType::Unique).len(), 1);
    }

    #[test]
    fn test_suffixes_are_distinct() {
        let mut suffixes: Vec<&str> = ConstraintType::ALL.iter().map(|t| t.suffix()).collect();
        suffixes.sort();
        suffixes.dedup();
        assert_eq!(suffixes.len(), ConstraintType::ALL.len());
    }
}
