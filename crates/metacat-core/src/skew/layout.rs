//! Physical layout of one table or partition.

use metacat_proto::{ColumnPredicate, PartitionDef, Row, SkewedInfo, TableDef};

/// Where the rows of a table or partition live.
#[derive(Debug, Clone, PartialEq)]
pub struct DataLayout {
    base_location: String,
    skewed: Option<SkewedInfo>,
    epoch: u64,
}

impl DataLayout {
    /// Create a layout rooted at `base_location`.
    pub fn new(base_location: impl Into<String>, skewed: Option<SkewedInfo>) -> Self {
        Self {
            base_location: base_location.into(),
            skewed,
            epoch: 0,
        }
    }

    /// Stamp the layout with the epoch of its base location at read time.
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Layout of an unpartitioned table.
    pub fn for_table(table: &TableDef) -> Self {
        Self::new(table.location.clone().unwrap_or_default(), table.skewed.clone())
    }

    /// Layout of one partition.
    pub fn for_partition(partition: &PartitionDef) -> Self {
        Self::new(
            partition.location.clone().unwrap_or_default(),
            partition.skewed.clone(),
        )
    }

    /// Base location.
    pub fn base_location(&self) -> &str {
        &self.base_location
    }

    /// Epoch of the base location this layout was read at. Row writes routed
    /// with a layout whose epoch has since moved are refused.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Skewed layout, if declared.
    pub fn skewed(&self) -> Option<&SkewedInfo> {
        self.skewed.as_ref()
    }

    /// Check whether `column` is one of the skewed columns.
    pub fn is_skewed_column(&self, column: &str) -> bool {
        self.skewed
            .as_ref()
            .is_some_and(|s| s.columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }

    /// Every location that may hold rows.
    pub fn locations(&self) -> Vec<String> {
        match &self.skewed {
            Some(info) => super::all_locations(info),
            None => vec![self.base_location.clone()],
        }
    }

    /// Location for a tuple of skewed-column values.
    pub fn resolve(&self, values: &[String]) -> &str {
        match &self.skewed {
            Some(info) => super::resolve_location(info, values),
            None => &self.base_location,
        }
    }

    /// Location a row is stored in.
    pub fn route(&self, table: &TableDef, row: &Row) -> &str {
        let Some(info) = &self.skewed else {
            return &self.base_location;
        };

        let tuple: Option<Vec<String>> = info
            .columns
            .iter()
            .map(|c| {
                table
                    .column_index(c)
                    .and_then(|i| row.get(i))
                    .and_then(|v| v.to_literal())
            })
            .collect();

        match tuple {
            Some(values) => super::resolve_location(info, &values),
            None => &info.default_location,
        }
    }

    /// The single location to scan when `predicates` pin every skewed column,
    /// or `None` when every location must be scanned.
    pub fn prune(&self, predicates: &[ColumnPredicate]) -> Option<&str> {
        let info = self.skewed.as_ref()?;

        let tuple: Option<Vec<String>> = info
            .columns
            .iter()
            .map(|c| {
                predicates
                    .iter()
                    .find(|p| p.column.eq_ignore_ascii_case(c))
                    .and_then(|p| p.value.to_literal())
            })
            .collect();

        tuple.map(|values| super::resolve_location(info, &values))
    }
}
