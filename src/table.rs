//! Grounded on `original_source/table.h`: an immutable (once built) named
//! column list plus an optional user column filter.

use crate::bit_set::BitSet;
use crate::callback_router::{EventKind, RowType};
use crate::column_types::ColumnType;
use crate::field::Field;

/// One named, typed column in master-side ordinal order.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub field: Field,
}

/// A replicated table's schema plus the user's column filter and dispatch
/// preferences. `column_filter_count == 0` means "emit all columns".
pub struct Table {
    pub db_name: String,
    pub table_name: String,
    pub full_name: String,
    pub columns: Vec<Column>,
    /// The exact per-column wire type + metadata (length, precision,
    /// pack_length, ...) last seen in a `TABLE_MAP_EVENT` for this table,
    /// in master ordinal order. Empty until the first `TABLE_MAP_EVENT`
    /// arrives; row decoding must use this, not a metadata-less type
    /// re-derived from `Column::field`, since the metadata (e.g. a
    /// `DATETIME(3)`'s pack_length, or a `VARCHAR`'s true max length) only
    /// ever comes from the wire.
    pub wire_columns: Vec<ColumnType>,
    column_filter: BitSet,
    /// master ordinal -> user-requested ordinal, valid only where
    /// `column_filter` has that bit set.
    column_filter_fields: Vec<usize>,
    column_filter_count: usize,
    /// Column names last passed to [`Table::set_column_filter`], kept so a
    /// DDL-driven rebuild ([`Table::replace_columns`]) can reapply the same
    /// filter by name against the new column ordinals.
    filter_names: Vec<String>,
    pub row_type: RowType,
    pub filter: EventKind,
}

impl Table {
    pub fn new(db_name: impl Into<String>, table_name: impl Into<String>, columns: Vec<Column>) -> Self {
        let db_name = db_name.into();
        let table_name = table_name.into();
        let full_name = format!("{}.{}", db_name, table_name);
        let n = columns.len();
        Table {
            db_name,
            table_name,
            full_name,
            columns,
            wire_columns: Vec::new(),
            column_filter: BitSet::new(n),
            column_filter_fields: vec![0; n],
            column_filter_count: 0,
            filter_names: Vec::new(),
            row_type: RowType::Map,
            filter: EventKind::ALL,
        }
    }

    /// Install a column filter by name. An empty list clears the filter
    /// (emit all columns), matching `Table::set_column_filter`.
    pub fn set_column_filter(&mut self, column_filter: &[String]) {
        self.filter_names = column_filter.to_vec();
        if column_filter.is_empty() {
            self.column_filter = BitSet::new(self.columns.len());
            self.column_filter_fields = vec![0; self.columns.len()];
            self.column_filter_count = 0;
            return;
        }

        self.column_filter = BitSet::new(self.columns.len());
        self.column_filter_fields = vec![0; self.columns.len()];
        self.column_filter_count = column_filter.len();

        for (requested_ordinal, field_name) in column_filter.iter().enumerate() {
            if let Some(master_ordinal) = self
                .columns
                .iter()
                .position(|c| &c.name == field_name)
            {
                self.column_filter.set(master_ordinal);
                self.column_filter_fields[master_ordinal] = requested_ordinal;
            }
        }
    }

    pub fn has_column_filter(&self) -> bool {
        self.column_filter_count != 0
    }

    pub fn should_include_column(&self, master_ordinal: usize) -> bool {
        !self.has_column_filter() || self.column_filter.is_set(master_ordinal)
    }

    /// Refresh temporal storage flags from a `TABLE_MAP_EVENT`'s wire column
    /// list, matched position-by-position (§4.4).
    pub fn refresh_from_table_map(&mut self, wire_columns: &[crate::column_types::ColumnType]) {
        for (column, wire) in self.columns.iter_mut().zip(wire_columns.iter()) {
            column.field.refresh_from_wire_type(wire);
        }
        self.wire_columns = wire_columns.to_vec();
    }

    /// Swap in a freshly re-described column list after a DDL rebuild
    /// (spec §4.4/§6 `ddl_callback`), reapplying the previous column filter
    /// by name against the new ordinals. `wire_columns` is cleared: a
    /// `SHOW FULL COLUMNS` redescribe carries no wire metadata, and the
    /// stale list would no longer line up with the new column ordinals. A
    /// fresh `TABLE_MAP_EVENT` always precedes the next rows event for a
    /// table whose schema just changed, so this is repopulated before it's
    /// needed again.
    pub fn replace_columns(&mut self, columns: Vec<Column>) {
        self.columns = columns;
        self.wire_columns = Vec::new();
        let filter_names = std::mem::take(&mut self.filter_names);
        self.set_column_filter(&filter_names);
    }
}
