//! Grounded on `original_source/TableKey.h`/`.cpp`: a schema-qualified table
//! name, ordered by `(table_name, db_name)` rather than `(db_name,
//! table_name)`. The reversed order is deliberate upstream and preserved here.

use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub db_name: String,
    pub table_name: String,
}

impl TableKey {
    pub fn new(db_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        TableKey {
            db_name: db_name.into(),
            table_name: table_name.into(),
        }
    }
}

impl PartialOrd for TableKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.table_name, &self.db_name).cmp(&(&other.table_name, &other.db_name))
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db_name, self.table_name)
    }
}
