//! Grounded on `original_source/relayloginfo.h` (`RelayLogInfo`): the
//! session's view of which tables it is replicating.

use std::collections::HashMap;

use crate::table::Table;
use crate::table_key::TableKey;

/// `id_to_key` is transient — table ids are only unique within one binlog
/// file, so it is cleared on every Rotate (§9's open question, resolved to
/// "clear"). `key_to_table` persists across rotates and is rebuilt only on
/// DDL affecting a tracked table.
#[derive(Default)]
pub struct SchemaCache {
    id_to_key: HashMap<u64, TableKey>,
    key_to_table: HashMap<TableKey, Table>,
}

impl SchemaCache {
    pub fn new() -> Self {
        SchemaCache::default()
    }

    pub fn set_table_name(&mut self, table_id: u64, db: &str, table: &str) {
        self.id_to_key
            .insert(table_id, TableKey::new(db, table));
    }

    pub fn set_table(&mut self, key: TableKey, table: Table) {
        self.key_to_table.insert(key, table);
    }

    pub fn get_key(&self, table_id: u64) -> Option<&TableKey> {
        self.id_to_key.get(&table_id)
    }

    pub fn get_table(&self, key: &TableKey) -> Option<&Table> {
        self.key_to_table.get(key)
    }

    pub fn get_table_mut(&mut self, key: &TableKey) -> Option<&mut Table> {
        self.key_to_table.get_mut(key)
    }

    pub fn is_tracked(&self, key: &TableKey) -> bool {
        self.key_to_table.contains_key(key)
    }

    /// Rekey a tracked table after an `ALTER TABLE ... RENAME`/`RENAME TABLE`
    /// (spec §4.4). A no-op (returns `false`) if `old` isn't tracked.
    pub fn rename_table(&mut self, old: &TableKey, new: TableKey) -> bool {
        match self.key_to_table.remove(old) {
            Some(table) => {
                self.key_to_table.insert(new, table);
                true
            }
            None => false,
        }
    }

    /// A Rotate event clears only the transient id mapping.
    pub fn handle_rotate(&mut self) {
        self.id_to_key.clear();
    }

    pub fn clear(&mut self) {
        self.id_to_key.clear();
        self.key_to_table.clear();
    }
}
