//! Embedder-supplied configuration: connection parameters plus the set of
//! tables to subscribe to. Grounded on spec §6's recognized-options table;
//! no file/env parsing is attempted (an explicit Non-goal) but the shapes
//! derive `serde::Serialize`/`Deserialize` the way the teacher's own public
//! types do, so an embedder can load them from whatever format it likes.

use serde::{Deserialize, Serialize};

use crate::callback_router::{EventKind, RowCallback, RowType};
use crate::table_key::TableKey;

/// Connection + replication-wide options (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mysql_host: String,
    pub mysql_port: u16,
    pub mysql_user: String,
    pub mysql_pass: String,
    /// Enables the `COM_BINLOG_DUMP_GTID` path (§4.5).
    pub mysql_slave_gtid_enabled: bool,
    /// Seconds between reconnect attempts while `Connecting` (§4.5/§5).
    pub connect_retry: u64,
    /// Seed for `generate_slave_id`; see `bootstrap::generate_slave_id`.
    pub server_id_seed: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mysql_host: "127.0.0.1".to_owned(),
            mysql_port: 3306,
            mysql_user: String::new(),
            mysql_pass: String::new(),
            mysql_slave_gtid_enabled: false,
            connect_retry: 5,
            server_id_seed: 1,
        }
    }
}

/// One table's subscription: which row-change kinds to deliver, in which
/// shape, through which callback, restricted to which columns.
pub struct TableConfig {
    pub key: TableKey,
    pub callback: RowCallback,
    pub column_filter: Vec<String>,
    pub row_type: RowType,
    pub filter: EventKind,
}

impl TableConfig {
    pub fn new(db: impl Into<String>, table: impl Into<String>, callback: RowCallback) -> Self {
        TableConfig {
            key: TableKey::new(db, table),
            callback,
            column_filter: Vec::new(),
            row_type: RowType::Map,
            filter: EventKind::ALL,
        }
    }

    pub fn with_column_filter(mut self, columns: Vec<String>) -> Self {
        self.column_filter = columns;
        self
    }

    pub fn with_row_type(mut self, row_type: RowType) -> Self {
        self.row_type = row_type;
        self
    }

    pub fn with_filter(mut self, filter: EventKind) -> Self {
        self.filter = filter;
        self
    }
}

/// Called after a DDL-driven schema rebuild, with the table's new field list
/// (spec §6: per-table `ddl_callback`).
pub type DdlCallback = Box<dyn Fn(&TableKey, &[crate::table::Column]) + Send>;

/// Called on XID (transaction commit), with the originating server id
/// (spec §6: global `xid_callback(server_id)`).
pub type XidCallback = Box<dyn Fn(u32) + Send>;
