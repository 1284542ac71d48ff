//! Embeddable MySQL replication slave: connects to a MySQL master, decodes
//! row-based binlog events, and delivers them to per-table callbacks.
//!
//! The crate owns the wire decoding (checksum validation, event parsing,
//! row materialization, DDL recognition, GTID/position tracking) and the
//! session state machine; it does not own a socket. Embedders supply a
//! [`transport::Transport`] implementation for their runtime's TCP/TLS stack.
//!
//! # Example
//!
//! ```no_run
//! use mysql_replication_slave::callback_router::EventKind;
//! use mysql_replication_slave::config::{Config, TableConfig};
//! use mysql_replication_slave::field::{Field, IntWidth};
//! use mysql_replication_slave::session::ReplicationSession;
//! use mysql_replication_slave::state::StateObserver;
//! use mysql_replication_slave::stats::StatsObserver;
//! use mysql_replication_slave::table::{Column, Table};
//! use std::sync::Arc;
//!
//! # fn build_transport() -> mysql_replication_slave::transport::mock::MockTransport {
//! #     mysql_replication_slave::transport::mock::MockTransport::new()
//! # }
//! let transport = build_transport();
//! let mut session = ReplicationSession::new(
//!     transport,
//!     Config::default(),
//!     1,
//!     "my-slave-host",
//!     Arc::new(StateObserver::new()),
//!     Arc::new(StatsObserver::new()),
//! );
//! let table = Table::new(
//!     "mydb",
//!     "accounts",
//!     vec![Column {
//!         name: "id".to_owned(),
//!         field: Field::Integer { width: IntWidth::Long, unsigned: false },
//!     }],
//! );
//! let table_config = TableConfig::new("mydb", "accounts", Box::new(|record_set| {
//!     println!("{:?}", record_set);
//! }))
//! .with_filter(EventKind::ALL);
//! session.register_table(table, table_config);
//! ```

pub mod bit_set;
pub mod bootstrap;
pub mod callback_router;
pub mod column_types;
pub mod config;
pub mod ddl;
pub mod decimal;
pub mod errors;
pub mod event;
pub mod field;
mod packet_helpers;
pub mod position;
pub mod schema_cache;
pub mod session;
pub mod state;
pub mod stats;
pub mod table;
pub mod table_key;
pub mod transport;
pub mod value;
