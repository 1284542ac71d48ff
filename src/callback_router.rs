//! Per-table callback registry and dispatch. Grounded on
//! `original_source/table.h` (`should_process`, `call_callback`) and
//! `recordset.h` (`RecordSet`, `RowType`, `TypeEvent`).

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::SystemTime;

use bitflags::bitflags;
use log::error;

use crate::stats::StatsObserver;
use crate::table_key::TableKey;
use crate::value::MySQLValue;

bitflags! {
    /// Row-change kinds a table's callback is interested in. Combinable by
    /// bitwise OR; [`EventKind::ALL`] matches everything.
    pub struct EventKind: u8 {
        const INSERT = 0b001;
        const UPDATE = 0b010;
        const DELETE = 0b100;
        const ALL = Self::INSERT.bits | Self::UPDATE.bits | Self::DELETE.bits;
    }
}

/// `should_process(filter, kind) <=> (filter & kind) == kind`.
pub fn should_process(filter: EventKind, kind: EventKind) -> bool {
    (filter & kind) == kind
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowType {
    Map,
    Vector,
}

pub type NamedRow = Vec<(String, MySQLValue)>;

/// A decoded row in the shape the table's `RowType` asked for.
#[derive(Debug)]
pub enum Row {
    Map(HashMap<String, MySQLValue>),
    Vector(NamedRow),
}

impl Row {
    pub fn build(row_type: RowType, named: NamedRow) -> Self {
        match row_type {
            RowType::Map => Row::Map(named.into_iter().collect()),
            RowType::Vector => Row::Vector(named),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeEvent {
    Write,
    Update,
    Delete,
}

impl TypeEvent {
    fn as_kind(self) -> EventKind {
        match self {
            TypeEvent::Write => EventKind::INSERT,
            TypeEvent::Update => EventKind::UPDATE,
            TypeEvent::Delete => EventKind::DELETE,
        }
    }
}

/// A decoded row change handed to a user callback.
#[derive(Debug)]
pub struct RecordSet {
    pub db_name: String,
    pub tbl_name: String,
    pub when: SystemTime,
    pub type_event: TypeEvent,
    pub row_type: RowType,
    pub row: Option<Row>,
    pub old_row: Option<Row>,
}

pub type RowCallback = Box<dyn Fn(&RecordSet) + Send>;

struct Registration {
    callback: RowCallback,
    filter: EventKind,
}

/// Maps a [`TableKey`] to its registered callback + event filter, and
/// dispatches decoded [`RecordSet`]s through it, updating [`StatsObserver`]
/// as it goes.
#[derive(Default)]
pub struct CallbackRouter {
    registrations: HashMap<TableKey, Registration>,
}

impl CallbackRouter {
    pub fn new() -> Self {
        CallbackRouter {
            registrations: HashMap::new(),
        }
    }

    pub fn register(&mut self, key: TableKey, filter: EventKind, callback: RowCallback) {
        self.registrations
            .insert(key, Registration { callback, filter });
    }

    pub fn is_registered(&self, key: &TableKey) -> bool {
        self.registrations.contains_key(key)
    }

    /// Dispatch `record` to the table's callback if registered and its
    /// filter accepts `record.type_event`. Returns whether the callback ran
    /// and completed without panicking. A panicking callback is caught here
    /// (spec §4.6/§7): it's recorded as failed with its latency and the read
    /// loop continues rather than unwinding the session thread.
    pub fn dispatch(&self, key: &TableKey, record: RecordSet, stats: &StatsObserver) -> bool {
        let kind = record.type_event.as_kind();
        match self.registrations.get(key) {
            Some(reg) if should_process(reg.filter, kind) => {
                let start = SystemTime::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (reg.callback)(&record)));
                let elapsed = start.elapsed().unwrap_or_default();
                match outcome {
                    Ok(()) => {
                        stats.record_done(&record.tbl_name, kind, elapsed);
                        true
                    }
                    Err(payload) => {
                        let message = payload
                            .downcast_ref::<&str>()
                            .copied()
                            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                            .unwrap_or("<non-string panic payload>");
                        error!(
                            "callback for {} panicked: {}; recording as failed",
                            record.tbl_name, message
                        );
                        stats.record_failed(&record.tbl_name, elapsed);
                        false
                    }
                }
            }
            Some(_) => {
                stats.record_ignored(&record.tbl_name, kind);
                false
            }
            None => false,
        }
    }
}
