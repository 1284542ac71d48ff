//! End-to-end exercise of `ReplicationSession::run` against a scripted
//! `MockTransport`: a table registration followed by an insert, an update,
//! a delete, and a DDL statement that rebuilds the table's schema.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use mysql_replication_slave::callback_router::{EventKind, Row};
use mysql_replication_slave::config::{Config, TableConfig};
use mysql_replication_slave::field::{Field, IntWidth};
use mysql_replication_slave::session::ReplicationSession;
use mysql_replication_slave::state::StateObserver;
use mysql_replication_slave::stats::StatsObserver;
use mysql_replication_slave::table::{Column, Table};
use mysql_replication_slave::transport::mock::MockTransport;
use mysql_replication_slave::value::MySQLValue;

fn make_event(type_code: u8, next_position: u32, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(19 + body.len());
    buf.extend_from_slice(&0u32.to_le_bytes()); // timestamp
    buf.push(type_code);
    buf.extend_from_slice(&1u32.to_le_bytes()); // server_id
    let event_length = (19 + body.len()) as u32;
    buf.extend_from_slice(&event_length.to_le_bytes());
    buf.extend_from_slice(&next_position.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // flags
    buf.extend_from_slice(body);
    buf
}

fn make_packet(event_bytes: Vec<u8>) -> Vec<u8> {
    let mut p = vec![0x00];
    p.extend(event_bytes);
    p
}

fn fde_body() -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&4u16.to_le_bytes()); // binlog_version
    let mut version = [0u8; 50];
    let v = b"5.7.26-log";
    version[..v.len()].copy_from_slice(v);
    b.extend_from_slice(&version);
    b.extend_from_slice(&0u32.to_le_bytes()); // create_timestamp
    b.push(19); // common_header_len
    // event_sizes_table is empty
    b.push(0); // checksum_algo = NONE
    b
}

fn table_map_body(table_id: u64, schema: &str, table: &str, column_types: &[u8]) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&table_id.to_le_bytes()[0..6]);
    b.extend_from_slice(&[0, 0]); // reserved
    b.push(schema.len() as u8);
    b.extend_from_slice(schema.as_bytes());
    b.push(0); // null terminator
    b.push(table.len() as u8);
    b.extend_from_slice(table.as_bytes());
    b.push(0); // null terminator
    b.push(column_types.len() as u8); // column_count, fits in one byte
    b.extend_from_slice(column_types);
    b.push(0); // metadata_length: none of our columns carry metadata
    b
}

fn presence_bitmask(num_columns: usize) -> u8 {
    ((1u16 << num_columns) - 1) as u8
}

fn write_rows_body(table_id: u64, num_columns: usize, row: &[i32]) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&table_id.to_le_bytes()[0..6]);
    b.extend_from_slice(&[0, 0]); // reserved
    b.extend_from_slice(&2u16.to_le_bytes()); // extra_data_length, no extra data
    b.push(num_columns as u8);
    b.push(presence_bitmask(num_columns));
    b.push(0u8); // null bitmask, no nulls
    for v in row {
        b.extend_from_slice(&v.to_le_bytes());
    }
    b
}

fn update_rows_body(table_id: u64, num_columns: usize, before: &[i32], after: &[i32]) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&table_id.to_le_bytes()[0..6]);
    b.extend_from_slice(&[0, 0]);
    b.extend_from_slice(&2u16.to_le_bytes());
    b.push(num_columns as u8);
    b.push(presence_bitmask(num_columns)); // before bitmask
    b.push(presence_bitmask(num_columns)); // after bitmask
    b.push(0u8);
    for v in before {
        b.extend_from_slice(&v.to_le_bytes());
    }
    b.push(0u8);
    for v in after {
        b.extend_from_slice(&v.to_le_bytes());
    }
    b
}

fn query_event_body(schema: &str, statement: &str) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&1u32.to_le_bytes()); // thread_id
    b.extend_from_slice(&0u32.to_le_bytes()); // exec_time
    b.push(schema.len() as u8);
    b.extend_from_slice(&0i16.to_le_bytes()); // error_code
    b.extend_from_slice(&0u16.to_le_bytes()); // status_vars, empty
    b.extend_from_slice(schema.as_bytes());
    b.push(0); // separator
    b.extend_from_slice(statement.as_bytes());
    b
}

const TABLE_ID: u64 = 1001;
const LONG: u8 = 3; // ColumnType::Long wire byte

fn sample_table() -> Table {
    Table::new(
        "db",
        "t",
        vec![
            Column {
                name: "id".to_owned(),
                field: Field::Integer { width: IntWidth::Long, unsigned: false },
            },
            Column {
                name: "amount".to_owned(),
                field: Field::Integer { width: IntWidth::Long, unsigned: false },
            },
        ],
    )
}

fn scripted_transport() -> MockTransport {
    let mut t = MockTransport::new()
        .with_query("SELECT VERSION()", vec![vec![Some("5.7.26-log".to_owned())]])
        .with_query(
            "SHOW GLOBAL VARIABLES LIKE 'binlog_format'",
            vec![vec![Some("binlog_format".to_owned()), Some("ROW".to_owned())]],
        )
        .with_query("SET @master_binlog_checksum = @@global.binlog_checksum", vec![])
        .with_query(
            "SELECT @master_binlog_checksum",
            vec![vec![Some("NONE".to_owned())]],
        )
        .with_query(
            "SHOW MASTER STATUS",
            vec![vec![
                Some("mysql-bin.000001".to_owned()),
                Some("4".to_owned()),
                None,
                None,
                Some(String::new()),
            ]],
        )
        .with_query(
            "SHOW FULL COLUMNS FROM `t` IN `db`",
            vec![
                vec![Some("id".to_owned()), Some("int(11)".to_owned())],
                vec![Some("amount".to_owned()), Some("int(11)".to_owned())],
                vec![Some("foo".to_owned()), Some("int(11)".to_owned())],
            ],
        );

    let table_map = table_map_body(TABLE_ID, "db", "t", &[LONG, LONG]);

    t.push_packet(make_packet(make_event(15, 0, &fde_body())));
    t.push_packet(make_packet(make_event(19, 0, &table_map)));
    t.push_packet(make_packet(make_event(
        30,
        0,
        &write_rows_body(TABLE_ID, 2, &[42, 100]),
    )));
    t.push_packet(make_packet(make_event(16, 0, &[])));
    t.push_packet(make_packet(make_event(19, 0, &table_map)));
    t.push_packet(make_packet(make_event(
        31,
        0,
        &update_rows_body(TABLE_ID, 2, &[42, 100], &[42, 200]),
    )));
    t.push_packet(make_packet(make_event(16, 0, &[])));
    t.push_packet(make_packet(make_event(19, 0, &table_map)));
    t.push_packet(make_packet(make_event(
        32,
        0,
        &write_rows_body(TABLE_ID, 2, &[42, 200]),
    )));
    t.push_packet(make_packet(make_event(16, 0, &[])));
    t.push_packet(make_packet(make_event(
        2,
        0,
        &query_event_body("db", "ALTER TABLE t ADD COLUMN foo INT"),
    )));
    t
}

fn row_i64(row: &Row, column: &str) -> Option<i64> {
    match row {
        Row::Map(map) => match map.get(column) {
            Some(MySQLValue::SignedInteger(v)) => Some(*v),
            _ => None,
        },
        Row::Vector(named) => named.iter().find_map(|(name, value)| {
            if name == column {
                match value {
                    MySQLValue::SignedInteger(v) => Some(*v),
                    _ => None,
                }
            } else {
                None
            }
        }),
    }
}

#[test]
fn full_session_replicates_rows_and_rebuilds_on_ddl() {
    let transport = scripted_transport();
    let mut session = ReplicationSession::new(
        transport,
        Config::default(),
        42,
        "test-slave",
        Arc::new(StateObserver::new()),
        Arc::new(StatsObserver::new()),
    );

    type Cols = (i64, i64);
    let inserts: Arc<Mutex<Vec<Cols>>> = Arc::new(Mutex::new(Vec::new()));
    let updates: Arc<Mutex<Vec<(Cols, Cols)>>> = Arc::new(Mutex::new(Vec::new()));
    let deletes: Arc<Mutex<Vec<Cols>>> = Arc::new(Mutex::new(Vec::new()));

    let (inserts2, updates2, deletes2) = (inserts.clone(), updates.clone(), deletes.clone());
    let table_config = TableConfig::new(
        "db",
        "t",
        Box::new(move |rs| {
            use mysql_replication_slave::callback_router::TypeEvent;
            match rs.type_event {
                TypeEvent::Write => {
                    let row = rs.row.as_ref().unwrap();
                    inserts2
                        .lock()
                        .unwrap()
                        .push((row_i64(row, "id").unwrap(), row_i64(row, "amount").unwrap()));
                }
                TypeEvent::Update => {
                    let before = rs.old_row.as_ref().unwrap();
                    let after = rs.row.as_ref().unwrap();
                    updates2.lock().unwrap().push((
                        (row_i64(before, "id").unwrap(), row_i64(before, "amount").unwrap()),
                        (row_i64(after, "id").unwrap(), row_i64(after, "amount").unwrap()),
                    ));
                }
                TypeEvent::Delete => {
                    let row = rs.old_row.as_ref().unwrap();
                    deletes2
                        .lock()
                        .unwrap()
                        .push((row_i64(row, "id").unwrap(), row_i64(row, "amount").unwrap()));
                }
            }
        }),
    )
    .with_filter(EventKind::ALL);
    session.register_table(sample_table(), table_config);

    let xid_count = Arc::new(AtomicUsize::new(0));
    let xid_count2 = xid_count.clone();
    session.set_xid_callback(Box::new(move |_server_id| {
        xid_count2.fetch_add(1, Ordering::SeqCst);
    }));

    let ddl_columns: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let ddl_columns2 = ddl_columns.clone();
    session.set_ddl_callback(Box::new(move |_key, columns| {
        *ddl_columns2.lock().unwrap() = columns.iter().map(|c| c.name.clone()).collect();
    }));

    let handle = session.handle();
    let join_handle = thread::spawn(move || session.run());

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if !ddl_columns.lock().unwrap().is_empty() {
            break;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for DDL rebuild callback");
        }
        thread::sleep(Duration::from_millis(10));
    }

    handle.close_connection();
    let result = join_handle.join().expect("session thread panicked");
    assert!(result.is_ok());

    assert_eq!(*inserts.lock().unwrap(), vec![(42, 100)]);
    assert_eq!(*updates.lock().unwrap(), vec![((42, 100), (42, 200))]);
    assert_eq!(*deletes.lock().unwrap(), vec![(42, 200)]);
    assert_eq!(xid_count.load(Ordering::SeqCst), 3);
    assert_eq!(
        *ddl_columns.lock().unwrap(),
        vec!["id".to_owned(), "amount".to_owned(), "foo".to_owned()]
    );
}
