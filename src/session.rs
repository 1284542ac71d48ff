//! The replication state machine: connect, handshake, register, request a
//! dump, and read events until told to stop. Grounded on
//! `original_source/Slave.cpp`'s `Slave::get_remote_binlog`/`process_event`
//! loop and spec §4.5/§5.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, error, trace, warn};

use crate::bootstrap;
use crate::callback_router::{CallbackRouter, RecordSet};
use crate::config::{Config, DdlCallback, TableConfig, XidCallback};
use crate::ddl::DdlEffect;
use crate::errors::{RegisterError, SlaveError, TransportError};
use crate::event::{ChecksumAlgorithm, EventDecoder, Outcome};
use crate::position::Position;
use crate::schema_cache::SchemaCache;
use crate::state::{ConnectionState, StateObserver};
use crate::stats::StatsObserver;
use crate::table::Table;
use crate::table_key::TableKey;
use crate::transport::{self, Transport};

const ER_NET_PACKET_TOO_LARGE: u32 = 1153;
const ER_MASTER_FATAL_ERROR_READING_BINLOG: u32 = 1236;
const ER_UNKNOWN_SYSTEM_VARIABLE: u32 = 1193;
const CR_SERVER_LOST: u32 = 2013;
const DUMP_PERIOD: Duration = Duration::from_secs(1);

fn is_transient(code: u32) -> bool {
    matches!(
        code,
        ER_NET_PACKET_TOO_LARGE | ER_MASTER_FATAL_ERROR_READING_BINLOG | CR_SERVER_LOST
    )
}

/// Accumulates heartbeat bursts into a single periodic summary instead of
/// tracing every `HEARTBEAT_LOG_EVENT` (spec §4.5).
#[derive(Default)]
struct HeartbeatLogger {
    skipping: bool,
    count: u64,
    total_size: u64,
    prev_dump: Option<Instant>,
}

impl HeartbeatLogger {
    fn on_heartbeat(&mut self, event_len: usize) {
        if !self.skipping {
            trace!("Skipping HEARTBEAT events...");
            self.skipping = true;
            self.prev_dump = Some(Instant::now());
        }
        self.count += 1;
        self.total_size += event_len as u64;
        if self.prev_dump.map(|t| t.elapsed() >= DUMP_PERIOD).unwrap_or(false) {
            self.flush();
        }
    }

    fn on_other_event(&mut self) {
        if self.skipping {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.count > 0 {
            debug!(
                "skipped {} HEARTBEAT events ({} bytes)",
                self.count, self.total_size
            );
        }
        self.skipping = false;
        self.count = 0;
        self.total_size = 0;
        self.prev_dump = None;
    }
}

/// Handle to the transport and stop flag a session exposes to other
/// threads: the only cross-thread surface the session has (spec §5).
pub struct SessionHandle<T: Transport> {
    transport: Arc<Mutex<T>>,
    stop: Arc<AtomicBool>,
}

impl<T: Transport> SessionHandle<T> {
    pub fn close_connection(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.transport.lock().unwrap().shutdown();
    }
}

impl<T: Transport> Clone for SessionHandle<T> {
    fn clone(&self) -> Self {
        SessionHandle {
            transport: self.transport.clone(),
            stop: self.stop.clone(),
        }
    }
}

pub struct ReplicationSession<T: Transport> {
    transport: Arc<Mutex<T>>,
    stop: Arc<AtomicBool>,
    config: Config,
    server_id: u32,
    hostname: String,
    decoder: EventDecoder,
    schema: SchemaCache,
    position: Position,
    default_db: String,
    router: CallbackRouter,
    table_configs: std::collections::HashMap<TableKey, TableConfig>,
    state: Arc<StateObserver>,
    stats: Arc<StatsObserver>,
    ddl_callback: Option<DdlCallback>,
    xid_callback: Option<XidCallback>,
    heartbeat: HeartbeatLogger,
}

impl<T: Transport> ReplicationSession<T> {
    pub fn new(
        transport: T,
        config: Config,
        server_id: u32,
        hostname: impl Into<String>,
        state: Arc<StateObserver>,
        stats: Arc<StatsObserver>,
    ) -> Self {
        ReplicationSession {
            transport: Arc::new(Mutex::new(transport)),
            stop: Arc::new(AtomicBool::new(false)),
            config,
            server_id,
            hostname: hostname.into(),
            decoder: EventDecoder::new(),
            schema: SchemaCache::new(),
            position: Position::new(),
            default_db: String::new(),
            router: CallbackRouter::new(),
            table_configs: std::collections::HashMap::new(),
            state,
            stats,
            ddl_callback: None,
            xid_callback: None,
            heartbeat: HeartbeatLogger::default(),
        }
    }

    pub fn handle(&self) -> SessionHandle<T> {
        SessionHandle {
            transport: self.transport.clone(),
            stop: self.stop.clone(),
        }
    }

    /// Subscribe a table: installs both the schema entry (so the session
    /// starts tracking its `TABLE_MAP_EVENT`s) and the callback dispatch
    /// route. Must be called before [`ReplicationSession::run`].
    pub fn register_table(&mut self, table: Table, mut table_config: TableConfig) {
        let key = table_config.key.clone();
        let mut table = table;
        table.row_type = table_config.row_type;
        table.filter = table_config.filter;
        if !table_config.column_filter.is_empty() {
            table.set_column_filter(&table_config.column_filter);
        }
        self.schema.set_table(key.clone(), table);
        let callback = std::mem::replace(&mut table_config.callback, Box::new(|_| {}));
        self.router.register(key.clone(), table_config.filter, callback);
        self.table_configs.insert(key, table_config);
    }

    pub fn set_ddl_callback(&mut self, callback: DdlCallback) {
        self.ddl_callback = Some(callback);
    }

    pub fn set_xid_callback(&mut self, callback: XidCallback) {
        self.xid_callback = Some(callback);
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run bootstrap checks, then loop: connect, handshake, register, dump,
    /// read; reconnecting on transient errors until told to stop.
    pub fn run(&mut self) -> Result<(), SlaveError> {
        {
            let mut transport = self.transport.lock().unwrap();
            transport.connect()?;
            bootstrap::check_master_version(&mut *transport)?;
            bootstrap::check_master_binlog_format(&mut *transport)?;
            bootstrap::check_gtid_modes(&mut *transport, self.config.mysql_slave_gtid_enabled)?;
        }

        while !self.should_stop() {
            self.state.set_connecting();
            if !self.connect_with_retry() {
                break;
            }
            if self.should_stop() {
                break;
            }
            match self.handshake_and_dump() {
                Ok(()) => {}
                Err(e @ RegisterError::Transport(_)) | Err(e @ RegisterError::Bootstrap(_)) => {
                    warn!("register/handshake failed: {}; reconnecting", e);
                    continue;
                }
                Err(e @ RegisterError::UnsupportedChecksum(_)) => {
                    return Err(SlaveError::Register(e));
                }
            }
            self.state.set_state(ConnectionState::Reading);
            match self.read_loop() {
                ReadLoopOutcome::Stopped => break,
                ReadLoopOutcome::Reconnect => {
                    self.state.set_state(ConnectionState::Reconnecting);
                    continue;
                }
            }
        }
        Ok(())
    }

    fn connect_with_retry(&mut self) -> bool {
        loop {
            if self.should_stop() {
                return false;
            }
            let result = self.transport.lock().unwrap().connect();
            match result {
                Ok(()) => {
                    self.state.set_connected();
                    return true;
                }
                Err(e) => {
                    warn!("connect failed: {}; retrying in {}s", e, self.config.connect_retry);
                    thread::sleep(Duration::from_secs(self.config.connect_retry));
                }
            }
        }
    }

    fn do_checksum_handshake(&mut self) -> Result<(), RegisterError> {
        let mut transport = self.transport.lock().unwrap();
        let algo = match transport.query("SET @master_binlog_checksum = @@global.binlog_checksum") {
            Ok(_) => {
                let rows = transport.query("SELECT @master_binlog_checksum")?;
                let value = rows.first()
                    .and_then(|r| r.first())
                    .and_then(|v| v.clone())
                    .unwrap_or_else(|| "NONE".to_owned());
                match value.as_str() {
                    "NONE" => ChecksumAlgorithm::None,
                    "CRC32" => ChecksumAlgorithm::Crc32,
                    other => return Err(RegisterError::UnsupportedChecksum(other.to_owned())),
                }
            }
            Err(TransportError::Mysql { code, .. }) if code == ER_UNKNOWN_SYSTEM_VARIABLE => {
                ChecksumAlgorithm::None
            }
            Err(e) => return Err(e.into()),
        };
        self.decoder.set_checksum_algorithm(algo);
        Ok(())
    }

    fn register(&mut self) -> Result<(), RegisterError> {
        let body = transport::encode_register_slave(self.server_id, &self.hostname);
        self.transport
            .lock()
            .unwrap()
            .command(transport::command::COM_REGISTER_SLAVE, &body)?;
        self.state.set_state(ConnectionState::Registered);
        Ok(())
    }

    fn acquire_position(&mut self) -> Result<(), RegisterError> {
        if self.position.log_name.is_empty() {
            let pos = bootstrap::get_last_binlog_pos(&mut *self.transport.lock().unwrap())?;
            self.position = pos;
        }
        self.state.set_master_position(self.position.clone());
        Ok(())
    }

    fn request_dump(&mut self) -> Result<(), RegisterError> {
        let mut transport = self.transport.lock().unwrap();
        if self.config.mysql_slave_gtid_enabled {
            let body = transport::encode_binlog_dump_gtid(self.server_id, &self.position);
            transport.command(transport::command::COM_BINLOG_DUMP_GTID, &body)?;
        } else {
            let body = transport::encode_binlog_dump(
                &self.position.log_name,
                self.position.log_pos as u32,
                self.server_id,
            );
            transport.command(transport::command::COM_BINLOG_DUMP, &body)?;
        }
        Ok(())
    }

    fn handshake_and_dump(&mut self) -> Result<(), RegisterError> {
        self.do_checksum_handshake()?;
        self.register()?;
        self.acquire_position()?;
        self.state.set_state(ConnectionState::Dumping);
        self.request_dump()?;
        Ok(())
    }

    fn read_loop(&mut self) -> ReadLoopOutcome {
        loop {
            if self.should_stop() {
                return ReadLoopOutcome::Stopped;
            }
            let packet = {
                let mut transport = self.transport.lock().unwrap();
                transport.read_packet()
            };
            let packet = match packet {
                Ok(p) => p,
                Err(TransportError::Mysql { code, message }) if is_transient(code) => {
                    error!("transport error {}: {}; reconnecting", code, message);
                    if code == CR_SERVER_LOST && self.should_stop() {
                        return ReadLoopOutcome::Stopped;
                    }
                    return ReadLoopOutcome::Reconnect;
                }
                Err(e) => {
                    warn!("transport read failed: {}; reconnecting", e);
                    return ReadLoopOutcome::Reconnect;
                }
            };
            if packet.is_empty() || packet[0] == 0xFE {
                return ReadLoopOutcome::Reconnect;
            }
            let body = &packet[1..];
            if let Err(e) = self.process_one_event(body) {
                error!("event processing error: {}; skipping event", e);
                self.stats.record_decode_error();
                thread::sleep(Duration::from_secs(1));
            }
        }
    }

    fn process_one_event(&mut self, body: &[u8]) -> Result<(), crate::errors::EventParseError> {
        use crate::event::TypeCode;
        use std::io::Cursor;

        // `body` is the packet payload after the OK marker: one full event
        // (19-byte header + type-specific body, with the checksum trailer
        // the EventDecoder will strip once it has read the header).
        let mut cursor = Cursor::new(body);
        let raw = self.decoder.read_event(&mut cursor)?;

        if matches!(raw.header.type_code, TypeCode::HeartbeatLogEvent) {
            self.heartbeat.on_heartbeat(body.len());
        } else {
            self.heartbeat.on_other_event();
        }

        let outcome = self.decoder.process(
            &raw.header,
            &raw.body,
            &mut self.schema,
            &mut self.position,
            &mut self.default_db,
        )?;
        let header = raw.header;

        if header.next_position != 0 {
            self.position.log_pos = header.next_position as u64;
        }
        self.state
            .set_last_event_time_pos(SystemTime::now(), self.position.log_pos);

        match outcome {
            Outcome::FormatDescription { .. } | Outcome::Ignored | Outcome::Heartbeat => {}
            Outcome::Rotate { .. } => {}
            Outcome::TableMap => self.stats.process_table_map(),
            Outcome::Ddl(effect) => self.handle_ddl(effect),
            Outcome::Rows { key, changes } => self.dispatch_rows(key, changes),
            Outcome::Xid { server_id } => {
                if let Some(cb) = &self.xid_callback {
                    cb(server_id);
                }
            }
            Outcome::Gtid => {}
        }
        Ok(())
    }

    fn handle_ddl(&mut self, effect: Option<DdlEffect>) {
        let effect = match effect {
            Some(e) => e,
            None => return,
        };
        match effect {
            DdlEffect::Rename(pairs) => {
                for (old, new) in pairs {
                    self.schema.rename_table(&old, new);
                }
            }
            DdlEffect::Rebuild(key) => {
                if !self.schema.is_tracked(&key) {
                    return;
                }
                let columns = {
                    let mut transport = self.transport.lock().unwrap();
                    bootstrap::describe_table(&mut *transport, &key.db_name, &key.table_name)
                };
                let columns = match columns {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("could not re-describe table {}: {}", key, e);
                        return;
                    }
                };
                if let Some(table) = self.schema.get_table_mut(&key) {
                    table.replace_columns(columns.clone());
                }
                if let Some(cb) = &self.ddl_callback {
                    cb(&key, &columns);
                }
            }
        }
    }

    fn dispatch_rows(&mut self, key: TableKey, changes: Vec<crate::event::RowChange>) {
        let (db_name, tbl_name, row_type) = match self.schema.get_table(&key) {
            Some(t) => (t.db_name.clone(), t.table_name.clone(), t.row_type),
            None => return,
        };
        for change in changes {
            let record = RecordSet {
                db_name: db_name.clone(),
                tbl_name: tbl_name.clone(),
                when: SystemTime::now(),
                type_event: change.type_event,
                row_type,
                row: change.after,
                old_row: change.before,
            };
            self.router.dispatch(&key, record, &self.stats);
        }
    }
}

enum ReadLoopOutcome {
    Stopped,
    Reconnect,
}
