//! Wire decoding of binlog events. Header/type-code skeleton and rows-event
//! walking are grounded on the teacher's `event.rs`; checksum handling,
//! schema-cache interaction, DDL recognition, and GTID/XID position
//! plumbing are grounded on `original_source/Slave.cpp`'s `process_event`.

use std::io::{self, Cursor, ErrorKind, Read, Seek};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use uuid::Uuid;

use crate::bit_set::BitSet;
use crate::callback_router::{Row, TypeEvent};
use crate::column_types::ColumnType;
use crate::ddl::{self, DdlEffect};
use crate::errors::EventParseError;
use crate::packet_helpers::*;
use crate::position::Position;
use crate::schema_cache::SchemaCache;
use crate::table_key::TableKey;
use crate::value::MySQLValue;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TypeCode {
    Unknown,
    StartEventV3,
    QueryEvent,
    StopEvent,
    RotateEvent,
    IntvarEvent,
    LoadEvent,
    SlaveEvent,
    CreateFileEvent,
    AppendBlockEvent,
    ExecLoadEvent,
    DeleteFileEvent,
    NewLoadEvent,
    RandEvent,
    UserVarEvent,
    FormatDescriptionEvent,
    XidEvent,
    BeginLoadQueryEvent,
    ExecuteLoadQueryEvent,
    TableMapEvent,
    PreGaWriteRowsEvent,
    PreGaUpdateRowsEvent,
    PreGaDeleteRowsEvent,
    WriteRowsEventV1,
    UpdateRowsEventV1,
    DeleteRowsEventV1,
    IncidentEvent,
    HeartbeatLogEvent,
    IgnorableLogEvent,
    RowsQueryLogEvent,
    WriteRowsEventV2,
    UpdateRowsEventV2,
    DeleteRowsEventV2,
    GtidLogEvent,
    AnonymousGtidLogEvent,
    PreviousGtidsLogEvent,
    OtherUnknown(u8),
}

impl TypeCode {
    pub(crate) fn from_byte(b: u8) -> Self {
        match b {
            0 => TypeCode::Unknown,
            1 => TypeCode::StartEventV3,
            2 => TypeCode::QueryEvent,
            3 => TypeCode::StopEvent,
            4 => TypeCode::RotateEvent,
            5 => TypeCode::IntvarEvent,
            6 => TypeCode::LoadEvent,
            7 => TypeCode::SlaveEvent,
            8 => TypeCode::CreateFileEvent,
            9 => TypeCode::AppendBlockEvent,
            10 => TypeCode::ExecLoadEvent,
            11 => TypeCode::DeleteFileEvent,
            12 => TypeCode::NewLoadEvent,
            13 => TypeCode::RandEvent,
            14 => TypeCode::UserVarEvent,
            15 => TypeCode::FormatDescriptionEvent,
            16 => TypeCode::XidEvent,
            17 => TypeCode::BeginLoadQueryEvent,
            18 => TypeCode::ExecuteLoadQueryEvent,
            19 => TypeCode::TableMapEvent,
            20 => TypeCode::PreGaWriteRowsEvent,
            21 => TypeCode::PreGaUpdateRowsEvent,
            22 => TypeCode::PreGaDeleteRowsEvent,
            23 => TypeCode::WriteRowsEventV1,
            24 => TypeCode::UpdateRowsEventV1,
            25 => TypeCode::DeleteRowsEventV1,
            26 => TypeCode::IncidentEvent,
            27 => TypeCode::HeartbeatLogEvent,
            28 => TypeCode::IgnorableLogEvent,
            29 => TypeCode::RowsQueryLogEvent,
            30 => TypeCode::WriteRowsEventV2,
            31 => TypeCode::UpdateRowsEventV2,
            32 => TypeCode::DeleteRowsEventV2,
            33 => TypeCode::GtidLogEvent,
            34 => TypeCode::AnonymousGtidLogEvent,
            35 => TypeCode::PreviousGtidsLogEvent,
            i => TypeCode::OtherUnknown(i),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    None,
    Crc32,
    Other(u8),
}

impl From<u8> for ChecksumAlgorithm {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => ChecksumAlgorithm::None,
            0x01 => ChecksumAlgorithm::Crc32,
            other => ChecksumAlgorithm::Other(other),
        }
    }
}

pub type RowData = Vec<Option<MySQLValue>>;

/// The common 19-byte binlog event header.
#[derive(Debug, Clone, Copy)]
pub struct EventHeader {
    pub timestamp: u32,
    pub type_code: TypeCode,
    pub server_id: u32,
    pub event_length: u32,
    pub next_position: u32,
    pub flags: u16,
}

/// A header plus its (checksum-validated, checksum-stripped) body.
pub struct RawEvent {
    pub header: EventHeader,
    pub body: Vec<u8>,
}

/// What processing one event produced, for the session loop to act on.
pub enum Outcome {
    FormatDescription {
        server_version: String,
        checksum_algorithm: ChecksumAlgorithm,
    },
    Rotate {
        log_name: String,
        log_pos: u64,
    },
    Ddl(Option<DdlEffect>),
    TableMap,
    Rows {
        key: TableKey,
        changes: Vec<RowChange>,
    },
    Xid {
        server_id: u32,
    },
    Gtid,
    Heartbeat,
    /// recognized but carries nothing the session needs to act on.
    Ignored,
}

pub struct RowChange {
    pub type_event: TypeEvent,
    pub before: Option<Row>,
    pub after: Option<Row>,
}

/// Stateful event reader/decoder: tracks the checksum algorithm announced
/// by the format-description event and the pending `gtid_next` a GTID event
/// stages ahead of the transaction it belongs to.
pub struct EventDecoder {
    checksum_algorithm: ChecksumAlgorithm,
    pending_gtid: Option<(String, u64)>,
}

impl Default for EventDecoder {
    fn default() -> Self {
        EventDecoder {
            checksum_algorithm: ChecksumAlgorithm::None,
            pending_gtid: None,
        }
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one event's header and body off `reader`, stripping and
    /// validating the CRC32 trailer if the announced checksum algorithm
    /// calls for one.
    pub fn read_event<R: Read>(&self, reader: &mut R) -> Result<RawEvent, EventParseError> {
        let mut header_buf = [0u8; 19];
        match reader.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => return Err(EventParseError::Eof),
            Err(e) => return Err(e.into()),
        }
        let mut c = Cursor::new(header_buf);
        let timestamp = c.read_u32::<LittleEndian>()?;
        let type_code = TypeCode::from_byte(c.read_u8()?);
        let server_id = c.read_u32::<LittleEndian>()?;
        let event_length = c.read_u32::<LittleEndian>()?;
        let next_position = c.read_u32::<LittleEndian>()?;
        let flags = c.read_u16::<LittleEndian>()?;

        let mut body_len = (event_length - 19) as usize;
        // The master applies one checksum algorithm to every event in the
        // stream, negotiated once at registration time (`SET
        // @master_binlog_checksum=...`); the FDE's own embedded algorithm
        // byte only confirms what was already agreed, so it never needs
        // separate chicken-and-egg handling here.
        let has_checksum = self.checksum_algorithm == ChecksumAlgorithm::Crc32;
        let mut body = vec![0u8; body_len];
        reader.read_exact(&mut body)?;

        if has_checksum {
            if body.len() < 4 {
                return Err(EventParseError::Eof);
            }
            body_len -= 4;
            let expected = LittleEndian::read_u32(&body[body_len..]);
            let computed = {
                let mut full = header_buf.to_vec();
                full.extend_from_slice(&body[..body_len]);
                crc32fast::hash(&full)
            };
            if expected != computed {
                return Err(EventParseError::ChecksumMismatch { expected, computed });
            }
            body.truncate(body_len);
        }

        Ok(RawEvent {
            header: EventHeader {
                timestamp,
                type_code,
                server_id,
                event_length,
                next_position,
                flags,
            },
            body,
        })
    }

    /// Set the checksum algorithm negotiated at registration time
    /// (`SET @master_binlog_checksum=...`); every event read afterwards,
    /// including the FDE itself, is assumed to carry (or not carry) a
    /// trailer accordingly.
    pub fn set_checksum_algorithm(&mut self, algo: ChecksumAlgorithm) {
        self.checksum_algorithm = algo;
    }

    pub fn checksum_algorithm(&self) -> ChecksumAlgorithm {
        self.checksum_algorithm
    }

    /// Decode one event's body, mutating `schema`/`position` as needed, and
    /// return what the session loop should do with it. `default_db` is the
    /// schema the most recent `QUERY_EVENT` executed against (used to
    /// resolve unqualified DDL table names).
    pub fn process(
        &mut self,
        header: &EventHeader,
        body: &[u8],
        schema: &mut SchemaCache,
        position: &mut Position,
        default_db: &mut String,
    ) -> Result<Outcome, EventParseError> {
        let mut cursor = Cursor::new(body);
        match header.type_code {
            TypeCode::FormatDescriptionEvent => {
                let binlog_version = cursor.read_u16::<LittleEndian>()?;
                let mut server_version_buf = [0u8; 50];
                cursor.read_exact(&mut server_version_buf)?;
                let server_version = server_version_buf
                    .split(|c| *c == 0x00)
                    .next()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                let _create_timestamp = cursor.read_u32::<LittleEndian>()?;
                let _common_header_len = cursor.read_u8()?;
                let consumed = 2 + 50 + 4 + 1;
                if body.len() < consumed + 1 {
                    return Err(EventParseError::Eof);
                }
                let event_types = body.len() - consumed - 1;
                let mut event_sizes_tables = vec![0u8; event_types];
                cursor.read_exact(&mut event_sizes_tables)?;
                let checksum_algo = ChecksumAlgorithm::from(cursor.read_u8()?);
                let _ = binlog_version;
                Ok(Outcome::FormatDescription {
                    server_version,
                    checksum_algorithm: checksum_algo,
                })
            }
            TypeCode::RotateEvent => {
                let new_pos = cursor.read_u64::<LittleEndian>()?;
                let mut name = String::new();
                cursor.read_to_string(&mut name)?;
                position.log_name = name.clone();
                position.log_pos = new_pos;
                schema.handle_rotate();
                Ok(Outcome::Rotate {
                    log_name: name,
                    log_pos: new_pos,
                })
            }
            TypeCode::QueryEvent => {
                let _thread_id = cursor.read_u32::<LittleEndian>()?;
                let _exec_time = cursor.read_u32::<LittleEndian>()?;
                let schema_len = cursor.read_u8()?;
                let _error_code = cursor.read_i16::<LittleEndian>()?;
                let _status_vars = read_two_byte_length_prefixed_bytes(&mut cursor)?;
                let schema_name =
                    String::from_utf8_lossy(&read_nbytes(&mut cursor, schema_len)?).into_owned();
                cursor.seek(io::SeekFrom::Current(1))?;
                let mut statement = String::new();
                cursor.read_to_string(&mut statement)?;
                *default_db = schema_name.clone();
                let effect = ddl::classify(&statement, &schema_name);
                Ok(Outcome::Ddl(effect))
            }
            TypeCode::TableMapEvent => {
                let mut table_id_buf = [0u8; 8];
                cursor.read_exact(&mut table_id_buf[0..6])?;
                let table_id = LittleEndian::read_u64(&table_id_buf);
                cursor.seek(io::SeekFrom::Current(2))?;
                let schema_name = read_one_byte_length_prefixed_string(&mut cursor)?;
                cursor.seek(io::SeekFrom::Current(1))?;
                let table_name = read_one_byte_length_prefixed_string(&mut cursor)?;
                cursor.seek(io::SeekFrom::Current(1))?;

                let key = TableKey::new(&schema_name, &table_name);
                if !schema.is_tracked(&key) {
                    return Ok(Outcome::Ignored);
                }
                schema.set_table_name(table_id, &schema_name, &table_name);

                let column_count = read_variable_length_integer(&mut cursor)? as usize;
                let mut columns = Vec::with_capacity(column_count);
                for _ in 0..column_count {
                    columns.push(ColumnType::from_byte(cursor.read_u8()?));
                }
                let _metadata_length = read_variable_length_integer(&mut cursor)? as usize;
                let final_columns: Vec<ColumnType> = columns
                    .into_iter()
                    .map(|c| c.read_metadata(&mut cursor))
                    .collect::<Result<Vec<_>, _>>()?;

                if let Some(table) = schema.get_table_mut(&key) {
                    table.refresh_from_table_map(&final_columns);
                }
                Ok(Outcome::TableMap)
            }
            TypeCode::WriteRowsEventV1
            | TypeCode::WriteRowsEventV2
            | TypeCode::UpdateRowsEventV1
            | TypeCode::UpdateRowsEventV2
            | TypeCode::DeleteRowsEventV1
            | TypeCode::DeleteRowsEventV2 => {
                let type_code = header.type_code;
                let mut table_id_buf = [0u8; 8];
                cursor.read_exact(&mut table_id_buf[0..6])?;
                let table_id = LittleEndian::read_u64(&table_id_buf);
                cursor.seek(io::SeekFrom::Current(2))?;
                if matches!(
                    type_code,
                    TypeCode::WriteRowsEventV2 | TypeCode::UpdateRowsEventV2 | TypeCode::DeleteRowsEventV2
                ) {
                    // extra_data_length counts itself; skip the remaining
                    // extra-data bytes after it.
                    let extra_len = cursor.read_u16::<LittleEndian>()?;
                    cursor.seek(io::SeekFrom::Current((extra_len as i64) - 2))?;
                }
                let num_columns = read_variable_length_integer(&mut cursor)? as usize;
                let bitmask_size = (num_columns + 7) >> 3;
                let before_bitmask =
                    BitSet::from_slice(num_columns, &read_nbytes(&mut cursor, bitmask_size)?)
                        .map_err(|_| EventParseError::Eof)?;
                let after_bitmask = match type_code {
                    TypeCode::UpdateRowsEventV1 | TypeCode::UpdateRowsEventV2 => Some(
                        BitSet::from_slice(num_columns, &read_nbytes(&mut cursor, bitmask_size)?)
                            .map_err(|_| EventParseError::Eof)?,
                    ),
                    _ => None,
                };

                let key = match schema.get_key(table_id) {
                    Some(k) => k.clone(),
                    None => return Ok(Outcome::Ignored),
                };
                let table = match schema.get_table(&key) {
                    Some(t) => t,
                    None => return Ok(Outcome::Ignored),
                };

                let data_len = body.len();
                let type_event = match type_code {
                    TypeCode::WriteRowsEventV1 | TypeCode::WriteRowsEventV2 => TypeEvent::Write,
                    TypeCode::UpdateRowsEventV1 | TypeCode::UpdateRowsEventV2 => TypeEvent::Update,
                    _ => TypeEvent::Delete,
                };

                let mut changes = Vec::new();
                loop {
                    let pos = cursor.position() as usize;
                    if data_len.saturating_sub(pos) < 1 {
                        break;
                    }
                    let (before, after) = match type_code {
                        TypeCode::WriteRowsEventV1 | TypeCode::WriteRowsEventV2 => {
                            let row = parse_one_row(&mut cursor, table, &before_bitmask)?;
                            (None, Some(materialize(table, row)))
                        }
                        TypeCode::UpdateRowsEventV1 | TypeCode::UpdateRowsEventV2 => {
                            let before = parse_one_row(&mut cursor, table, &before_bitmask)?;
                            let after =
                                parse_one_row(&mut cursor, table, after_bitmask.as_ref().unwrap())?;
                            (Some(materialize(table, before)), Some(materialize(table, after)))
                        }
                        _ => {
                            let row = parse_one_row(&mut cursor, table, &before_bitmask)?;
                            (Some(materialize(table, row)), None)
                        }
                    };
                    changes.push(RowChange {
                        type_event,
                        before,
                        after,
                    });
                }
                if changes.is_empty() {
                    Ok(Outcome::Ignored)
                } else {
                    Ok(Outcome::Rows { key, changes })
                }
            }
            TypeCode::XidEvent => {
                if let Some(gtid) = self.pending_gtid.take() {
                    position.add_gtid(&gtid);
                }
                Ok(Outcome::Xid {
                    server_id: header.server_id,
                })
            }
            TypeCode::GtidLogEvent => {
                if let Some(gtid) = self.pending_gtid.take() {
                    position.add_gtid(&gtid);
                }
                let _flags = cursor.read_u8()?;
                let mut uuid_buf = [0u8; 16];
                cursor.read_exact(&mut uuid_buf)?;
                let uuid = Uuid::from_slice(&uuid_buf)?;
                let transaction_no = cursor.read_u64::<LittleEndian>()?;
                self.pending_gtid = Some((uuid.to_simple().to_string(), transaction_no));
                Ok(Outcome::Gtid)
            }
            TypeCode::HeartbeatLogEvent => Ok(Outcome::Heartbeat),
            _ => Ok(Outcome::Ignored),
        }
    }
}

fn materialize(table: &crate::table::Table, row: RowData) -> Row {
    let named: Vec<(String, MySQLValue)> = table
        .columns
        .iter()
        .zip(row)
        .enumerate()
        .filter_map(|(i, (col, value))| {
            if !table.should_include_column(i) {
                return None;
            }
            value.map(|v| (col.name.clone(), v))
        })
        .collect();
    Row::build(table.row_type, named)
}

/// Decode one row's worth of present columns, using the exact wire
/// `ColumnType` (length/precision/pack_length) each column announced in its
/// last `TABLE_MAP_EVENT` (`Table::wire_columns`) rather than a metadata-less
/// type re-derived from the schema's `Field`s — the metadata is the only
/// source of truth for e.g. a `VARCHAR`'s length-prefix width or a
/// `DATETIME(n)`'s fractional-second byte count (§3/§4.4).
fn parse_one_row<R: Read + Seek>(
    cursor: &mut R,
    table: &crate::table::Table,
    present_bitmask: &BitSet,
) -> Result<RowData, EventParseError> {
    if table.wire_columns.len() < table.columns.len() {
        return Err(EventParseError::MissingTableMapMetadata(
            table.full_name.clone(),
        ));
    }
    let num_set_columns = present_bitmask.bits_set();
    let null_bitmask_size = (num_set_columns + 7) >> 3;
    let mut row = Vec::with_capacity(table.columns.len());
    let null_bitmask = BitSet::from_slice(num_set_columns, &read_nbytes(cursor, null_bitmask_size)?)
        .map_err(|_| EventParseError::Eof)?;
    let mut null_index = 0;
    for (i, column) in table.columns.iter().enumerate() {
        if !present_bitmask.is_set(i) {
            row.push(None);
            continue;
        }
        let is_null = null_bitmask.is_set(null_index);
        let val = if is_null {
            MySQLValue::Null
        } else {
            let wire = &table.wire_columns[i];
            column.field.correct_signedness(wire.read_value(cursor)?)
        };
        row.push(Some(val));
        null_index += 1;
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_algorithm_decodes_from_byte() {
        assert_eq!(ChecksumAlgorithm::from(0), ChecksumAlgorithm::None);
        assert_eq!(ChecksumAlgorithm::from(1), ChecksumAlgorithm::Crc32);
        assert_eq!(ChecksumAlgorithm::from(9), ChecksumAlgorithm::Other(9));
    }

    #[test]
    fn type_code_round_trips_known_bytes() {
        assert_eq!(TypeCode::from_byte(19), TypeCode::TableMapEvent);
        assert_eq!(TypeCode::from_byte(33), TypeCode::GtidLogEvent);
        assert_eq!(TypeCode::from_byte(200), TypeCode::OtherUnknown(200));
    }

    fn present_bitmask(n: usize) -> BitSet {
        let mut b = BitSet::new(n);
        for i in 0..n {
            b.set(i);
        }
        b
    }

    /// A short VARCHAR, an unsigned TINY, and a sub-second DATETIME(3) all
    /// decoded with real `TABLE_MAP_EVENT` metadata: this is exactly the
    /// mix of column kinds that silently desynced the row cursor when
    /// metadata-less placeholder `ColumnType`s (`VarChar(256)`,
    /// `DateTime2(0)`) were used instead.
    #[test]
    fn parse_one_row_uses_real_wire_metadata() {
        use crate::field::{Field, IntWidth};
        use crate::table::{Column, Table};

        let mut table = Table::new(
            "db",
            "t",
            vec![
                Column {
                    name: "name".to_owned(),
                    field: Field::VarChar { collation: 33 },
                },
                Column {
                    name: "flags".to_owned(),
                    field: Field::Integer {
                        width: IntWidth::Tiny,
                        unsigned: true,
                    },
                },
                Column {
                    name: "created_at".to_owned(),
                    field: Field::DateTime {
                        is_old_storage: false,
                    },
                },
            ],
        );
        table.refresh_from_table_map(&[
            ColumnType::VarChar(100),
            ColumnType::Tiny,
            ColumnType::DateTime2(3),
        ]);

        let mut body = vec![0u8]; // null bitmask: nothing null
        body.push(2); // "hi" length prefix (1 byte since max_len <= 255)
        body.extend_from_slice(b"hi");
        body.push(0xFF); // tiny, high bit set
        body.extend_from_slice(&[0u8; 5]); // datetime2 packed fields
        body.extend_from_slice(&[0u8; 2]); // 3 fractional digits -> 2 bytes

        let mut cursor = Cursor::new(body);
        let row = parse_one_row(&mut cursor, &table, &present_bitmask(3)).unwrap();

        assert_eq!(row[0], Some(MySQLValue::String("hi".to_owned())));
        assert_eq!(row[1], Some(MySQLValue::UnsignedInteger(255)));
        assert!(row[2].is_some());
        // every byte was consumed; nothing left over to desync a next row.
        assert_eq!(cursor.position() as usize, cursor.get_ref().len());
    }

    #[test]
    fn parse_one_row_errors_without_table_map_metadata() {
        use crate::field::{Field, IntWidth};
        use crate::table::{Column, Table};

        let table = Table::new(
            "db",
            "t",
            vec![Column {
                name: "id".to_owned(),
                field: Field::Integer {
                    width: IntWidth::Long,
                    unsigned: false,
                },
            }],
        );
        let mut cursor = Cursor::new(vec![0u8, 1, 2, 3, 4]);
        let err = parse_one_row(&mut cursor, &table, &present_bitmask(1)).unwrap_err();
        assert!(matches!(err, EventParseError::MissingTableMapMetadata(_)));
    }
}
