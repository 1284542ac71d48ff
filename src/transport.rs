//! The connection boundary to a MySQL master: an opaque "run a command /
//! read a packet / run a query" trait, plus the bit-exact command encoders
//! `ReplicationSession` hands to it. Grounded on `original_source/Slave.cpp`
//! (`register_slave_on_master`, `request_dump_wo_gtid`, `request_dump`,
//! `net_store_length_fast`/`net_store_data`).

use byteorder::{ByteOrder, LittleEndian};

use crate::errors::TransportError;
use crate::position::Position;

/// One row of a `SHOW`/`SELECT` result, as strings (MySQL text protocol).
pub type TextRow = Vec<Option<String>>;

/// The wire operations a `ReplicationSession` needs from a MySQL connection.
/// The crate ships no TCP/TLS implementation, only this trait boundary and
/// a test-only in-memory [`MockTransport`].
pub trait Transport {
    /// Establish (or re-establish) the underlying connection.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Run a `SELECT`/`SHOW` style query and collect every row as strings.
    fn query(&mut self, sql: &str) -> Result<Vec<TextRow>, TransportError>;

    /// Send a raw command packet (command byte folded into `body[0]` by the
    /// caller's encoder) and wait for the server's ack/error response.
    fn command(&mut self, command_byte: u8, body: &[u8]) -> Result<(), TransportError>;

    /// Read one binlog-stream packet after a dump request. Returns the
    /// packet payload (OK-marker byte included, per spec §4.5).
    fn read_packet(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Unblock any in-flight [`Transport::read_packet`] and release the
    /// connection. Safe to call from a different thread than the one
    /// currently blocked in `read_packet` (spec §5).
    fn shutdown(&mut self);
}

pub(crate) const COM_BINLOG_DUMP: u8 = 0x12;
pub(crate) const COM_REGISTER_SLAVE: u8 = 0x15;
pub(crate) const COM_BINLOG_DUMP_GTID: u8 = 0x1e;

const BINLOG_THROUGH_GTID: u16 = 4;

/// MySQL's "net_store" length-prefixed encoding: one byte for lengths below
/// 251, else `0xFC` followed by a little-endian `u16`.
fn net_store_data(out: &mut Vec<u8>, data: &[u8]) {
    if data.len() < 251 {
        out.push(data.len() as u8);
    } else {
        out.push(0xFC);
        let mut len_buf = [0u8; 2];
        LittleEndian::write_u16(&mut len_buf, data.len() as u16);
        out.extend_from_slice(&len_buf);
    }
    out.extend_from_slice(data);
}

/// Build a `COM_REGISTER_SLAVE` body (spec §4.5): `server_id`, length-prefixed
/// hostname, length-prefixed fixed `"begun_slave"` user/pass, `port=0`,
/// `rpl_recovery_rank=0`, `master_id=0` (server fills it in).
pub fn encode_register_slave(server_id: u32, hostname: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + hostname.len());
    let mut server_id_buf = [0u8; 4];
    LittleEndian::write_u32(&mut server_id_buf, server_id);
    buf.extend_from_slice(&server_id_buf);
    net_store_data(&mut buf, hostname.as_bytes());
    net_store_data(&mut buf, b"begun_slave");
    net_store_data(&mut buf, b"begun_slave");
    buf.extend_from_slice(&[0u8; 2]); // port
    buf.extend_from_slice(&[0u8; 4]); // rpl_recovery_rank
    buf.extend_from_slice(&[0u8; 4]); // master_id, server-assigned
    buf
}

/// Build a `COM_BINLOG_DUMP` body: `pos:u32 | flags:u16=0 | server_id:u32 | log_name`.
pub fn encode_binlog_dump(log_name: &str, log_pos: u32, server_id: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10 + log_name.len());
    let mut pos_buf = [0u8; 4];
    LittleEndian::write_u32(&mut pos_buf, log_pos);
    buf.extend_from_slice(&pos_buf);
    buf.extend_from_slice(&[0u8; 2]); // flags
    let mut server_id_buf = [0u8; 4];
    LittleEndian::write_u32(&mut server_id_buf, server_id);
    buf.extend_from_slice(&server_id_buf);
    buf.extend_from_slice(log_name.as_bytes());
    buf
}

/// Build a `COM_BINLOG_DUMP_GTID` body (spec §3/§6):
/// `flags:u16=4 | server_id:u32 | log_name_len:u32=0 | log_pos:u64=4 | gtid_size:u32 | gtid_data`.
pub fn encode_binlog_dump_gtid(server_id: u32, position: &Position) -> Vec<u8> {
    let gtid_size = position.encoded_gtid_size();
    let mut buf = vec![0u8; 22 + gtid_size];
    LittleEndian::write_u16(&mut buf[0..2], BINLOG_THROUGH_GTID);
    LittleEndian::write_u32(&mut buf[2..6], server_id);
    LittleEndian::write_u32(&mut buf[6..10], 0); // log_name_len
    LittleEndian::write_u64(&mut buf[10..18], 4); // log_pos
    LittleEndian::write_u32(&mut buf[18..22], gtid_size as u32);
    position.encode_gtid(&mut buf[22..]);
    buf
}

/// Command bytes used by [`ReplicationSession`](crate::session::ReplicationSession).
pub(crate) mod command {
    pub(crate) use super::{COM_BINLOG_DUMP, COM_BINLOG_DUMP_GTID, COM_REGISTER_SLAVE};
}

/// An in-memory [`Transport`] for embedders' own tests (and this crate's).
pub mod mock {
    use std::collections::VecDeque;

    use super::*;

    /// An in-memory `Transport` for tests: canned query responses plus a
    /// queue of binlog packets to hand back from `read_packet`.
    #[derive(Default)]
    pub struct MockTransport {
        pub query_responses: std::collections::HashMap<String, Vec<TextRow>>,
        pub packets: VecDeque<Vec<u8>>,
        pub connected: bool,
        pub shutdown_called: bool,
        pub sent_commands: Vec<(u8, Vec<u8>)>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            MockTransport::default()
        }

        pub fn with_query(mut self, sql: &str, rows: Vec<TextRow>) -> Self {
            self.query_responses.insert(sql.to_owned(), rows);
            self
        }

        pub fn push_packet(&mut self, packet: Vec<u8>) {
            self.packets.push_back(packet);
        }
    }

    impl Transport for MockTransport {
        fn connect(&mut self) -> Result<(), TransportError> {
            self.connected = true;
            Ok(())
        }

        fn query(&mut self, sql: &str) -> Result<Vec<TextRow>, TransportError> {
            self.query_responses
                .get(sql)
                .cloned()
                .ok_or_else(|| TransportError::Mysql {
                    code: 0,
                    message: format!("no canned response for query: {}", sql),
                })
        }

        fn command(&mut self, command_byte: u8, body: &[u8]) -> Result<(), TransportError> {
            self.sent_commands.push((command_byte, body.to_vec()));
            Ok(())
        }

        fn read_packet(&mut self) -> Result<Vec<u8>, TransportError> {
            self.packets.pop_front().ok_or(TransportError::EndOfData)
        }

        fn shutdown(&mut self) {
            self.shutdown_called = true;
            self.connected = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_store_data_uses_one_byte_prefix_under_251() {
        let mut buf = Vec::new();
        net_store_data(&mut buf, b"host");
        assert_eq!(buf, vec![4, b'h', b'o', b's', b't']);
    }

    #[test]
    fn net_store_data_uses_0xfc_prefix_at_or_above_251() {
        let data = vec![0x41u8; 300];
        let mut buf = Vec::new();
        net_store_data(&mut buf, &data);
        assert_eq!(buf[0], 0xFC);
        assert_eq!(LittleEndian::read_u16(&buf[1..3]), 300);
        assert_eq!(&buf[3..], &data[..]);
    }

    #[test]
    fn register_slave_body_layout() {
        let body = encode_register_slave(7, "host");
        assert_eq!(LittleEndian::read_u32(&body[0..4]), 7);
        assert_eq!(&body[4..9], &[4, b'h', b'o', b's', b't']);
        // "begun_slave" is 11 bytes, one-byte length prefix
        let user_start = 9;
        assert_eq!(body[user_start], 11);
        assert_eq!(&body[user_start + 1..user_start + 12], b"begun_slave");
        let pass_start = user_start + 12;
        assert_eq!(body[pass_start], 11);
        let after_pass = pass_start + 12;
        assert_eq!(&body[after_pass..after_pass + 2], &[0, 0]); // port
        assert_eq!(&body[after_pass + 2..after_pass + 6], &[0, 0, 0, 0]); // recovery rank
        assert_eq!(&body[after_pass + 6..after_pass + 10], &[0, 0, 0, 0]); // master_id
    }

    #[test]
    fn binlog_dump_body_layout() {
        let body = encode_binlog_dump("mysql-bin.000003", 1234, 42);
        assert_eq!(LittleEndian::read_u32(&body[0..4]), 1234);
        assert_eq!(&body[4..6], &[0, 0]);
        assert_eq!(LittleEndian::read_u32(&body[6..10]), 42);
        assert_eq!(&body[10..], b"mysql-bin.000003");
    }

    #[test]
    fn binlog_dump_gtid_body_layout() {
        let mut pos = Position::new();
        pos.parse_gtid("ae00751acb5f11e69d92e03f490fd3db:1-12:15-17").unwrap();
        let body = encode_binlog_dump_gtid(42, &pos);
        assert_eq!(LittleEndian::read_u16(&body[0..2]), 4);
        assert_eq!(LittleEndian::read_u32(&body[2..6]), 42);
        assert_eq!(LittleEndian::read_u32(&body[6..10]), 0);
        assert_eq!(LittleEndian::read_u64(&body[10..18]), 4);
        let gtid_size = pos.encoded_gtid_size();
        assert_eq!(LittleEndian::read_u32(&body[18..22]), gtid_size as u32);
        assert_eq!(body.len(), 22 + gtid_size);
    }
}
