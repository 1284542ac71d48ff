//! Error taxonomy for the replication slave.
//!
//! Mirrors the layering of the teacher crate's `errors.rs` (`ColumnParseError`
//! -> `EventParseError` -> `BinlogParseError`) but built on `thiserror`, and
//! extended with the decode/bootstrap/session error families this spec adds.

use thiserror::Error;

use crate::column_types::ColumnType;

#[derive(Debug, Error)]
pub enum DecimalError {
    #[error("decimal overflow: precision/scale exceeds 65 total digits")]
    Overflow,
    #[error("malformed decimal value")]
    BadNum,
}

#[derive(Debug, Error)]
pub enum ColumnParseError {
    #[error("unimplemented column type: {column_type:?}")]
    UnimplementedType { column_type: ColumnType },
    #[error("decimal decode error")]
    Decimal(#[from] DecimalError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("column parse error")]
    Column(#[from] ColumnParseError),
    #[error("unexpected end of stream")]
    Eof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid GTID uuid bytes")]
    Uuid(#[from] uuid::Error),
    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
    #[error("rows event for table {0} arrived before any TABLE_MAP_EVENT")]
    MissingTableMapMetadata(String),
}

/// Corruption detected while comparing or merging GTID sets (spec §7: "GTID
/// comparison with an empty interval list for a named UUID").
#[derive(Debug, Error)]
pub enum GtidError {
    #[error("empty interval list for uuid {0}")]
    EmptyIntervalList(String),
    #[error("invalid gtid set syntax: {0}")]
    InvalidSyntax(String),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("master version {0} is below the minimum supported 5.1.23")]
    VersionTooOld(String),
    #[error("could not parse master version string: {0}")]
    UnparseableVersion(String),
    #[error("master binlog_format is {0}, expected ROW")]
    NotRowFormat(String),
    #[error("slave GTID mode is enabled but master gtid_mode is {0}")]
    MasterGtidDisabled(String),
    #[error("expected column {0} missing from rowset")]
    MissingColumn(&'static str),
    #[error("unknown binlog checksum algorithm byte: {0}")]
    UnknownChecksumAlgorithm(u8),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mysql error {code}: {message}")]
    Mysql { code: u32, message: String },
    #[error("connection lost")]
    ConnectionLost,
    #[error("end of replication stream")]
    EndOfData,
}

/// Registration or checksum-handshake failure; fatal for the current
/// connection attempt (spec §7: "Register/handshake fatal").
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unsupported checksum algorithm: {0}")]
    UnsupportedChecksum(String),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

/// Top-level error surfaced to the embedder. Only bootstrap failures and
/// unrecoverable connect-time errors ever reach this type from `init()`; the
/// session read loop catches `EventParseError`/callback panics internally and
/// never propagates them (spec §7 propagation policy).
#[derive(Debug, Error)]
pub enum SlaveError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
