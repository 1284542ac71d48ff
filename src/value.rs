use serde::Serialize;

use crate::decimal::Decimal;

#[derive(Debug, Serialize, PartialEq)]
/// Normalized representation of a decoded MySQL column value.
pub enum MySQLValue {
    SignedInteger(i64),
    UnsignedInteger(u64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Enum(i64),
    Set(u64),
    Blob(Vec<u8>),
    Bit(u64),
    Year(u32),
    Date {
        year: u32,
        month: u32,
        day: u32,
    },
    Time {
        hours: u32,
        minutes: u32,
        seconds: u32,
        subseconds: u32,
    },
    DateTime {
        year: u32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        subsecond: u32,
    },
    Timestamp {
        unix_time: i32,
        subsecond: u32,
    },
    Null,
}
