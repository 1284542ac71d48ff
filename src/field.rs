//! Typed column definitions for a [`crate::table::Table`].
//!
//! Unlike [`crate::column_types::ColumnType`] (the wire type byte carried by
//! a `TABLE_MAP_EVENT`, with no column names attached — classic row-based
//! binlogs are not self-describing), a `Field` is the user/bootstrap-supplied,
//! named column definition a `Table` is built from. At `TABLE_MAP_EVENT` time
//! the wire types are walked position-by-position only to refresh the
//! old/new storage flag on temporal fields (§4.4); field names and the rest
//! of the type never change after the table is built.

use crate::column_types::ColumnType;
use crate::value::MySQLValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    Tiny,
    Short,
    Medium,
    Long,
    LongLong,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Integer {
        width: IntWidth,
        unsigned: bool,
    },
    Float,
    Double,
    Decimal {
        precision: u8,
        scale: u8,
    },
    Year,
    Date,
    Time {
        is_old_storage: bool,
    },
    DateTime {
        is_old_storage: bool,
    },
    Timestamp {
        is_old_storage: bool,
    },
    Enum,
    Set,
    VarChar {
        collation: u16,
    },
    Blob,
    Bit,
}

impl Field {
    /// Whether the master's `< 5.6.4` "old" temporal storage applies, as
    /// decided by [`crate::bootstrap`] from the server version. Has no
    /// effect on non-temporal fields.
    pub fn with_old_storage(self, old_storage: bool) -> Self {
        match self {
            Field::Time { .. } => Field::Time {
                is_old_storage: old_storage,
            },
            Field::DateTime { .. } => Field::DateTime {
                is_old_storage: old_storage,
            },
            Field::Timestamp { .. } => Field::Timestamp {
                is_old_storage: old_storage,
            },
            other => other,
        }
    }

    /// Reset the old/new storage flag according to the wire column type
    /// observed in a `TABLE_MAP_EVENT` at the same ordinal position (§4.4):
    /// `TIMESTAMP2/DATETIME2/TIME2` select new storage, the legacy codes
    /// select old storage. No-op for every other field kind.
    pub fn refresh_from_wire_type(&mut self, wire: &ColumnType) {
        match (&mut *self, wire) {
            (Field::Time { is_old_storage }, ColumnType::Time2(_)) => *is_old_storage = false,
            (Field::Time { is_old_storage }, ColumnType::Time) => *is_old_storage = true,
            (Field::DateTime { is_old_storage }, ColumnType::DateTime2(_)) => {
                *is_old_storage = false
            }
            (Field::DateTime { is_old_storage }, ColumnType::DateTime) => *is_old_storage = true,
            (Field::Timestamp { is_old_storage }, ColumnType::Timestamp2(_)) => {
                *is_old_storage = false
            }
            (Field::Timestamp { is_old_storage }, ColumnType::Timestamp) => *is_old_storage = true,
            _ => {}
        }
    }

    /// Reinterpret a wire-decoded `MySQLValue::SignedInteger` as unsigned
    /// when this field is an `unsigned` integer column. The wire type always
    /// decodes a sign-extended `i64` of the column's true byte width
    /// (`ColumnType::read_value`), so the fix is a reinterpret-and-mask of
    /// that bit pattern, not a different read. No-op for everything else.
    pub fn correct_signedness(&self, value: MySQLValue) -> MySQLValue {
        match (self, value) {
            (Field::Integer { width, unsigned: true }, MySQLValue::SignedInteger(v)) => {
                let mask: u64 = match width {
                    IntWidth::Tiny => 0xFF,
                    IntWidth::Short => 0xFFFF,
                    IntWidth::Medium => 0xFF_FFFF,
                    IntWidth::Long => 0xFFFF_FFFF,
                    IntWidth::LongLong => u64::MAX,
                };
                MySQLValue::UnsignedInteger((v as u64) & mask)
            }
            (_, value) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_from_wire_type_flips_temporal_storage() {
        let mut f = Field::DateTime {
            is_old_storage: true,
        };
        f.refresh_from_wire_type(&ColumnType::DateTime2(0));
        assert_eq!(
            f,
            Field::DateTime {
                is_old_storage: false
            }
        );
        f.refresh_from_wire_type(&ColumnType::DateTime);
        assert_eq!(
            f,
            Field::DateTime {
                is_old_storage: true
            }
        );
    }

    #[test]
    fn correct_signedness_reinterprets_unsigned_high_bit() {
        let f = Field::Integer {
            width: IntWidth::Tiny,
            unsigned: true,
        };
        assert_eq!(
            f.correct_signedness(MySQLValue::SignedInteger(-1)),
            MySQLValue::UnsignedInteger(255)
        );

        let f = Field::Integer {
            width: IntWidth::Long,
            unsigned: true,
        };
        assert_eq!(
            f.correct_signedness(MySQLValue::SignedInteger(-1)),
            MySQLValue::UnsignedInteger(0xFFFF_FFFF)
        );
    }

    #[test]
    fn correct_signedness_leaves_signed_and_non_integer_untouched() {
        let f = Field::Integer {
            width: IntWidth::Long,
            unsigned: false,
        };
        assert_eq!(
            f.correct_signedness(MySQLValue::SignedInteger(-1)),
            MySQLValue::SignedInteger(-1)
        );
        assert_eq!(
            Field::Double.correct_signedness(MySQLValue::Null),
            MySQLValue::Null
        );
    }

    #[test]
    fn refresh_from_wire_type_ignores_non_temporal() {
        let mut f = Field::Integer {
            width: IntWidth::Long,
            unsigned: false,
        };
        f.refresh_from_wire_type(&ColumnType::DateTime2(0));
        assert_eq!(
            f,
            Field::Integer {
                width: IntWidth::Long,
                unsigned: false
            }
        );
    }
}
