//! One-time checks run before a session starts streaming, grounded on
//! `original_source/Slave.cpp` (`check_master_version`, `check_slave_gtid_mode`,
//! `get_last_binlog_pos`, `generate_unique_id`) and spec §4.8. All failures
//! here are bootstrap-fatal and propagate straight to the embedder.

use crate::errors::BootstrapError;
use crate::field::{Field, IntWidth};
use crate::position::Position;
use crate::table::Column;
use crate::transport::Transport;

/// `major*10000 + minor*100 + patch`, the same encoding
/// `original_source/Slave.cpp` uses to compare against its `50123` floor.
const MIN_SUPPORTED_VERSION: u32 = 50123;
const OLD_TEMPORAL_STORAGE_CEILING: u32 = 50604;

fn first_column(rows: &[Vec<Option<String>>], row: usize, column: &'static str) -> Result<String, BootstrapError> {
    rows.get(row)
        .and_then(|r| r.first())
        .and_then(|v| v.clone())
        .ok_or(BootstrapError::MissingColumn(column))
}

/// Parse a MySQL `VERSION()` string's leading `%d.%d.%d` into the encoded
/// `major*10000+minor*100+patch` form. Ignores any trailing build suffix
/// (e.g. `-log`, `-MariaDB`).
fn parse_version(raw: &str) -> Result<u32, BootstrapError> {
    let mut parts = raw.splitn(3, '.');
    let major: u32 = parts
        .next()
        .ok_or_else(|| BootstrapError::UnparseableVersion(raw.to_owned()))?
        .parse()
        .map_err(|_| BootstrapError::UnparseableVersion(raw.to_owned()))?;
    let minor: u32 = parts
        .next()
        .ok_or_else(|| BootstrapError::UnparseableVersion(raw.to_owned()))?
        .parse()
        .map_err(|_| BootstrapError::UnparseableVersion(raw.to_owned()))?;
    let patch_str = parts
        .next()
        .ok_or_else(|| BootstrapError::UnparseableVersion(raw.to_owned()))?;
    let patch_digits: String = patch_str.chars().take_while(|c| c.is_ascii_digit()).collect();
    let patch: u32 = patch_digits
        .parse()
        .map_err(|_| BootstrapError::UnparseableVersion(raw.to_owned()))?;
    Ok(major * 10000 + minor * 100 + patch)
}

/// Whether temporal fields (`TIME`/`DATETIME`/`TIMESTAMP`) on this master use
/// the pre-5.6.4 storage format. Returns `true` below `OLD_TEMPORAL_STORAGE_CEILING`.
pub fn is_old_temporal_storage(encoded_version: u32) -> bool {
    encoded_version < OLD_TEMPORAL_STORAGE_CEILING
}

/// `SELECT VERSION()`; fails if below the minimum supported release.
/// Returns the encoded version, for [`is_old_temporal_storage`].
pub fn check_master_version<T: Transport>(transport: &mut T) -> Result<u32, BootstrapError> {
    let rows = transport.query("SELECT VERSION()")?;
    let raw = first_column(&rows, 0, "VERSION()")?;
    let encoded = parse_version(&raw)?;
    if encoded < MIN_SUPPORTED_VERSION {
        return Err(BootstrapError::VersionTooOld(raw));
    }
    Ok(encoded)
}

/// Apply a master's temporal-storage epoch to every field of a freshly
/// bootstrapped table's column list (spec §4.8).
pub fn apply_temporal_storage(columns: &mut [Column], old_storage: bool) {
    for column in columns.iter_mut() {
        column.field = column.field.clone().with_old_storage(old_storage);
    }
}

/// `SHOW GLOBAL VARIABLES LIKE 'binlog_format'` must be `ROW`.
pub fn check_master_binlog_format<T: Transport>(transport: &mut T) -> Result<(), BootstrapError> {
    let rows = transport.query("SHOW GLOBAL VARIABLES LIKE 'binlog_format'")?;
    let value = rows.first()
        .and_then(|r| r.get(1))
        .and_then(|v| v.clone())
        .ok_or(BootstrapError::MissingColumn("Value"))?;
    if !value.eq_ignore_ascii_case("ROW") {
        return Err(BootstrapError::NotRowFormat(value));
    }
    Ok(())
}

/// `SHOW GLOBAL VARIABLES LIKE 'gtid_mode'`, returning the raw value
/// (`ON`/`OFF`/`ON_PERMISSIVE`/`OFF_PERMISSIVE`).
pub fn read_gtid_mode<T: Transport>(transport: &mut T) -> Result<String, BootstrapError> {
    let rows = transport.query("SHOW GLOBAL VARIABLES LIKE 'gtid_mode'")?;
    rows.first()
        .and_then(|r| r.get(1))
        .and_then(|v| v.clone())
        .ok_or(BootstrapError::MissingColumn("Value"))
}

/// If the slave is configured to use GTIDs, the master must have GTIDs
/// enabled too (spec §4.8: "slave GTID enabled while master GTID OFF is
/// bootstrap-fatal").
pub fn check_gtid_modes<T: Transport>(
    transport: &mut T,
    slave_gtid_enabled: bool,
) -> Result<(), BootstrapError> {
    if !slave_gtid_enabled {
        return Ok(());
    }
    let master_mode = read_gtid_mode(transport)?;
    if !master_mode.eq_ignore_ascii_case("ON") {
        return Err(BootstrapError::MasterGtidDisabled(master_mode));
    }
    Ok(())
}

/// `SHOW MASTER STATUS`, seeding the starting [`Position`].
pub fn get_last_binlog_pos<T: Transport>(transport: &mut T) -> Result<Position, BootstrapError> {
    let rows = transport.query("SHOW MASTER STATUS")?;
    let log_name = first_column(&rows, 0, "File")?;
    let pos_str = rows.first()
        .and_then(|r| r.get(1))
        .and_then(|v| v.clone())
        .ok_or(BootstrapError::MissingColumn("Position"))?;
    let log_pos: u64 = pos_str
        .parse()
        .map_err(|_| BootstrapError::MissingColumn("Position"))?;
    let mut position = Position::new();
    position.log_name = log_name;
    position.log_pos = log_pos;
    if let Some(executed_gtids) = rows.first().and_then(|r| r.get(4)).and_then(|v| v.clone()) {
        if !executed_gtids.is_empty() {
            let _ = position.parse_gtid(&executed_gtids);
        }
    }
    Ok(position)
}

/// `SHOW SLAVE HOSTS`, returning every currently-registered slave server id.
pub fn list_registered_slave_ids<T: Transport>(transport: &mut T) -> Result<Vec<u32>, BootstrapError> {
    let rows = transport.query("SHOW SLAVE HOSTS")?;
    Ok(rows
        .iter()
        .filter_map(|r| r.first().and_then(|v| v.clone()))
        .filter_map(|s| s.parse::<u32>().ok())
        .collect())
}

/// Pick a server id for `COM_REGISTER_SLAVE`, starting from `seed` and
/// incrementing until it doesn't collide with any already-registered slave.
pub fn generate_slave_id<T: Transport>(transport: &mut T, seed: u32) -> Result<u32, BootstrapError> {
    let taken = list_registered_slave_ids(transport)?;
    let mut candidate = seed;
    while taken.contains(&candidate) {
        candidate = candidate.wrapping_add(1);
    }
    Ok(candidate)
}

/// Map a `SHOW FULL COLUMNS` `Type` cell (e.g. `varchar(255)`, `decimal(10,2)
/// unsigned`, `int(11)`) to a [`Field`]. Unrecognized types fall back to
/// `Blob`, matching `original_source/Slave.cpp`'s conservative handling of
/// types it doesn't specifically decode.
fn field_from_type_string(type_str: &str) -> Field {
    let lower = type_str.to_ascii_lowercase();
    let unsigned = lower.contains("unsigned");
    let base = lower.split(['(', ' ']).next().unwrap_or("");
    match base {
        "tinyint" => Field::Integer { width: IntWidth::Tiny, unsigned },
        "smallint" => Field::Integer { width: IntWidth::Short, unsigned },
        "mediumint" => Field::Integer { width: IntWidth::Medium, unsigned },
        "int" | "integer" => Field::Integer { width: IntWidth::Long, unsigned },
        "bigint" => Field::Integer { width: IntWidth::LongLong, unsigned },
        "float" => Field::Float,
        "double" => Field::Double,
        "decimal" | "numeric" => {
            let (precision, scale) = parse_precision_scale(&lower).unwrap_or((10, 0));
            Field::Decimal { precision, scale }
        }
        "year" => Field::Year,
        "date" => Field::Date,
        "time" => Field::Time { is_old_storage: false },
        "datetime" => Field::DateTime { is_old_storage: false },
        "timestamp" => Field::Timestamp { is_old_storage: false },
        "enum" => Field::Enum,
        "set" => Field::Set,
        "bit" => Field::Bit,
        "char" | "varchar" | "text" | "mediumtext" | "longtext" | "tinytext" => {
            Field::VarChar { collation: 0 }
        }
        _ => Field::Blob,
    }
}

fn parse_precision_scale(type_str: &str) -> Option<(u8, u8)> {
    let open = type_str.find('(')?;
    let close = type_str.find(')')?;
    let mut parts = type_str[open + 1..close].split(',');
    let precision: u8 = parts.next()?.trim().parse().ok()?;
    let scale: u8 = parts.next().unwrap_or("0").trim().parse().ok()?;
    Some((precision, scale))
}

/// `SHOW FULL COLUMNS FROM tbl IN db`, mapped to the table's new column list
/// after a DDL rebuild (spec §6).
pub fn describe_table<T: Transport>(
    transport: &mut T,
    db: &str,
    table: &str,
) -> Result<Vec<Column>, BootstrapError> {
    let rows = transport.query(&format!("SHOW FULL COLUMNS FROM `{}` IN `{}`", table, db))?;
    rows.iter()
        .map(|row| {
            let name = row.first()
                .and_then(|v| v.clone())
                .ok_or(BootstrapError::MissingColumn("Field"))?;
            let type_str = row
                .get(1)
                .and_then(|v| v.clone())
                .ok_or(BootstrapError::MissingColumn("Type"))?;
            Ok(Column {
                name,
                field: field_from_type_string(&type_str),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn parse_version_encodes_major_minor_patch() {
        assert_eq!(parse_version("5.7.26").unwrap(), 50726);
        assert_eq!(parse_version("5.6.3-log").unwrap(), 50603);
    }

    #[test]
    fn is_old_temporal_storage_boundary() {
        assert!(is_old_temporal_storage(50603));
        assert!(!is_old_temporal_storage(50604));
    }

    #[test]
    fn check_master_version_rejects_too_old() {
        let mut t = MockTransport::new().with_query(
            "SELECT VERSION()",
            vec![vec![Some("5.0.99".to_owned())]],
        );
        let err = check_master_version(&mut t).unwrap_err();
        assert!(matches!(err, BootstrapError::VersionTooOld(_)));
    }

    #[test]
    fn check_master_version_accepts_supported() {
        let mut t = MockTransport::new().with_query(
            "SELECT VERSION()",
            vec![vec![Some("5.7.26-log".to_owned())]],
        );
        assert_eq!(check_master_version(&mut t).unwrap(), 50726);
    }

    #[test]
    fn check_master_binlog_format_rejects_statement() {
        let mut t = MockTransport::new().with_query(
            "SHOW GLOBAL VARIABLES LIKE 'binlog_format'",
            vec![vec![Some("binlog_format".to_owned()), Some("STATEMENT".to_owned())]],
        );
        assert!(check_master_binlog_format(&mut t).is_err());
    }

    #[test]
    fn check_gtid_modes_fatal_when_master_disabled() {
        let mut t = MockTransport::new().with_query(
            "SHOW GLOBAL VARIABLES LIKE 'gtid_mode'",
            vec![vec![Some("gtid_mode".to_owned()), Some("OFF".to_owned())]],
        );
        let err = check_gtid_modes(&mut t, true).unwrap_err();
        assert!(matches!(err, BootstrapError::MasterGtidDisabled(_)));
    }

    #[test]
    fn check_gtid_modes_skipped_when_slave_not_gtid() {
        let mut t = MockTransport::new();
        assert!(check_gtid_modes(&mut t, false).is_ok());
    }

    #[test]
    fn get_last_binlog_pos_seeds_position() {
        let mut t = MockTransport::new().with_query(
            "SHOW MASTER STATUS",
            vec![vec![
                Some("mysql-bin.000003".to_owned()),
                Some("154".to_owned()),
                None,
                None,
                Some("".to_owned()),
            ]],
        );
        let pos = get_last_binlog_pos(&mut t).unwrap();
        assert_eq!(pos.log_name, "mysql-bin.000003");
        assert_eq!(pos.log_pos, 154);
    }

    #[test]
    fn describe_table_maps_common_column_types() {
        let mut t = MockTransport::new().with_query(
            "SHOW FULL COLUMNS FROM `t` IN `db`",
            vec![
                vec![Some("id".to_owned()), Some("int(11)".to_owned())],
                vec![Some("price".to_owned()), Some("decimal(10,2) unsigned".to_owned())],
                vec![Some("name".to_owned()), Some("varchar(255)".to_owned())],
            ],
        );
        let columns = describe_table(&mut t, "db", "t").unwrap();
        assert_eq!(columns[0].field, Field::Integer { width: IntWidth::Long, unsigned: false });
        assert_eq!(columns[1].field, Field::Decimal { precision: 10, scale: 2 });
        assert_eq!(columns[2].field, Field::VarChar { collation: 0 });
    }

    #[test]
    fn generate_slave_id_increments_past_collisions() {
        let mut t = MockTransport::new().with_query(
            "SHOW SLAVE HOSTS",
            vec![vec![Some("7".to_owned())], vec![Some("8".to_owned())]],
        );
        assert_eq!(generate_slave_id(&mut t, 7).unwrap(), 9);
    }
}
