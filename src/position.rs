//! Binlog coordinates: either a classic `(file, offset)` pair or a GTID set,
//! or both. Transliterated from `original_source/binlog_pos.cpp`.

use std::collections::BTreeMap;
use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::errors::GtidError;

/// Encoded/decoded SID length in bytes (a UUID is 16 bytes).
const ENCODED_SID_LENGTH: usize = 16;

/// A closed `[first, last]` transaction-number interval.
pub type GtidInterval = (u64, u64);

/// `(server_uuid_hex, transaction_number)`, as carried by a `GTID_LOG_EVENT`.
pub type Gtid = (String, u64);

/// Binlog coordinates as tracked across the session: the last
/// `(log_name, log_pos)` seen, plus the accumulated GTID set if the master
/// runs with GTIDs enabled. Per server UUID the interval list is kept sorted
/// and coalesced (no two intervals are adjacent or overlapping).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub log_name: String,
    pub log_pos: u64,
    pub gtid_executed: BTreeMap<String, Vec<GtidInterval>>,
}

impl Position {
    pub fn new() -> Self {
        Position::default()
    }

    /// Parse a `gtid_set` string: `uuid:interval[:interval]...[,uuid:...]`,
    /// e.g. `ae00751a-cb5f-11e6-9d92-e03f490fd3db:1-12:15-17`. Replaces
    /// whatever GTID set was previously held.
    pub fn parse_gtid(&mut self, input: &str) -> Result<(), GtidError> {
        self.gtid_executed.clear();
        let s: String = input.chars().filter(|&c| c != ' ' && c != '\n').collect();
        if s.is_empty() {
            return Ok(());
        }
        for token in s.split(',') {
            if token.is_empty() {
                continue;
            }
            let mut parts = token.split(':');
            let uuid = parts
                .next()
                .ok_or_else(|| GtidError::InvalidSyntax(token.to_owned()))?
                .replace('-', "");
            let mut intervals = Vec::new();
            for piece in parts {
                let mut nums = piece.splitn(2, '-');
                let first: u64 = nums
                    .next()
                    .ok_or_else(|| GtidError::InvalidSyntax(token.to_owned()))?
                    .parse()
                    .map_err(|_| GtidError::InvalidSyntax(token.to_owned()))?;
                let last = match nums.next() {
                    Some(n) => n
                        .parse()
                        .map_err(|_| GtidError::InvalidSyntax(token.to_owned()))?,
                    None => first,
                };
                intervals.push((first, last));
            }
            self.gtid_executed.entry(uuid).or_default().extend(intervals);
        }
        Ok(())
    }

    /// Fold a single observed `(uuid, transaction_no)` GTID into the set,
    /// merging/coalescing adjacent intervals. Mirrors `Position::addGtid`.
    pub fn add_gtid(&mut self, gtid: &Gtid) {
        let (uuid, trans_no) = gtid;
        let intervals = self.gtid_executed.entry(uuid.clone()).or_default();

        let mut add_new_interval = true;
        let mut merge_at: Option<usize> = None;
        let mut insert_at: Option<usize> = None;

        for (i, interval) in intervals.iter_mut().enumerate() {
            if interval.1 + 1 == *trans_no {
                interval.1 += 1;
                add_new_interval = false;
                merge_at = Some(i);
                break;
            }
            if *trans_no >= interval.0 && *trans_no <= interval.1 {
                return;
            }
            if trans_no + 1 == interval.0 {
                interval.0 -= 1;
                add_new_interval = false;
                merge_at = Some(i);
                break;
            }
            if *trans_no < interval.0 {
                insert_at = Some(i);
                break;
            }
        }

        if let Some(i) = insert_at {
            intervals.insert(i, (*trans_no, *trans_no));
            return;
        }

        if add_new_interval {
            intervals.push((*trans_no, *trans_no));
            return;
        }

        if let Some(i) = merge_at {
            if i + 1 < intervals.len() && intervals[i].1 + 1 == intervals[i + 1].0 {
                intervals[i].1 = intervals[i + 1].1;
                intervals.remove(i + 1);
            }
        }
    }

    /// Byte size of the `COM_BINLOG_DUMP_GTID` GTID-set payload, 0 if empty.
    pub fn encoded_gtid_size(&self) -> usize {
        if self.gtid_executed.is_empty() {
            return 0;
        }
        let mut result = 8usize;
        for intervals in self.gtid_executed.values() {
            result += intervals.len() * 16 + 8 + ENCODED_SID_LENGTH;
        }
        result
    }

    /// Encode the GTID set into `buf` (must be at least [`encoded_gtid_size`]
    /// bytes). A no-op if the set is empty.
    pub fn encode_gtid(&self, buf: &mut [u8]) {
        if self.gtid_executed.is_empty() {
            return;
        }
        LittleEndian::write_u64(&mut buf[0..8], self.gtid_executed.len() as u64);
        let mut offset = 8;
        for (sid, intervals) in &self.gtid_executed {
            let sid_bytes = hex_to_bin(sid);
            buf[offset..offset + ENCODED_SID_LENGTH].copy_from_slice(&sid_bytes);
            offset += ENCODED_SID_LENGTH;
            LittleEndian::write_u64(&mut buf[offset..offset + 8], intervals.len() as u64);
            offset += 8;
            for &(first, last) in intervals {
                LittleEndian::write_u64(&mut buf[offset..offset + 8], first);
                offset += 8;
                LittleEndian::write_u64(&mut buf[offset..offset + 8], last + 1);
                offset += 8;
            }
        }
    }

    /// Whether this position is known to have reached (be at or past) `other`.
    /// Follows `Position::reachedOtherPos`: non-GTID positions compare by
    /// `(log_name, log_pos)`; a GTID position is always considered ahead of
    /// a non-GTID one and behind a position it has no GTID set for.
    pub fn reached_other_pos(&self, other: &Position) -> Result<bool, GtidError> {
        if self.gtid_executed.is_empty() && other.gtid_executed.is_empty() {
            return Ok(self.log_name > other.log_name
                || (self.log_name == other.log_name && self.log_pos >= other.log_pos));
        }
        if self.gtid_executed.is_empty() {
            return Ok(false);
        }
        if other.gtid_executed.is_empty() {
            return Ok(true);
        }

        for (other_source, other_transactions) in &other.gtid_executed {
            if other_transactions.is_empty() {
                return Err(GtidError::EmptyIntervalList(other_source.clone()));
            }
            let this_transactions = match self.gtid_executed.get(other_source) {
                Some(t) => t,
                None => return Ok(false),
            };
            if this_transactions.is_empty() {
                return Err(GtidError::EmptyIntervalList(other_source.clone()));
            }
            let this_last = this_transactions.last().unwrap().1;
            let other_last = other_transactions.last().unwrap().1;
            if this_last < other_last {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'")?;
        if !self.log_name.is_empty() && self.log_pos != 0 {
            write!(f, "{}:{}, ", self.log_name, self.log_pos)?;
        }
        write!(f, "GTIDs=")?;
        if self.gtid_executed.is_empty() {
            return write!(f, "-'");
        }
        let mut first_a = true;
        for (sid, intervals) in &self.gtid_executed {
            if first_a {
                first_a = false;
            } else {
                write!(f, ",")?;
            }
            write!(f, "{}:", sid)?;
            let mut first_b = true;
            for (first, last) in intervals {
                if first_b {
                    first_b = false;
                } else {
                    write!(f, ":")?;
                }
                if first == last {
                    write!(f, "{}", first)?;
                } else {
                    write!(f, "{}-{}", first, last)?;
                }
            }
        }
        write!(f, "'")
    }
}

fn hex_to_bin(hex: &str) -> [u8; ENCODED_SID_LENGTH] {
    let mut out = [0u8; ENCODED_SID_LENGTH];
    let bytes = hex.as_bytes();
    for i in 0..ENCODED_SID_LENGTH {
        let hi = hex_digit(bytes[2 * i]);
        let lo = hex_digit(bytes[2 * i + 1]);
        out[i] = (hi << 4) | lo;
    }
    out
}

fn hex_digit(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'A'..=b'F' => c - b'A' + 10,
        b'a'..=b'f' => c - b'a' + 10,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_parse_and_display_gtid_set() {
        let mut p = Position::new();
        p.parse_gtid("ae00751a-cb5f-11e6-9d92-e03f490fd3db:1-12:15-17").unwrap();
        assert_eq!(
            p.to_string(),
            "'GTIDs=ae00751acb5f11e69d92e03f490fd3db:1-12:15-17'"
        );
    }

    #[test]
    fn s3_add_gtid_merges_adjacent() {
        let mut p = Position::new();
        p.parse_gtid("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa:1-5:10-12").unwrap();
        p.add_gtid(&("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_owned(), 6));
        assert_eq!(
            p.gtid_executed["aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"],
            vec![(1, 6), (10, 12)]
        );
        // now bridge the gap: 7,8,9 fill in one at a time
        p.add_gtid(&("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_owned(), 9));
        p.add_gtid(&("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_owned(), 8));
        p.add_gtid(&("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_owned(), 7));
        assert_eq!(
            p.gtid_executed["aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"],
            vec![(1, 12)]
        );
    }

    #[test]
    fn add_gtid_ignores_already_seen_transaction() {
        let mut p = Position::new();
        p.add_gtid(&("bbbb".to_owned(), 5));
        p.add_gtid(&("bbbb".to_owned(), 5));
        assert_eq!(p.gtid_executed["bbbb"], vec![(5, 5)]);
    }

    #[test]
    fn add_gtid_inserts_new_interval_before_existing() {
        let mut p = Position::new();
        p.add_gtid(&("c".to_owned(), 10));
        p.add_gtid(&("c".to_owned(), 1));
        assert_eq!(p.gtid_executed["c"], vec![(1, 1), (10, 10)]);
    }

    #[test]
    fn s4_reached_other_pos_without_gtid() {
        let mut a = Position::new();
        a.log_name = "mysql-bin.000003".to_owned();
        a.log_pos = 500;
        let mut b = Position::new();
        b.log_name = "mysql-bin.000003".to_owned();
        b.log_pos = 400;
        assert!(a.reached_other_pos(&b).unwrap());
        assert!(!b.reached_other_pos(&a).unwrap());
    }

    #[test]
    fn reached_other_pos_gtid_vs_no_gtid() {
        let mut with_gtid = Position::new();
        with_gtid.parse_gtid("aaaa:1-5").unwrap();
        let without = Position::new();
        assert!(with_gtid.reached_other_pos(&without).unwrap());
        assert!(!without.reached_other_pos(&with_gtid).unwrap());
    }

    #[test]
    fn reached_other_pos_gtid_compares_per_source() {
        let mut a = Position::new();
        a.parse_gtid("aaaa:1-10,bbbb:1-5").unwrap();
        let mut b = Position::new();
        b.parse_gtid("aaaa:1-8").unwrap();
        assert!(a.reached_other_pos(&b).unwrap());
        assert!(!b.reached_other_pos(&a).unwrap());
    }

    #[test]
    fn reached_other_pos_missing_source_is_behind() {
        let mut a = Position::new();
        a.parse_gtid("aaaa:1-10").unwrap();
        let mut b = Position::new();
        b.parse_gtid("aaaa:1-5,cccc:1-1").unwrap();
        assert!(!a.reached_other_pos(&b).unwrap());
    }

    #[test]
    fn reached_other_pos_rejects_empty_interval_list() {
        let mut a = Position::new();
        a.gtid_executed.insert("aaaa".to_owned(), vec![]);
        let mut b = Position::new();
        b.gtid_executed.insert("aaaa".to_owned(), vec![(1, 1)]);
        assert!(a.reached_other_pos(&b).is_err());
    }

    #[test]
    fn encode_gtid_round_trips_size_and_layout() {
        let mut p = Position::new();
        p.parse_gtid("ae00751acb5f11e69d92e03f490fd3db:1-12:15-17").unwrap();
        let size = p.encoded_gtid_size();
        assert_eq!(size, 8 + 2 * 16 + 8 + ENCODED_SID_LENGTH);
        let mut buf = vec![0u8; size];
        p.encode_gtid(&mut buf);
        assert_eq!(LittleEndian::read_u64(&buf[0..8]), 1);
        assert_eq!(&buf[8..24], &hex_to_bin("ae00751acb5f11e69d92e03f490fd3db")[..]);
        assert_eq!(LittleEndian::read_u64(&buf[24..32]), 2);
        assert_eq!(LittleEndian::read_u64(&buf[32..40]), 1);
        assert_eq!(LittleEndian::read_u64(&buf[40..48]), 13);
        assert_eq!(LittleEndian::read_u64(&buf[48..56]), 15);
        assert_eq!(LittleEndian::read_u64(&buf[56..64]), 18);
    }

    #[test]
    fn encoded_gtid_size_zero_when_empty() {
        assert_eq!(Position::new().encoded_gtid_size(), 0);
    }
}
