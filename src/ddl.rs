//! DDL recognition against a `QUERY_EVENT`'s statement text, grounded on
//! spec §4.4's four-regex precedence order (itself derived from
//! `original_source/Slave.cpp`'s schema-rebuild triggers).

use regex::Regex;

use crate::table_key::TableKey;

/// What a DDL statement means for the replicated schema: either one table's
/// schema needs a rebuild, or a table was renamed (old key's entry should be
/// dropped/rekeyed to the new one — up to the caller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlEffect {
    Rename(Vec<(TableKey, TableKey)>),
    Rebuild(TableKey),
}

struct Patterns {
    alter_rename: Regex,
    rename_table: Regex,
    create_table: Regex,
    alter_table: Regex,
}

impl Patterns {
    fn new() -> Self {
        Patterns {
            alter_rename: Regex::new(
                r"(?is)^\s*ALTER\s+TABLE\s+(?:`?(?P<db>[\w$]+)`?\.)?`?(?P<tbl>[\w$]+)`?\s+RENAME\s+(?:TO|AS)\s+(?:`?(?P<ndb>[\w$]+)`?\.)?`?(?P<ntbl>[\w$]+)`?",
            )
            .unwrap(),
            rename_table: Regex::new(r"(?is)^\s*RENAME\s+TABLE\s+(?P<list>.+)$").unwrap(),
            create_table: Regex::new(
                r"(?is)^\s*CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:`?(?P<db>[\w$]+)`?\.)?`?(?P<tbl>[\w$]+)`?",
            )
            .unwrap(),
            alter_table: Regex::new(
                r"(?is)^\s*ALTER\s+TABLE\s+(?:`?(?P<db>[\w$]+)`?\.)?`?(?P<tbl>[\w$]+)`?",
            )
            .unwrap(),
            }
    }

    fn rename_pair() -> Regex {
        Regex::new(
            r"(?is)^\s*(?:`?(?P<db>[\w$]+)`?\.)?`?(?P<tbl>[\w$]+)`?\s+TO\s+(?:`?(?P<ndb>[\w$]+)`?\.)?`?(?P<ntbl>[\w$]+)`?\s*$",
        )
        .unwrap()
    }
}

/// Strip `/* ... */` comments and collapse newlines to spaces, per §4.4.
fn normalize(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            while let Some(c2) = chars.next() {
                if c2 == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    break;
                }
            }
            continue;
        }
        out.push(if c == '\n' || c == '\r' { ' ' } else { c });
    }
    out
}

/// Classify a DDL statement, defaulting missing database names to
/// `default_db`. Returns `None` if the statement isn't recognized DDL.
pub fn classify(query: &str, default_db: &str) -> Option<DdlEffect> {
    let patterns = Patterns::new();
    let normalized = normalize(query);
    let trimmed = normalized.trim();

    if let Some(caps) = patterns.alter_rename.captures(trimmed) {
        let db = caps.name("db").map(|m| m.as_str()).unwrap_or(default_db);
        let tbl = &caps["tbl"];
        let ndb = caps.name("ndb").map(|m| m.as_str()).unwrap_or(default_db);
        let ntbl = &caps["ntbl"];
        return Some(DdlEffect::Rename(vec![(
            TableKey::new(db, tbl),
            TableKey::new(ndb, ntbl),
        )]));
    }

    if let Some(caps) = patterns.rename_table.captures(trimmed) {
        let list = &caps["list"];
        let mut pairs = Vec::new();
        for item in list.split(',') {
            let item = item.trim();
            if let Some(caps) = Patterns::rename_pair().captures(item) {
                let db = caps.name("db").map(|m| m.as_str()).unwrap_or(default_db);
                let tbl = &caps["tbl"];
                let ndb = caps.name("ndb").map(|m| m.as_str()).unwrap_or(default_db);
                let ntbl = &caps["ntbl"];
                pairs.push((TableKey::new(db, tbl), TableKey::new(ndb, ntbl)));
            }
        }
        if !pairs.is_empty() {
            return Some(DdlEffect::Rename(pairs));
        }
    }

    if let Some(caps) = patterns.create_table.captures(trimmed) {
        let db = caps.name("db").map(|m| m.as_str()).unwrap_or(default_db);
        let tbl = &caps["tbl"];
        return Some(DdlEffect::Rebuild(TableKey::new(db, tbl)));
    }

    if let Some(caps) = patterns.alter_table.captures(trimmed) {
        let db = caps.name("db").map(|m| m.as_str()).unwrap_or(default_db);
        let tbl = &caps["tbl"];
        return Some(DdlEffect::Rebuild(TableKey::new(db, tbl)));
    }

    None
}
