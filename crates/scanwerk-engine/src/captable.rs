// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The well-known capability table.
//
// A static lookup, not a device contract: discovery seeds a source's cache
// from these rows without touching the device, and actual support is only
// confirmed (or denied) by a later query-support probe. Ids absent from the
// table are treated as vendor/custom and get a best-effort minimal row.
//
// Line format, pipe-separated:
//
//   0x0001|XferCount|i16|one_value,range|get,get_current,get_default,set,reset,query
//
// Blank lines and `#` comments are skipped.

use std::collections::HashMap;
use std::path::Path;

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{CapId, ContainerKinds, ItemType, OpFlags};

/// Built-in table compiled into the engine.
const EMBEDDED: &str = include_str!("resources/captable.txt");

/// One row of the table.
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub id: CapId,
    pub name: String,
    pub item_type: ItemType,
    pub containers: ContainerKinds,
    pub ops: OpFlags,
}

/// Parsed capability table, keyed by capability id.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    entries: HashMap<u16, TableEntry>,
}

impl CapabilityTable {
    /// The compiled-in default table.
    pub fn embedded() -> Self {
        // The embedded table is validated by tests; a parse failure here is
        // a build defect, so fall back to an empty table rather than panic.
        Self::parse(EMBEDDED).unwrap_or(Self {
            entries: HashMap::new(),
        })
    }

    /// Load an override table from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = parse_line(line).map_err(|detail| {
                ScanwerkError::Config(format!("captable line {}: {detail}", lineno + 1))
            })?;
            entries.insert(entry.id.0, entry);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, id: CapId) -> Option<&TableEntry> {
        self.entries.get(&id.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str) -> std::result::Result<TableEntry, String> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    let [id, name, item_type, containers, ops] = fields[..] else {
        return Err(format!("expected 5 fields, got {}", fields.len()));
    };

    let raw = id.strip_prefix("0x").ok_or("id must be 0x-prefixed hex")?;
    let id = u16::from_str_radix(raw, 16).map_err(|e| format!("bad id: {e}"))?;

    Ok(TableEntry {
        id: CapId(id),
        name: name.to_string(),
        item_type: parse_item_type(item_type)?,
        containers: parse_containers(containers)?,
        ops: parse_ops(ops)?,
    })
}

fn parse_item_type(s: &str) -> std::result::Result<ItemType, String> {
    Ok(match s {
        "i8" => ItemType::I8,
        "i16" => ItemType::I16,
        "i32" => ItemType::I32,
        "u8" => ItemType::U8,
        "u16" => ItemType::U16,
        "u32" => ItemType::U32,
        "bool" => ItemType::Bool,
        "fix32" => ItemType::Fix32,
        "frame" => ItemType::Frame,
        "str32" => ItemType::Str32,
        "str64" => ItemType::Str64,
        "str128" => ItemType::Str128,
        "str255" => ItemType::Str255,
        other => return Err(format!("unknown item type `{other}`")),
    })
}

fn parse_containers(s: &str) -> std::result::Result<ContainerKinds, String> {
    let mut mask = 0u8;
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        mask |= match part {
            "one_value" => ContainerKinds::ONE_VALUE,
            "array" => ContainerKinds::ARRAY,
            "enumeration" => ContainerKinds::ENUMERATION,
            "range" => ContainerKinds::RANGE,
            other => return Err(format!("unknown container `{other}`")),
        };
    }
    Ok(ContainerKinds(mask))
}

fn parse_ops(s: &str) -> std::result::Result<OpFlags, String> {
    let mut mask = 0u16;
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        mask |= match part {
            "get" => OpFlags::GET,
            "set" => OpFlags::SET,
            "get_default" => OpFlags::GET_DEFAULT,
            "get_current" => OpFlags::GET_CURRENT,
            "reset" => OpFlags::RESET,
            "set_constraint" => OpFlags::SET_CONSTRAINT,
            "query" => OpFlags::QUERY_SUPPORT,
            other => return Err(format!("unknown operation `{other}`")),
        };
    }
    Ok(OpFlags(mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_table_parses() {
        let table = CapabilityTable::parse(EMBEDDED).expect("embedded table must parse");
        assert!(table.len() >= 14);
        let entry = table.get(CapId::XFER_COUNT).expect("xfer count present");
        assert_eq!(entry.name, "XferCount");
        assert!(entry.ops.contains(OpFlags::SET));
    }

    #[test]
    fn read_only_rows_exclude_set() {
        let table = CapabilityTable::embedded();
        let entry = table.get(CapId::PAPER_DETECTABLE).expect("present");
        assert!(entry.ops.contains(OpFlags::GET));
        assert!(!entry.ops.contains(OpFlags::SET));
    }

    #[test]
    fn comments_and_blanks_skipped() {
        let table = CapabilityTable::parse(
            "# heading\n\n0x0001|XferCount|i16|one_value|get,set\n",
        )
        .expect("parse");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let err = CapabilityTable::parse("0x0001|TooFewFields|i16\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn unknown_item_type_rejected() {
        assert!(CapabilityTable::parse("0x0001|X|f64|one_value|get\n").is_err());
    }
}
