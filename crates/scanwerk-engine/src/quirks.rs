// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device quirk lists.
//
// Field experience with misbehaving hardware, kept as data. Each section
// holds case-insensitive product-name patterns (`*` and `?` wildcards); a
// source is matched against every section when it is opened.

use std::path::Path;

use scanwerk_core::error::{Result, ScanwerkError};

const EMBEDDED: &str = include_str!("resources/quirks.txt");

/// Quirk flags resolved for one opened source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceQuirks {
    /// Wait before the first transfer after UI enable; the device reports
    /// ready before it is.
    pub ready_delay: bool,
    /// No usable feeder despite advertising one.
    pub flatbed_only: bool,
    /// Pending-transfer count must be polled; the device never pushes
    /// readiness.
    pub needs_polling: bool,
    /// The device omits its end-of-transfer notification, so a UI disable
    /// mid-job forces the job to count as done.
    pub force_done: bool,
}

impl DeviceQuirks {
    pub fn any(&self) -> bool {
        self.ready_delay || self.flatbed_only || self.needs_polling || self.force_done
    }
}

/// The parsed quirk lists.
#[derive(Debug, Clone, Default)]
pub struct QuirkLists {
    ready_delay: Vec<String>,
    flatbed_only: Vec<String>,
    needs_polling: Vec<String>,
    force_done: Vec<String>,
}

impl QuirkLists {
    pub fn embedded() -> Self {
        Self::parse(EMBEDDED).unwrap_or_default()
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lists = Self::default();
        let mut section: Option<&mut Vec<String>> = None;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(match name {
                    "ready-delay" => &mut lists.ready_delay,
                    "flatbed-only" => &mut lists.flatbed_only,
                    "needs-polling" => &mut lists.needs_polling,
                    "force-done" => &mut lists.force_done,
                    other => {
                        return Err(ScanwerkError::Config(format!(
                            "quirks line {}: unknown section `{other}`",
                            lineno + 1
                        )));
                    }
                });
                continue;
            }
            match section.as_mut() {
                Some(list) => list.push(line.to_string()),
                None => {
                    return Err(ScanwerkError::Config(format!(
                        "quirks line {}: pattern outside any section",
                        lineno + 1
                    )));
                }
            }
        }
        Ok(lists)
    }

    /// Resolve the flags for one product name.
    pub fn for_product(&self, product_name: &str) -> DeviceQuirks {
        let matched = |patterns: &[String]| {
            patterns.iter().any(|p| wildcard_match(p, product_name))
        };
        DeviceQuirks {
            ready_delay: matched(&self.ready_delay),
            flatbed_only: matched(&self.flatbed_only),
            needs_polling: matched(&self.needs_polling),
            force_done: matched(&self.force_done),
        }
    }
}

/// Case-insensitive glob match: `*` spans any run, `?` one character.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
    let n: Vec<char> = name.chars().flat_map(char::to_lowercase).collect();
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ni;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("DocFeed *", "DocFeed 9000"));
        assert!(wildcard_match("docfeed 9000", "DocFeed 9000"));
        assert!(wildcard_match("DocFeed 9??0", "DocFeed 9310"));
        assert!(!wildcard_match("DocFeed 9??0", "DocFeed 931"));
        assert!(!wildcard_match("DocFeed", "DocFeed 9000"));
        assert!(wildcard_match("*9000", "DocFeed 9000"));
        assert!(wildcard_match("Doc*9*", "DocFeed 9000"));
    }

    #[test]
    fn sections_resolve_independently() {
        let lists = QuirkLists::parse(
            "[ready-delay]\nSlowScan *\n[force-done]\nSlowScan Mk?\n",
        )
        .expect("parse");
        let q = lists.for_product("SlowScan Mk2");
        assert!(q.ready_delay);
        assert!(q.force_done);
        assert!(!q.needs_polling);
        let q = lists.for_product("SlowScan Pro");
        assert!(q.ready_delay);
        assert!(!q.force_done);
    }

    #[test]
    fn unmatched_device_has_no_quirks() {
        let q = QuirkLists::embedded().for_product("StubScan 2000");
        assert!(!q.any());
    }

    #[test]
    fn unknown_section_rejected() {
        assert!(QuirkLists::parse("[frobnicate]\nX\n").is_err());
    }

    #[test]
    fn pattern_outside_section_rejected() {
        assert!(QuirkLists::parse("Orphan *\n").is_err());
    }
}
