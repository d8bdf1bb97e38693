//! Reading and writing `.desktop` entry files.
//!
//! The reader is lenient: anything that is not a `Key=Value` line is
//! skipped. The writer never emits a value that spans lines.

use crate::model::DesktopEntry;
use std::path::Path;

pub const HEADER: &str = "[Desktop Entry]";
pub const EXTENSION: &str = "desktop";

pub fn parse(content: &str) -> DesktopEntry {
    let mut entry = DesktopEntry::new();

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') { continue; }

        if let Some((key, value)) = line.split_once('=') {
            entry.set(key.trim(), value.trim());
        }
    }

    entry
}

pub fn serialize(entry: &DesktopEntry) -> String {
    let mut lines = Vec::with_capacity(entry.len() + 1);
    lines.push(HEADER.to_string());
    for (key, value) in entry.iter() {
        lines.push(format!("{}={}", key, single_line(value)));
    }
    lines.join("\n")
}

fn single_line(value: &str) -> String {
    if !value.contains(['\n', '\r']) {
        return value.to_string();
    }
    value
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First token of the first `Exec` line, without any field codes that
/// follow it. Later `Exec` lines belong to action groups and are ignored.
pub fn exec_program(content: &str) -> Option<String> {
    let value = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim() == "Exec")
        .map(|(_, value)| value)?;

    value.split_whitespace().next().map(str::to_string)
}

pub fn is_entry_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(EXTENSION)
}
