//! Parser for `ls -l` / `ls -lR --time-style=full-iso` output.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{Listing, RemoteEntry};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Decode raw listing bytes, trying utf-8-sig, utf-8, gbk, gb18030 and
/// finally latin-1 (which accepts any byte sequence); first success wins.
///
/// encoding_rs folds the gb2312 label into its gbk decoder, so the fourth
/// attempt broadens to gb18030 rather than retrying literal gb2312.
pub fn decode_listing(bytes: &[u8]) -> String {
    if let Some(stripped) = bytes.strip_prefix(&UTF8_BOM) {
        if let Ok(s) = std::str::from_utf8(stripped) {
            return s.to_string();
        }
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    for encoding in [encoding_rs::GBK, encoding_rs::GB18030] {
        let (decoded, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return decoded.into_owned();
        }
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Parse listing text into file entries.
///
/// Handles flat `ls -l` output and recursive `ls -lR` output (directory
/// header lines ending in `:` set the prefix for subsequent entries).
/// Non-regular-file lines (directories, links, `total` counters) are
/// ignored; lines that look like file entries but fail to parse are counted
/// as malformed.
pub fn parse_listing(text: &str) -> Listing {
    let mut entries = Vec::new();
    let mut malformed = 0usize;
    let mut current_dir = String::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("total ") || line == "total" {
            continue;
        }
        if line.starts_with('-') {
            match parse_entry(line) {
                Some(mut entry) => {
                    if !current_dir.is_empty() {
                        entry.path = format!("{current_dir}/{}", entry.path);
                    }
                    entries.push(entry);
                }
                None => {
                    malformed += 1;
                    tracing::warn!(line, "skipping malformed listing line");
                }
            }
            continue;
        }
        if let Some(dir) = line.strip_suffix(':') {
            current_dir = normalize_dir(dir);
        }
        // Directories, links, devices: not artifacts, skipped silently.
    }

    Listing { entries, malformed }
}

fn normalize_dir(dir: &str) -> String {
    let dir = dir.strip_prefix("./").unwrap_or(dir);
    if dir == "." {
        String::new()
    } else {
        dir.to_string()
    }
}

/// One regular-file line: `mode links owner group size date time [tz] name`.
fn parse_entry(line: &str) -> Option<RemoteEntry> {
    // full-iso carries a timezone column between time and name
    if let Some((fields, name)) = split_fields(line, 8) {
        if !name.is_empty() && (fields[7].starts_with('+') || fields[7].starts_with('-')) {
            if let Ok(size) = fields[4].parse::<i64>() {
                let stamp = format!("{} {} {}", fields[5], fields[6], fields[7]);
                if let Some(mtime) = parse_zoned(&stamp) {
                    return Some(RemoteEntry {
                        path: strip_dot_slash(name),
                        size,
                        mtime: Some(mtime),
                    });
                }
            }
        }
    }

    // older listings: no timezone column, seconds optional
    let (fields, name) = split_fields(line, 7)?;
    if name.is_empty() {
        return None;
    }
    let size = fields[4].parse::<i64>().ok()?;
    let stamp = format!("{} {}", fields[5], fields[6]);
    let mtime = parse_naive(&stamp)?;
    Some(RemoteEntry {
        path: strip_dot_slash(name),
        size,
        mtime: Some(mtime),
    })
}

fn strip_dot_slash(name: &str) -> String {
    name.strip_prefix("./").unwrap_or(name).to_string()
}

/// First `n` whitespace-separated fields, plus the remainder of the line.
/// The remainder keeps embedded whitespace so file names survive intact.
fn split_fields(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(n);
    let mut rest = line;
    for _ in 0..n {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = &rest[end..];
    }
    Some((fields, rest.trim_start()))
}

fn parse_zoned(stamp: &str) -> Option<DateTime<Utc>> {
    for format in ["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%d %H:%M %z"] {
        if let Ok(dt) = DateTime::parse_from_str(stamp, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    None
}

fn parse_naive(stamp: &str) -> Option<DateTime<Utc>> {
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(stamp, format) {
            return Some(dt.and_utc());
        }
    }
    None
}
