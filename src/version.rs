//! Dotted version comparison.
//!
//! Total over arbitrary input: malformed segments count as zero and nothing
//! panics.

use std::cmp::Ordering;

/// Strip surrounding whitespace and one leading `v`/`V`.
pub fn clean_version(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Leading-digit value of one segment; saturates instead of wrapping.
fn parse_segment(segment: &str) -> u64 {
    let mut value: u64 = 0;
    for b in segment.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        match value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
        {
            Some(next) => value = next,
            None => break,
        }
    }
    value
}

/// Numeric segments of a version string.
pub fn parse_version_parts(version: &str) -> Vec<u64> {
    clean_version(version).split('.').map(parse_segment).collect()
}

/// Compare two version strings segment by segment.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = parse_version_parts(a);
    let b = parse_version_parts(b);
    let len = a.len().max(b.len());

    for i in 0..len {
        let left = a.get(i).copied().unwrap_or(0);
        let right = b.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// `true` when `latest` is strictly newer than `current`.
pub fn is_newer(latest: &str, current: &str) -> bool {
    compare_versions(latest, current) == Ordering::Greater
}
