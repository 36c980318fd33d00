//! Numeric-aware ordering of instance identifiers.
//!
//! SOP Instance UIDs are dot separated integers, so plain string order would
//! send `...1.10` before `...1.2`. Runs of ASCII digits compare by value here.

use std::cmp::Ordering;
use std::fmt;

/// Compare two strings treating embedded digit runs as integers.
///
/// Ties in value (`"01"` vs `"1"`) fall back to plain string order so the
/// result agrees with `==`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ab, bb) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < ab.len() && j < bb.len() {
        if ab[i].is_ascii_digit() && bb[j].is_ascii_digit() {
            let (a_start, b_start) = (i, j);
            while i < ab.len() && ab[i].is_ascii_digit() {
                i += 1;
            }
            while j < bb.len() && bb[j].is_ascii_digit() {
                j += 1;
            }
            let ord = cmp_digit_runs(&ab[a_start..i], &bb[b_start..j]);
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            let ord = ab[i].cmp(&bb[j]);
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }

    (ab.len() - i)
        .cmp(&(bb.len() - j))
        .then_with(|| a.cmp(b))
}

fn cmp_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(run: &[u8]) -> &[u8] {
    let first = run.iter().position(|&d| d != b'0').unwrap_or(run.len());
    &run[first..]
}

/// Pending set key: an instance identifier ordered with [`natural_cmp`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for InstanceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0)
    }
}

impl PartialOrd for InstanceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceKey {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
