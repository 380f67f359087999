//! Ordering for free-form version strings
//!
//! Registry version numbers are not guaranteed to be semver. Each string is
//! tokenized into alternating digit and letter runs; digit runs compare
//! numerically, letter runs compare case-insensitively as text, and a numeric
//! segment sorts below a textual one at the same position. Separators are
//! dropped. The empty string tokenizes to the empty sequence, which sorts
//! below everything non-empty.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    // Variant order matters: numeric sorts below text at equal positions.
    Num(u64),
    Text(String),
}

fn tokenize(version: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut chars = version.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut run = String::new();
            while let Some(&d) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                run.push(d);
                chars.next();
            }
            // Very long digit runs saturate rather than fail.
            let value = run.parse::<u64>().unwrap_or(u64::MAX);
            segments.push(Segment::Num(value));
        } else if c.is_alphabetic() {
            let mut run = String::new();
            while let Some(&l) = chars.peek() {
                if !l.is_alphabetic() {
                    break;
                }
                run.push(l.to_ascii_lowercase());
                chars.next();
            }
            segments.push(Segment::Text(run));
        } else {
            chars.next();
        }
    }

    segments
}

/// Whether `candidate` represents a strictly newer version than `baseline`.
///
/// Equal sequences are not newer; an exhausted sequence sorts below a longer
/// one sharing its prefix.
pub fn is_newer(candidate: &str, baseline: &str) -> bool {
    tokenize(candidate).cmp(&tokenize(baseline)) == Ordering::Greater
}
