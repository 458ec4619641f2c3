//! Deciding whether two entries denote the same occurrence.
//!
//! Two entries match when their start times are less than an hour apart and
//! their titles are similar enough. Source metadata never takes part.

use crate::event::EventRecord;
use crate::store::{StoredEntry, StoredEvent};

/// Default title similarity an entry must exceed to count as a duplicate.
pub const DEFAULT_DEDUP_THRESHOLD: f64 = 0.85;

/// Start times must differ by strictly less than this to match.
pub const MATCH_WINDOW_SECS: i64 = 3600;

/// Whether `stored` is the same occurrence as `candidate`.
pub fn matches(candidate: &EventRecord, stored: &StoredEvent, threshold: f64) -> bool {
    let delta = (candidate.start() - stored.start.to_utc()).num_seconds().abs();
    delta < MATCH_WINDOW_SECS && ratio(candidate.title(), &stored.summary) > threshold
}

/// Every entry in `entries` that matches `candidate`.
pub fn find_matches<'a>(
    candidate: &EventRecord,
    entries: &'a [StoredEntry],
    threshold: f64,
) -> Vec<&'a StoredEntry> {
    entries
        .iter()
        .filter(|entry| matches(candidate, &entry.event, threshold))
        .collect()
}

/// Ratcliff/Obershelp similarity: `2 * M / (len(a) + len(b))`, where `M` is the
/// number of characters in the matching blocks found by repeatedly taking the
/// longest common substring and recursing on both sides of it.
///
/// Symmetric in practice, 1.0 for identical strings (including two empty ones)
/// and 0.0 for strings with no character in common.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }

    matched
}

/// Longest common substring of `a[alo..ahi]` and `b[blo..bhi]` as
/// `(start in a, start in b, length)`. Ties go to the earliest start in `a`,
/// then in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let width = bhi - blo + 1;
    // run[j - blo + 1] = length of the common suffix ending at (i, j)
    let mut prev = vec![0usize; width];
    let mut run = vec![0usize; width];

    for i in alo..ahi {
        for j in blo..bhi {
            let slot = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[slot - 1] + 1;
                run[slot] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            } else {
                run[slot] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut run);
    }

    best
}
