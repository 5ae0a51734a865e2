//! Hamming-ball neighbor search over stored hashes.

use std::collections::BTreeSet;

use super::HashStore;
use crate::error::{Error, Result};
use crate::model::HashRecord;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

const fn one_bit_neighbors() -> [[u8; 4]; 16] {
    let mut table = [[0u8; 4]; 16];
    let mut digit = 0;
    while digit < 16 {
        let mut bit = 0;
        while bit < 4 {
            table[digit][bit] = HEX_DIGITS[digit ^ (1 << bit)];
            bit += 1;
        }
        digit += 1;
    }
    table
}

/// For each hex digit, the four digits that differ from it in exactly one bit.
pub const HEX_NEIGHBORS: [[u8; 4]; 16] = one_bit_neighbors();

fn digit_index(digit: u8) -> Option<usize> {
    match digit {
        b'0'..=b'9' => Some((digit - b'0') as usize),
        b'a'..=b'f' => Some((digit - b'a' + 10) as usize),
        _ => None,
    }
}

fn validate(nibbles: &str) -> Result<()> {
    if nibbles.is_empty() || nibbles.bytes().any(|b| digit_index(b).is_none()) {
        return Err(Error::InvalidNibbles(nibbles.to_string()));
    }
    Ok(())
}

/// Digests one bit-flip away from any digest in `frontier`, minus `visited`.
fn expand(frontier: &BTreeSet<String>, visited: &BTreeSet<String>) -> BTreeSet<String> {
    let mut next = BTreeSet::new();
    for nibbles in frontier {
        let bytes = nibbles.as_bytes();
        for (i, &digit) in bytes.iter().enumerate() {
            let Some(index) = digit_index(digit) else {
                continue;
            };
            for &replacement in &HEX_NEIGHBORS[index] {
                let mut candidate = bytes.to_vec();
                candidate[i] = replacement;
                let candidate = String::from_utf8(candidate).unwrap_or_default();
                if !visited.contains(&candidate) {
                    next.insert(candidate);
                }
            }
        }
    }
    next
}

/// Breadth-first levels of the Hamming ball: level `k` holds the digests
/// exactly `k` bits away from `start`.
pub struct BallLevels {
    visited: BTreeSet<String>,
    frontier: BTreeSet<String>,
    remaining: usize,
}

impl BallLevels {
    pub fn new(start: &str, max_distance: usize) -> Result<Self> {
        validate(start)?;
        Ok(Self {
            visited: BTreeSet::new(),
            frontier: BTreeSet::from([start.to_string()]),
            // No digest is further away than its bit count.
            remaining: max_distance.min(start.len() * 4) + 1,
        })
    }
}

impl Iterator for BallLevels {
    type Item = BTreeSet<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.frontier.is_empty() {
            return None;
        }
        self.remaining -= 1;
        self.visited.extend(self.frontier.iter().cloned());
        let next = if self.remaining > 0 {
            expand(&self.frontier, &self.visited)
        } else {
            BTreeSet::new()
        };
        Some(std::mem::replace(&mut self.frontier, next))
    }
}

/// Every digest within `max_distance` bits of `start`.
pub fn hamming_ball(start: &str, max_distance: usize) -> Result<BTreeSet<String>> {
    Ok(BallLevels::new(start, max_distance)?.flatten().collect())
}

/// Stored hashes of `method` within `max_distance` bits of `nibbles`,
/// resolved with one store lookup per ball level.
pub fn neighbors<S: HashStore + ?Sized>(
    store: &S,
    method: &str,
    nibbles: &str,
    max_distance: usize,
) -> Result<Vec<HashRecord>> {
    let mut found = Vec::new();
    for level in BallLevels::new(nibbles, max_distance)? {
        let level: Vec<String> = level.into_iter().collect();
        found.extend(store.find_hashes(method, &level)?);
    }
    Ok(found)
}

/// Assets owning a `method` hash near any `method` hash of `asset_id`,
/// excluding the asset itself.
pub fn similar_by_content<S: HashStore + ?Sized>(
    store: &S,
    asset_id: i64,
    method: &str,
    max_distance: usize,
) -> Result<BTreeSet<i64>> {
    let mut owners = BTreeSet::new();
    for hash in store.hashes_for_asset(asset_id)? {
        if hash.method != method {
            continue;
        }
        for neighbor in neighbors(store, method, &hash.nibbles, max_distance)? {
            owners.insert(neighbor.asset_id);
        }
    }
    owners.remove(&asset_id);
    Ok(owners)
}
