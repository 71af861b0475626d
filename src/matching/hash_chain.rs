////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

use std::convert::TryInto;

use crate::matching::{find_match_length, BackwardMatch, MatchFinder};

const HASH_BITS: u32 = 17;
const HASH_MUL: u32 = 0x1e35_a7bd;

// a chain walk past this many links stops paying for itself
const MAX_CHAIN_STEPS: usize = 64;

// two-byte repeats this close are worth probing even though the hash index
// cannot see them
const SHORT_SCAN_DISTANCE: usize = 64;

/// Hash-chain match finder over four-byte prefixes.
///
/// Every indexed position is linked to the previous position with the same
/// prefix hash. Searching walks the chain nearest-first and reports a
/// candidate only when it is strictly longer than everything reported before
/// it, so the output naturally satisfies the [`MatchFinder`] ordering
/// contract. A separate close-range scan catches two-byte repeats the
/// four-byte hash is blind to.
pub struct HashChainFinder {
    head: Vec<u32>,
    prev: Vec<u32>,
}

impl HashChainFinder {
    /// Create a finder for a window of `bytes` bytes.
    #[must_use]
    pub fn new(bytes: usize) -> Self {
        Self {
            head: vec![u32::MAX; 1 << HASH_BITS],
            prev: vec![u32::MAX; bytes.max(1)],
        }
    }

    #[inline(always)]
    fn hash(window: &[u8], index: usize) -> usize {
        let word = u32::from_le_bytes(window[index..index + 4].try_into().unwrap());
        (word.wrapping_mul(HASH_MUL) >> (32 - HASH_BITS)) as usize
    }

    /// Index `position`, returning the previous position with the same hash.
    fn insert(&mut self, window: &[u8], ring_mask: usize, position: usize) -> u32 {
        let masked = position & ring_mask;
        if masked + Self::HASH_TYPE_LENGTH > window.len() {
            return u32::MAX;
        }
        let slot = Self::hash(window, masked);
        let head = self.head[slot];
        self.prev[masked] = head;
        self.head[slot] = position as u32;
        head
    }
}

impl MatchFinder for HashChainFinder {
    const HASH_TYPE_LENGTH: usize = 4;
    const LOOKAHEAD: usize = 4;

    fn find_all(
        &mut self,
        window: &[u8],
        ring_mask: usize,
        position: usize,
        max_length: usize,
        max_distance: usize,
        out: &mut Vec<BackwardMatch>,
    ) {
        out.clear();
        let cur = position & ring_mask;
        let mut best_len = 1usize;

        let mut backward = 1usize;
        while backward <= SHORT_SCAN_DISTANCE && backward <= position && best_len <= 2 {
            if backward > max_distance {
                break;
            }
            let prev = (position - backward) & ring_mask;
            if cur + 1 < window.len()
                && prev + 1 < window.len()
                && window[cur] == window[prev]
                && window[cur + 1] == window[prev + 1]
            {
                let len = find_match_length(&window[prev..], &window[cur..], max_length);
                if len > best_len {
                    best_len = len;
                    out.push(BackwardMatch::new(backward, len));
                }
            }
            backward += 1;
        }

        let mut candidate = self.insert(window, ring_mask, position);
        if best_len >= max_length {
            return;
        }
        let mut steps = 0;
        while candidate != u32::MAX && steps < MAX_CHAIN_STEPS {
            if candidate as usize >= position {
                break;
            }
            let backward = position - candidate as usize;
            if backward > max_distance {
                break;
            }
            let prev = candidate as usize & ring_mask;
            steps += 1;
            let next = if prev < self.prev.len() {
                self.prev[prev]
            } else {
                u32::MAX
            };
            // a longer match must extend past best_len, so the byte there is
            // a cheap reject before the full comparison
            if cur + best_len >= window.len() {
                break;
            }
            if prev + best_len < window.len() && window[cur + best_len] == window[prev + best_len] {
                let len = find_match_length(&window[prev..], &window[cur..], max_length);
                // lengths below the hash width are collisions, not matches
                if len >= Self::HASH_TYPE_LENGTH && len > best_len {
                    best_len = len;
                    out.push(BackwardMatch::new(backward, len));
                    if len == max_length {
                        break;
                    }
                }
            }
            candidate = next;
        }
    }

    fn store_range(&mut self, window: &[u8], ring_mask: usize, start: usize, end: usize) {
        for position in start..end {
            let _ = self.insert(window, ring_mask, position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_matches(input: &[u8], position: usize) -> Vec<BackwardMatch> {
        let mask = input.len().next_power_of_two() - 1;
        let mut finder = HashChainFinder::new(input.len());
        let mut out = Vec::new();
        for pos in 0..position {
            finder.find_all(input, mask, pos, input.len() - pos, pos, &mut out);
        }
        finder.find_all(
            input,
            mask,
            position,
            input.len() - position,
            position,
            &mut out,
        );
        out
    }

    #[test]
    fn finds_the_repeated_prefix() {
        let matches = all_matches(b"abcdXXXXabcdYY", 8);
        assert!(matches.iter().any(|m| m.distance == 8 && m.length() == 4));
    }

    #[test]
    fn close_range_scan_sees_two_byte_periods() {
        let matches = all_matches(b"ababab", 2);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].distance, 2);
        assert_eq!(matches[0].length(), 4);
    }

    #[test]
    fn reported_lengths_strictly_increase_and_distances_never_shrink() {
        let input = b"the cat sat on the mat and the cat sat still".to_vec();
        for position in 1..input.len() - 4 {
            let matches = all_matches(&input, position);
            for pair in matches.windows(2) {
                assert!(pair[0].length() < pair[1].length());
                assert!(pair[0].distance <= pair[1].distance);
            }
            for m in &matches {
                assert!(m.distance as usize <= position);
                assert!(m.length() <= input.len() - position);
                let start = position - m.distance as usize;
                assert_eq!(
                    input[start..start + m.length()],
                    input[position..position + m.length()]
                );
            }
        }
    }

    #[test]
    fn store_range_primes_skipped_positions() {
        let mut input = vec![b'q'; 40];
        input.extend_from_slice(b"unique-tail-12345");
        let mask = input.len().next_power_of_two() - 1;
        let mut finder = HashChainFinder::new(input.len());
        let mut out = Vec::new();
        finder.find_all(&input, mask, 0, input.len(), 0, &mut out);
        // pretend the optimizer skipped the run of 'q'
        finder.store_range(&input, mask, 1, 40);
        finder.find_all(&input, mask, 40 - 4, input.len() - 36, 36, &mut out);
        assert!(out.iter().any(|m| m.length() >= 4));
    }
}
