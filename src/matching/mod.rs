////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Candidate backward-match enumeration.
//!
//! The selector is generic over anything that can propose matches for a
//! position; [`MatchFinder`] is that capability. The crate ships one
//! implementation, [`hash_chain::HashChainFinder`].

pub mod hash_chain;

use std::mem::size_of;

const USIZE_BYTES: usize = size_of::<usize>();

/// A candidate backward match: copy `length` bytes from `distance` back.
///
/// The length and an optional dictionary length code are packed into one
/// word: length in the high bits, code in the low 5. A zero code means the
/// code equals the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackwardMatch {
    /// Backward offset of the match. Offsets beyond the window limit are
    /// dictionary references.
    pub distance: u32,
    length_and_code: u32,
}

impl BackwardMatch {
    /// An in-window match whose length code equals its length.
    #[must_use]
    pub fn new(distance: usize, length: usize) -> Self {
        Self {
            distance: distance as u32,
            length_and_code: (length << 5) as u32,
        }
    }

    /// A dictionary match carrying a distinct length code.
    #[must_use]
    pub fn with_dictionary_code(distance: usize, length: usize, length_code: usize) -> Self {
        let code = if length == length_code { 0 } else { length_code };
        Self {
            distance: distance as u32,
            length_and_code: ((length << 5) | code) as u32,
        }
    }

    /// Number of bytes the match covers.
    #[inline]
    #[must_use]
    pub fn length(&self) -> usize {
        (self.length_and_code >> 5) as usize
    }

    /// Length code the copy is encoded with.
    #[inline]
    #[must_use]
    pub fn length_code(&self) -> usize {
        let code = (self.length_and_code & 31) as usize;
        if code == 0 {
            self.length()
        } else {
            code
        }
    }
}

/// Capability the selector consumes matches through.
///
/// `find_all` must report candidates in ascending order with strictly
/// increasing lengths, and non-decreasing distances among non-dictionary
/// candidates. Distances of zero and lengths past `max_length` are contract
/// violations; the selector refuses to emit commands when it sees one.
pub trait MatchFinder {
    /// Bytes of context the index digests per position.
    const HASH_TYPE_LENGTH: usize;
    /// Bytes of lookahead `store_range` needs beyond a stored position.
    const LOOKAHEAD: usize;

    /// Collect every candidate match at `position` into `out`, clearing it
    /// first, and index the position.
    fn find_all(
        &mut self,
        window: &[u8],
        ring_mask: usize,
        position: usize,
        max_length: usize,
        max_distance: usize,
        out: &mut Vec<BackwardMatch>,
    );

    /// Index `start..end` without searching, used to prime the finder over
    /// positions the optimizer skips.
    fn store_range(&mut self, window: &[u8], ring_mask: usize, start: usize, end: usize);
}

#[inline(always)]
fn compare_block(src: [u8; USIZE_BYTES], cmp: [u8; USIZE_BYTES]) -> Option<usize> {
    let src_int = usize::from_ne_bytes(src);
    let cmp_int = usize::from_ne_bytes(cmp);

    let xor = src_int ^ cmp_int;

    if xor == 0 {
        None
    } else {
        Some((xor.to_le().trailing_zeros() / 8) as usize)
    }
}

/// Length of the common prefix of `a` and `b`, capped at `limit`.
#[inline]
#[must_use]
pub fn find_match_length(a: &[u8], b: &[u8], limit: usize) -> usize {
    let limit = limit.min(a.len()).min(b.len());
    let mut matched = 0;

    let a_chunks = a[..limit].chunks_exact(USIZE_BYTES);
    let b_chunks = b[..limit].chunks_exact(USIZE_BYTES);
    for (x, y) in a_chunks.zip(b_chunks) {
        if let Some(found) = compare_block(x.try_into().unwrap(), y.try_into().unwrap()) {
            return matched + found;
        }
        matched += USIZE_BYTES;
    }

    a[matched..limit]
        .iter()
        .zip(b[matched..limit].iter())
        .take_while(|(x, y)| x == y)
        .count()
        + matched
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    #[test]
    fn match_length_stops_at_first_difference() {
        assert_eq!(find_match_length(b"abcdefgh", b"abcdefgh", 8), 8);
        assert_eq!(find_match_length(b"abcdefgh", b"abcdefgX", 8), 7);
        assert_eq!(find_match_length(b"abcdefgh", b"Xbcdefgh", 8), 0);
        assert_eq!(find_match_length(b"abcdefghijklmnop", b"abcdefghijklmnoX", 16), 15);
        assert_eq!(find_match_length(b"abcdefgh", b"abcdefgh", 3), 3);
    }

    #[proptest]
    fn match_length_agrees_with_naive_scan(
        #[strategy(proptest::collection::vec(0..=3u8, 0..200))] a: Vec<u8>,
        #[strategy(proptest::collection::vec(0..=3u8, 0..200))] b: Vec<u8>,
        #[strategy(0usize..256)] limit: usize,
    ) {
        let expected = a
            .iter()
            .zip(b.iter())
            .take(limit)
            .take_while(|(x, y)| x == y)
            .count();
        prop_assert_eq!(find_match_length(&a, &b, limit), expected);
    }

    #[test]
    fn dictionary_matches_keep_their_length_code() {
        let plain = BackwardMatch::new(100, 12);
        assert_eq!(plain.length(), 12);
        assert_eq!(plain.length_code(), 12);

        let dict = BackwardMatch::with_dictionary_code(1 << 20, 12, 10);
        assert_eq!(dict.length(), 12);
        assert_eq!(dict.length_code(), 10);

        let same = BackwardMatch::with_dictionary_code(1 << 20, 12, 12);
        assert_eq!(same.length_code(), 12);
    }
}
