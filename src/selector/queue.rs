////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

const QUEUE_CAPACITY: usize = 8;

/// A candidate command start: a position, the distance cache as it stands on
/// the best path to it, and how much cheaper that path is than encoding the
/// same prefix as pure literals.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PosData {
    pub pos: usize,
    pub distance_cache: [i32; 4],
    pub cost_diff: f32,
}

impl Default for PosData {
    fn default() -> Self {
        Self {
            pos: 0,
            distance_cache: [0; 4],
            cost_diff: 0.0,
        }
    }
}

/// The eight cheapest recent start positions, kept sorted by `cost_diff`.
///
/// Backed by a tiny ring: logical index `idx` maps to physical slot
/// `!idx & 7` at push, so the newest entry lands where the oldest is about to
/// be evicted and a handful of adjacent swaps restores the order.
pub(crate) struct StartPosQueue {
    q: [PosData; QUEUE_CAPACITY],
    idx: usize,
}

impl StartPosQueue {
    pub fn new() -> Self {
        Self {
            q: [PosData::default(); QUEUE_CAPACITY],
            idx: 0,
        }
    }

    /// Forget every queued start. The optimizer does this after skipping a
    /// very long match, which breaks the locality the queue relies on.
    pub fn clear(&mut self) {
        self.idx = 0;
    }

    pub fn len(&self) -> usize {
        self.idx.min(QUEUE_CAPACITY)
    }

    pub fn is_empty(&self) -> bool {
        self.idx == 0
    }

    pub fn push(&mut self, posdata: PosData) {
        let mut offset = !self.idx & 7;
        self.idx += 1;
        let len = self.len();
        self.q[offset] = posdata;
        for _ in 1..len {
            if self.q[offset & 7].cost_diff > self.q[(offset + 1) & 7].cost_diff {
                self.q.swap(offset & 7, (offset + 1) & 7);
            }
            offset += 1;
        }
    }

    /// The `k`-th cheapest queued start; `k` must be below `len()`.
    pub fn at(&self, k: usize) -> &PosData {
        &self.q[k.wrapping_sub(self.idx) & 7]
    }
}
