////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

use crate::command::{
    combine_length_codes, copy_extra_bits, copy_length_code, encode_copy_distance,
    insert_extra_bits, insert_length_code, NUM_SHORT_CODES, SHORT_CODE_CACHE_INDEX,
    SHORT_CODE_CACHE_OFFSET,
};
use crate::matching::{find_match_length, BackwardMatch};
use crate::selector::cost_model::CostModel;
use crate::selector::node::{update_node, ZopfliNode};
use crate::selector::queue::{PosData, StartPosQueue};

/// Immutable context for one shortest-path pass over a block.
pub(crate) struct BlockSearch<'a> {
    pub window: &'a [u8],
    pub ring_mask: usize,
    /// Absolute stream position the block starts at.
    pub block_start: usize,
    pub num_bytes: usize,
    pub max_backward: usize,
    /// Matches longer than this are taken atomically.
    pub max_zopfli_len: usize,
    /// How many of the cheapest queued starts each position explores.
    pub max_iters: usize,
    /// Distance cache as it stood when the block started.
    pub starting_dist_cache: [i32; 4],
}

/// Rebuild the four most recent qualifying distances along the best path to
/// `pos`, padding from the block's starting cache.
///
/// A distance qualifies unless it is a dictionary reference (it reaches past
/// the data that existed before its own copy), lies beyond the window limit,
/// or was itself an exact reuse of the previous distance.
fn compute_distance_cache(
    block_start: usize,
    pos: usize,
    max_backward: usize,
    starting_dist_cache: &[i32; 4],
    nodes: &[ZopfliNode],
    dist_cache: &mut [i32; 4],
) {
    let mut idx = 0;
    let mut p = pos;
    // every step back shrinks p by at least one, by the node array invariant
    while idx < 4 && p > 0 {
        let node = &nodes[p];
        let clen = node.copy_length() as usize;
        let ilen = node.insert_length() as usize;
        let dist = node.copy_distance() as usize;
        if dist + clen <= block_start + p && dist <= max_backward && node.distance_code() > 0 {
            dist_cache[idx] = dist as i32;
            idx += 1;
        }
        p -= clen + ilen;
    }
    for (slot, &start) in dist_cache[idx..].iter_mut().zip(starting_dist_cache) {
        *slot = start;
    }
}

/// Smallest copy length that could still improve any future node.
///
/// Walks forward while already-reached nodes are at least as cheap as the
/// cheapest conceivable arrival from the queue, bumping the bound by one bit
/// at every copy-length-code bucket boundary.
fn compute_minimum_copy_length(
    queue: &StartPosQueue,
    nodes: &[ZopfliNode],
    model: &CostModel,
    num_bytes: usize,
    pos: usize,
) -> usize {
    let start0 = queue.at(0).pos;
    let mut min_cost =
        nodes[start0].cost + model.literal_costs(start0, pos) + model.min_command_cost();
    let mut len = 2usize;
    let mut next_len_bucket = 4usize;
    let mut next_len_offset = 10usize;
    while pos + len <= num_bytes && nodes[pos + len].cost <= min_cost {
        len += 1;
        if len == next_len_offset {
            min_cost += 1.0;
            next_len_offset += next_len_bucket;
            next_len_bucket *= 2;
        }
    }
    len
}

impl BlockSearch<'_> {
    /// Relax every arrival reachable from `pos`: admit `pos` as a start
    /// position if its path beats pure literals, then try the sixteen
    /// cache-relative distances from each of the cheapest queued starts, and
    /// the externally found matches from the two cheapest.
    pub fn update_nodes(
        &self,
        pos: usize,
        matches: &[BackwardMatch],
        model: &CostModel,
        queue: &mut StartPosQueue,
        nodes: &mut [ZopfliNode],
    ) {
        let cur_ix = self.block_start + pos;
        let cur_masked = cur_ix & self.ring_mask;
        let max_distance = cur_ix.min(self.max_backward);
        let max_len = self.num_bytes - pos;

        if nodes[pos].cost <= model.literal_costs(0, pos) {
            let mut posdata = PosData {
                pos,
                distance_cache: [0; 4],
                cost_diff: nodes[pos].cost - model.literal_costs(0, pos),
            };
            compute_distance_cache(
                self.block_start,
                pos,
                self.max_backward,
                &self.starting_dist_cache,
                nodes,
                &mut posdata.distance_cache,
            );
            queue.push(posdata);
        }
        if queue.is_empty() {
            return;
        }

        let min_len = compute_minimum_copy_length(queue, nodes, model, self.num_bytes, pos);

        for k in 0..self.max_iters.min(queue.len()) {
            let posdata = *queue.at(k);
            let start = posdata.pos;
            let insert_code = insert_length_code(pos - start);
            let base_cost = posdata.cost_diff
                + insert_extra_bits(insert_code) as f32
                + model.literal_costs(0, pos);

            // cache-relative distances first; they carry the cheap symbols
            let mut best_len = min_len - 1;
            for j in 0..NUM_SHORT_CODES {
                if best_len >= max_len {
                    break;
                }
                let candidate = i64::from(posdata.distance_cache[SHORT_CODE_CACHE_INDEX[j]])
                    + i64::from(SHORT_CODE_CACHE_OFFSET[j]);
                if candidate <= 0 {
                    continue;
                }
                let backward = candidate as usize;
                if backward > max_distance {
                    continue;
                }
                let prev_masked = (cur_ix - backward) & self.ring_mask;
                if cur_masked + best_len >= self.window.len()
                    || prev_masked + best_len >= self.window.len()
                    || self.window[cur_masked + best_len] != self.window[prev_masked + best_len]
                {
                    continue;
                }
                let len = find_match_length(
                    &self.window[prev_masked..],
                    &self.window[cur_masked..],
                    max_len,
                );
                let dist_cost = base_cost + model.distance_cost(j);
                for l in (best_len + 1)..=len {
                    let copy_code = copy_length_code(l);
                    let cmd = combine_length_codes(insert_code, copy_code, j == 0);
                    let distance_part = if cmd < 128 { base_cost } else { dist_cost };
                    let cost = distance_part
                        + copy_extra_bits(copy_code) as f32
                        + model.command_cost(cmd);
                    if cost < nodes[pos + l].cost {
                        update_node(nodes, pos, start, l, l, backward, j + 1, cost);
                    }
                    best_len = l;
                }
            }

            // beyond the two cheapest starts only fresh cache hits help; the
            // raw-distance matches were already tried with cheaper inserts
            if k >= 2 {
                continue;
            }

            let mut len = min_len;
            for m in matches {
                let dist = m.distance as usize;
                let is_dictionary = dist > max_distance;
                let (dist_symbol, dist_extra) = encode_copy_distance(dist + 15);
                let dist_cost = base_cost
                    + (dist_extra >> 24) as f32
                    + model.distance_cost(dist_symbol as usize);
                let max_match_len = m.length();
                // intermediate lengths of a dictionary or very long match
                // have vanishing benefit; take it whole
                if len < max_match_len && (is_dictionary || max_match_len > self.max_zopfli_len) {
                    len = max_match_len;
                }
                while len <= max_match_len {
                    let len_code = if is_dictionary { m.length_code() } else { len };
                    let copy_code = copy_length_code(len_code);
                    let cmd = combine_length_codes(insert_code, copy_code, false);
                    let cost = dist_cost
                        + copy_extra_bits(copy_code) as f32
                        + model.command_cost(cmd);
                    if cost < nodes[pos + len].cost {
                        update_node(nodes, pos, start, len, len_code, dist, 0, cost);
                    }
                    len += 1;
                }
            }
        }
    }
}
