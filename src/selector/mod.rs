////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! The zopflifying shortest-path optimizer.
//!
//! Command selection is treated as a shortest-path problem over byte
//! positions: every position of the block is a node, a copy arriving at a
//! position is an edge priced by the cost model, and the literals between a
//! command start and the copy ride along on the edge. Unlike a plain
//! Dijkstra formulation there is no literal edge at all; instead each
//! position whose best path is no worse than encoding its whole prefix as
//! literals is admitted to a small queue of candidate command starts, and
//! relaxation at a position stretches inserts back to the cheapest queued
//! starts. That keeps the edge count linear while still letting a command
//! begin many bytes before the copy it carries.
//!
//! Because short distance codes price a copy by where its distance sits in
//! the four-entry distance cache, the cost of an edge depends on the path
//! taken to its start. Each queued start therefore carries a snapshot of the
//! cache as reconstructed along its own best path, which is exact: arrivals
//! only ever land at least two bytes ahead of the position being expanded,
//! so a node's best path is final by the time it is queued.

pub(crate) mod cost_model;
pub(crate) mod node;
pub(crate) mod queue;
pub(crate) mod search;

use crate::command::Command;
use crate::matching::hash_chain::HashChainFinder;
use crate::matching::{BackwardMatch, MatchFinder};
use crate::selector::cost_model::CostModel;
use crate::selector::node::ZopfliNode;
use crate::selector::queue::StartPosQueue;
use crate::selector::search::BlockSearch;
use crate::{Error, ZopflifyResult};

/// Distance cache every stream starts with; the container format fixes
/// these four values.
pub const INITIAL_DISTANCE_CACHE: [i32; 4] = [16, 15, 11, 4];

/// How hard the optimizer works for its output.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[non_exhaustive]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum Quality {
    /// One optimizer pass priced by the position-based literal model, with
    /// matches found inline.
    SinglePass,
    /// Collect matches up front, then run the optimizer repeatedly,
    /// re-fitting the cost model to the previous pass's commands each time.
    #[default]
    TwoPass,
}

impl Quality {
    /// Copy length above which a match is taken atomically rather than
    /// explored length by length.
    #[must_use]
    pub fn max_zopfli_len(self) -> usize {
        match self {
            Quality::SinglePass => 150,
            Quality::TwoPass => 325,
        }
    }

    fn max_iters(self) -> usize {
        match self {
            Quality::SinglePass => 1,
            Quality::TwoPass => 5,
        }
    }
}

/// Tuning for one selection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    pub quality: Quality,
    /// Base-2 logarithm of the sliding window size.
    pub lgwin: u32,
    /// Optimizer passes at [`Quality::TwoPass`]. Two is the sweet spot;
    /// further passes show diminishing returns.
    pub passes: u32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            lgwin: 22,
            passes: 2,
        }
    }
}

/// Furthest backward distance encodable inside a window of `1 << lgwin`
/// bytes; the tail of the window is reserved by the container.
#[must_use]
pub fn max_backward_limit(lgwin: u32) -> usize {
    (1usize << lgwin).saturating_sub(16)
}

/// Everything one selection run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The chosen command stream.
    pub commands: Vec<Command>,
    /// Literal bytes carried inside the commands.
    pub num_literals: usize,
    /// Trailing bytes no command covers, owed to the next block.
    pub last_insert_len: usize,
    /// Distance cache after the last command.
    pub dist_cache: [i32; 4],
}

/// Select the backward references for one block of `num_bytes` bytes at
/// `position` in `window`.
///
/// `dist_cache` and `last_insert_len` are carried across blocks: the cache
/// is updated by the emitted commands and any trailing uncovered bytes are
/// folded into `last_insert_len` for the caller to hand to the next block.
/// Selected commands are appended to `commands` and their literal count
/// added to `num_literals`.
///
/// # Errors
/// - [`Error::InvalidMatch`]: the match finder broke its contract
/// - [`Error::BrokenPath`]: the cost model produced non-finite costs
#[allow(clippy::too_many_arguments)]
pub fn create_backward_references<M: MatchFinder>(
    window: &[u8],
    ring_mask: usize,
    position: usize,
    num_bytes: usize,
    params: &Params,
    finder: &mut M,
    dist_cache: &mut [i32; 4],
    last_insert_len: &mut usize,
    commands: &mut Vec<Command>,
    num_literals: &mut usize,
) -> ZopflifyResult<()> {
    match params.quality {
        Quality::SinglePass => single_pass(
            window,
            ring_mask,
            position,
            num_bytes,
            params,
            finder,
            dist_cache,
            last_insert_len,
            commands,
            num_literals,
        ),
        Quality::TwoPass => multi_pass(
            window,
            ring_mask,
            position,
            num_bytes,
            params,
            finder,
            dist_cache,
            last_insert_len,
            commands,
            num_literals,
        ),
    }
}

/// Run the selector over `input` as a single fresh block with the crate's
/// default finder.
///
/// # Errors
/// - [`Error::BrokenPath`]: the cost model produced non-finite costs
pub fn easy_backward_references(input: &[u8], params: &Params) -> ZopflifyResult<Selection> {
    let ring_mask = input.len().next_power_of_two() - 1;
    let mut finder = HashChainFinder::new(input.len());
    let mut selection = Selection {
        commands: Vec::new(),
        num_literals: 0,
        last_insert_len: 0,
        dist_cache: INITIAL_DISTANCE_CACHE,
    };
    create_backward_references(
        input,
        ring_mask,
        0,
        input.len(),
        params,
        &mut finder,
        &mut selection.dist_cache,
        &mut selection.last_insert_len,
        &mut selection.commands,
        &mut selection.num_literals,
    )?;
    Ok(selection)
}

fn store_end<M: MatchFinder>(position: usize, num_bytes: usize) -> usize {
    if num_bytes >= M::LOOKAHEAD {
        position + num_bytes - M::LOOKAHEAD + 1
    } else {
        position
    }
}

/// Check a position's candidate list against the finder contract.
fn validate_matches(
    matches: &[BackwardMatch],
    position: usize,
    max_length: usize,
    max_distance: usize,
    max_backward: usize,
) -> ZopflifyResult<()> {
    let mut prev: Option<BackwardMatch> = None;
    for &m in matches {
        let dist = m.distance as usize;
        let len = m.length();
        if dist == 0 || len == 0 || len > max_length {
            return Err(Error::InvalidMatch(position));
        }
        // beyond the window limit means a dictionary reference; in between
        // means the finder pointed past the data that exists
        if dist > max_distance && dist <= max_backward {
            return Err(Error::InvalidMatch(position));
        }
        if let Some(p) = prev {
            if p.length() >= len {
                return Err(Error::InvalidMatch(position));
            }
            if p.distance as usize <= max_distance && p.distance > m.distance {
                return Err(Error::InvalidMatch(position));
            }
        }
        prev = Some(m);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn single_pass<M: MatchFinder>(
    window: &[u8],
    ring_mask: usize,
    position: usize,
    num_bytes: usize,
    params: &Params,
    finder: &mut M,
    dist_cache: &mut [i32; 4],
    last_insert_len: &mut usize,
    commands: &mut Vec<Command>,
    num_literals: &mut usize,
) -> ZopflifyResult<()> {
    let max_backward = max_backward_limit(params.lgwin);
    let max_zopfli_len = Quality::SinglePass.max_zopfli_len();
    let mut nodes = vec![ZopfliNode::unreached(); num_bytes + 1];
    nodes[0] = ZopfliNode::start();
    let mut model = CostModel::new(num_bytes);
    model.set_from_literal_costs(position, window, ring_mask);
    let mut queue = StartPosQueue::new();
    let mut matches = Vec::new();
    let store_until = store_end::<M>(position, num_bytes);
    let search = BlockSearch {
        window,
        ring_mask,
        block_start: position,
        num_bytes,
        max_backward,
        max_zopfli_len,
        max_iters: Quality::SinglePass.max_iters(),
        starting_dist_cache: *dist_cache,
    };

    let mut i = 0;
    while i + M::HASH_TYPE_LENGTH <= num_bytes {
        let pos = position + i;
        let max_distance = pos.min(max_backward);
        finder.find_all(window, ring_mask, pos, num_bytes - i, max_distance, &mut matches);
        validate_matches(&matches, pos, num_bytes - i, max_distance, max_backward)?;
        if let Some(&last) = matches.last() {
            if last.length() > max_zopfli_len {
                matches.clear();
                matches.push(last);
            }
        }
        search.update_nodes(i, &matches, &model, &mut queue, &mut nodes);
        // very long matches make the relaxation quadratic for almost no
        // ratio; take them whole and restart the queue past them
        if matches.len() == 1 && matches[0].length() > max_zopfli_len {
            let match_len = matches[0].length();
            finder.store_range(window, ring_mask, pos + 1, (pos + match_len).min(store_until));
            i += match_len - 1;
            queue.clear();
        }
        i += 1;
    }

    compute_shortest_path(num_bytes, &mut nodes)?;
    emit_commands(
        num_bytes,
        position,
        max_backward,
        &nodes,
        dist_cache,
        last_insert_len,
        commands,
        num_literals,
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn multi_pass<M: MatchFinder>(
    window: &[u8],
    ring_mask: usize,
    position: usize,
    num_bytes: usize,
    params: &Params,
    finder: &mut M,
    dist_cache: &mut [i32; 4],
    last_insert_len: &mut usize,
    commands: &mut Vec<Command>,
    num_literals: &mut usize,
) -> ZopflifyResult<()> {
    let max_backward = max_backward_limit(params.lgwin);
    let max_zopfli_len = Quality::TwoPass.max_zopfli_len();
    let store_until = store_end::<M>(position, num_bytes);

    // collect every position's candidates once; the passes replay them
    let mut num_matches = vec![0u32; num_bytes];
    let mut matches: Vec<BackwardMatch> = Vec::new();
    let mut scratch: Vec<BackwardMatch> = Vec::new();
    let mut i = 0;
    while i + M::HASH_TYPE_LENGTH <= num_bytes {
        let pos = position + i;
        let max_distance = pos.min(max_backward);
        finder.find_all(window, ring_mask, pos, num_bytes - i, max_distance, &mut scratch);
        validate_matches(&scratch, pos, num_bytes - i, max_distance, max_backward)?;
        if let Some(&last) = scratch.last() {
            if last.length() > max_zopfli_len {
                let match_len = last.length();
                matches.push(last);
                num_matches[i] = 1;
                finder.store_range(window, ring_mask, pos + 1, (pos + match_len).min(store_until));
                i += match_len;
                continue;
            }
        }
        num_matches[i] = scratch.len() as u32;
        matches.extend_from_slice(&scratch);
        i += 1;
    }

    let orig_num_literals = *num_literals;
    let orig_last_insert_len = *last_insert_len;
    let orig_dist_cache = *dist_cache;
    let orig_num_commands = commands.len();

    let mut nodes = vec![ZopfliNode::unreached(); num_bytes + 1];
    let mut model = CostModel::new(num_bytes);
    let search = BlockSearch {
        window,
        ring_mask,
        block_start: position,
        num_bytes,
        max_backward,
        max_zopfli_len,
        max_iters: Quality::TwoPass.max_iters(),
        starting_dist_cache: orig_dist_cache,
    };

    for pass in 0..params.passes.max(1) {
        if pass == 0 {
            model.set_from_literal_costs(position, window, ring_mask);
        } else {
            model.set_from_commands(
                position,
                window,
                ring_mask,
                &commands[orig_num_commands..],
                orig_last_insert_len,
            );
        }
        commands.truncate(orig_num_commands);
        *num_literals = orig_num_literals;
        *last_insert_len = orig_last_insert_len;
        *dist_cache = orig_dist_cache;

        for n in nodes.iter_mut() {
            *n = ZopfliNode::unreached();
        }
        nodes[0] = ZopfliNode::start();
        iterate::<M>(num_bytes, &search, &model, &num_matches, &matches, &mut nodes)?;
        emit_commands(
            num_bytes,
            position,
            max_backward,
            &nodes,
            dist_cache,
            last_insert_len,
            commands,
            num_literals,
        );
    }
    Ok(())
}

/// One optimizer pass over precollected matches.
fn iterate<M: MatchFinder>(
    num_bytes: usize,
    search: &BlockSearch,
    model: &CostModel,
    num_matches: &[u32],
    matches: &[BackwardMatch],
    nodes: &mut [ZopfliNode],
) -> ZopflifyResult<usize> {
    let mut queue = StartPosQueue::new();
    let mut cur_match_pos = 0usize;
    let mut i = 0;
    while i + M::HASH_TYPE_LENGTH <= num_bytes {
        let n = num_matches[i] as usize;
        let position_matches = &matches[cur_match_pos..cur_match_pos + n];
        cur_match_pos += n;
        search.update_nodes(i, position_matches, model, &mut queue, nodes);
        if n == 1 && position_matches[0].length() > search.max_zopfli_len {
            i += position_matches[0].length() - 1;
            queue.clear();
        }
        i += 1;
    }
    compute_shortest_path(num_bytes, nodes)
}

/// Turn the relaxed node array into a forward-linked command chain from
/// position zero, returning the command count.
fn compute_shortest_path(num_bytes: usize, nodes: &mut [ZopfliNode]) -> ZopflifyResult<usize> {
    let mut index = num_bytes;
    while nodes[index].cost == f32::INFINITY {
        index -= 1;
    }
    if !nodes[index].cost.is_finite() {
        return Err(Error::BrokenPath);
    }
    nodes[index].next = u32::MAX;
    let mut num_commands = 0;
    while index != 0 {
        let len = nodes[index].command_length() as usize;
        if len == 0 || len > index {
            return Err(Error::BrokenPath);
        }
        index -= len;
        nodes[index].next = len as u32;
        num_commands += 1;
    }
    Ok(num_commands)
}

/// Walk the chain and materialize commands, updating the persistent distance
/// cache and the carried-over literal run.
#[allow(clippy::too_many_arguments)]
fn emit_commands(
    num_bytes: usize,
    block_start: usize,
    max_backward: usize,
    nodes: &[ZopfliNode],
    dist_cache: &mut [i32; 4],
    last_insert_len: &mut usize,
    commands: &mut Vec<Command>,
    num_literals: &mut usize,
) {
    let mut pos = 0usize;
    let mut offset = nodes[0].next;
    let mut first = true;
    while offset != u32::MAX {
        let next = &nodes[pos + offset as usize];
        let copy_length = next.copy_length() as usize;
        let mut insert_length = next.insert_length() as usize;
        pos += insert_length;
        offset = next.next;
        if first {
            insert_length += *last_insert_len;
            *last_insert_len = 0;
            first = false;
        }
        let distance = next.copy_distance() as usize;
        let len_code = next.length_code() as usize;
        let max_distance = (block_start + pos).min(max_backward);
        let is_dictionary = distance > max_distance;
        let dist_code = next.distance_code() as usize;

        commands.push(Command::new(insert_length, copy_length, len_code, dist_code));

        if !is_dictionary && dist_code > 0 {
            dist_cache[3] = dist_cache[2];
            dist_cache[2] = dist_cache[1];
            dist_cache[1] = dist_cache[0];
            dist_cache[0] = distance as i32;
        }

        *num_literals += insert_length;
        pos += copy_length;
    }
    *last_insert_len += num_bytes - pos;
}

#[cfg(test)]
mod tests {
    use crate::command::{copy_extra_bits, copy_length_code, insert_extra_bits, insert_length_code};

    use super::*;

    fn run(input: &[u8], params: &Params) -> Selection {
        easy_backward_references(input, params).expect("selection failed")
    }

    /// Total bit cost of a command stream under a model, the way the
    /// relaxation prices arrivals.
    fn modeled_cost(model: &CostModel, commands: &[Command]) -> f32 {
        let mut pos = 0usize;
        let mut total = 0.0f32;
        for cmd in commands {
            let insert = cmd.insert_len as usize;
            total += model.literal_costs(pos, pos + insert);
            total += insert_extra_bits(insert_length_code(insert)) as f32;
            total += copy_extra_bits(copy_length_code(cmd.copy_len_code as usize)) as f32;
            total += model.command_cost(cmd.cmd_prefix);
            if cmd.carries_distance() {
                total += cmd.distance_extra_bit_count() as f32;
                total += model.distance_cost(cmd.dist_prefix as usize);
            }
            pos += insert + cmd.copy_len as usize;
        }
        total
    }

    #[test]
    fn chosen_commands_beat_the_literal_baseline_under_the_fitted_model() {
        let inputs: [&[u8]; 3] = [
            b"ABABABAB",
            b"the quick brown fox jumps over the quick brown fox and the quick brown fox",
            b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaabbbbbbbbbbaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        ];
        for input in inputs {
            let selection = run(input, &Params::default());
            assert!(!selection.commands.is_empty());
            let mask = input.len().next_power_of_two() - 1;
            let mut model = CostModel::new(input.len());
            model.set_from_commands(0, input, mask, &selection.commands, 0);
            let covered = input.len() - selection.last_insert_len;
            let chosen = modeled_cost(&model, &selection.commands);
            let baseline = model.literal_costs(0, covered);
            assert!(
                chosen < baseline,
                "commands cost {chosen} bits, literals {baseline} bits"
            );
        }
    }

    #[test]
    fn costs_never_decrease_along_the_chosen_chain() {
        let input = b"abcabcabcabc-abcabcabcabc-abcabcabcabc!".to_vec();
        let num_bytes = input.len();
        let mask = num_bytes.next_power_of_two() - 1;
        let mut finder = HashChainFinder::new(num_bytes);
        let mut nodes = vec![ZopfliNode::unreached(); num_bytes + 1];
        nodes[0] = ZopfliNode::start();
        let mut model = CostModel::new(num_bytes);
        model.set_from_literal_costs(0, &input, mask);
        let mut queue = StartPosQueue::new();
        let mut matches = Vec::new();
        let search = BlockSearch {
            window: &input,
            ring_mask: mask,
            block_start: 0,
            num_bytes,
            max_backward: max_backward_limit(22),
            max_zopfli_len: Quality::TwoPass.max_zopfli_len(),
            max_iters: Quality::TwoPass.max_iters(),
            starting_dist_cache: INITIAL_DISTANCE_CACHE,
        };
        let mut i = 0;
        while i + 4 <= num_bytes {
            finder.find_all(&input, mask, i, num_bytes - i, i, &mut matches);
            search.update_nodes(i, &matches, &model, &mut queue, &mut nodes);
            i += 1;
        }
        compute_shortest_path(num_bytes, &mut nodes).unwrap();

        let mut pos = 0usize;
        let mut offset = nodes[0].next;
        let mut last_cost = 0.0f32;
        let mut hops = 0;
        while offset != u32::MAX {
            let next = &nodes[pos + offset as usize];
            assert!(next.cost >= last_cost);
            last_cost = next.cost;
            pos += next.command_length() as usize;
            offset = next.next;
            hops += 1;
        }
        assert!(hops > 0);
    }

    #[test]
    fn second_pass_never_loses_to_the_first_under_its_own_model() {
        let input =
            b"compression compresses compressible text; compression compresses it well"
                .repeat(4);
        let one_pass = run(
            &input,
            &Params {
                quality: Quality::TwoPass,
                lgwin: 22,
                passes: 1,
            },
        );
        let two_pass = run(&input, &Params::default());

        // price both runs with the model fitted to the first pass's output
        let mask = input.len().next_power_of_two() - 1;
        let mut refit = CostModel::new(input.len());
        refit.set_from_commands(0, &input, mask, &one_pass.commands, 0);
        let first = modeled_cost(&refit, &one_pass.commands)
            + refit.literal_costs(input.len() - one_pass.last_insert_len, input.len());
        let second = modeled_cost(&refit, &two_pass.commands)
            + refit.literal_costs(input.len() - two_pass.last_insert_len, input.len());
        assert!(second <= first + 1e-3);
    }

    #[test]
    fn passes_beyond_the_default_still_produce_valid_output() {
        let input = b"mississippi mississippi mississippi".repeat(3);
        let base = run(&input, &Params::default());
        let extra = run(
            &input,
            &Params {
                quality: Quality::TwoPass,
                lgwin: 22,
                passes: 4,
            },
        );
        let accounted: usize = extra
            .commands
            .iter()
            .map(|c| (c.insert_len + c.copy_len) as usize)
            .sum();
        assert_eq!(accounted + extra.last_insert_len, input.len());
        assert_eq!(base.commands.len(), run(&input, &Params::default()).commands.len());
    }

    #[test]
    fn single_pass_quality_selects_references_too() {
        let input = b"round and round and round and round it goes".repeat(2);
        let selection = run(
            &input,
            &Params {
                quality: Quality::SinglePass,
                lgwin: 18,
                passes: 1,
            },
        );
        assert!(!selection.commands.is_empty());
        let accounted: usize = selection
            .commands
            .iter()
            .map(|c| (c.insert_len + c.copy_len) as usize)
            .sum();
        assert_eq!(accounted + selection.last_insert_len, input.len());
    }

    #[test]
    fn broken_match_streams_are_rejected_loudly() {
        struct LyingFinder;
        impl MatchFinder for LyingFinder {
            const HASH_TYPE_LENGTH: usize = 4;
            const LOOKAHEAD: usize = 4;
            fn find_all(
                &mut self,
                _window: &[u8],
                _ring_mask: usize,
                position: usize,
                _max_length: usize,
                _max_distance: usize,
                out: &mut Vec<BackwardMatch>,
            ) {
                out.clear();
                if position == 3 {
                    // lengths must strictly increase; these do not
                    out.push(BackwardMatch::new(1, 6));
                    out.push(BackwardMatch::new(2, 6));
                }
            }
            fn store_range(&mut self, _: &[u8], _: usize, _: usize, _: usize) {}
        }

        let input = b"aaaaaaaaaaaaaaaa".to_vec();
        let mut finder = LyingFinder;
        let mut dist_cache = INITIAL_DISTANCE_CACHE;
        let mut last_insert_len = 0;
        let mut commands = Vec::new();
        let mut num_literals = 0;
        let result = create_backward_references(
            &input,
            15,
            0,
            input.len(),
            &Params::default(),
            &mut finder,
            &mut dist_cache,
            &mut last_insert_len,
            &mut commands,
            &mut num_literals,
        );
        assert_eq!(result, Err(Error::InvalidMatch(3)));
        assert!(commands.is_empty());
    }
}
