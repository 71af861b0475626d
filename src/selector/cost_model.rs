////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

use crate::command::{
    Command, NUM_COMMAND_SYMBOLS, NUM_DISTANCE_SYMBOLS, NUM_LITERAL_SYMBOLS,
};
use crate::literal_cost::{estimate_bit_costs, fast_log2};

/// Predicted bit costs the relaxation step prices candidate arrivals with.
///
/// The first optimizer pass uses a statistics-free model: literals are priced
/// by the position-aware estimator and symbols by a slowly growing logarithm
/// of their index. Between passes the model is re-fitted to the histograms of
/// the commands the previous pass actually chose, which tracks the final
/// entropy-coded size much more closely.
pub(crate) struct CostModel {
    cost_cmd: [f32; NUM_COMMAND_SYMBOLS],
    cost_dist: [f32; NUM_DISTANCE_SYMBOLS],
    /// Prefix sums: `literal_costs[j] - literal_costs[i]` prices the literal
    /// run `i..j`.
    literal_costs: Vec<f32>,
    min_cost_cmd: f32,
    num_bytes: usize,
}

impl CostModel {
    pub fn new(num_bytes: usize) -> Self {
        Self {
            cost_cmd: [0.0; NUM_COMMAND_SYMBOLS],
            cost_dist: [0.0; NUM_DISTANCE_SYMBOLS],
            literal_costs: vec![0.0; num_bytes + 2],
            min_cost_cmd: 0.0,
            num_bytes,
        }
    }

    /// First-pass model: estimator-driven literals, index-logarithm symbols.
    pub fn set_from_literal_costs(&mut self, position: usize, window: &[u8], ring_mask: usize) {
        let num_bytes = self.num_bytes;
        estimate_bit_costs(
            position,
            ring_mask,
            window,
            &mut self.literal_costs[1..=num_bytes],
        );
        self.literal_costs[0] = 0.0;
        for i in 0..num_bytes {
            self.literal_costs[i + 1] += self.literal_costs[i];
        }
        for (i, cost) in self.cost_cmd.iter_mut().enumerate() {
            *cost = fast_log2(11 + i) as f32;
        }
        for (i, cost) in self.cost_dist.iter_mut().enumerate() {
            *cost = fast_log2(20 + i) as f32;
        }
        self.min_cost_cmd = fast_log2(11) as f32;
    }

    /// Re-fit from the commands a previous pass emitted over this block.
    pub fn set_from_commands(
        &mut self,
        position: usize,
        window: &[u8],
        ring_mask: usize,
        commands: &[Command],
        last_insert_len: usize,
    ) {
        let mut histogram_literal = [0u32; NUM_LITERAL_SYMBOLS];
        let mut histogram_cmd = [0u32; NUM_COMMAND_SYMBOLS];
        let mut histogram_dist = [0u32; NUM_DISTANCE_SYMBOLS];

        let mut pos = position - last_insert_len;
        for cmd in commands {
            histogram_cmd[cmd.cmd_prefix as usize] += 1;
            if cmd.carries_distance() {
                histogram_dist[cmd.dist_prefix as usize] += 1;
            }
            for j in 0..cmd.insert_len as usize {
                histogram_literal[window[(pos + j) & ring_mask] as usize] += 1;
            }
            pos += (cmd.insert_len + cmd.copy_len) as usize;
        }

        let mut cost_literal = [0.0f32; NUM_LITERAL_SYMBOLS];
        set_cost(&histogram_literal, &mut cost_literal);
        set_cost(&histogram_cmd, &mut self.cost_cmd);
        set_cost(&histogram_dist, &mut self.cost_dist);

        self.min_cost_cmd = self
            .cost_cmd
            .iter()
            .copied()
            .fold(f32::INFINITY, f32::min);

        self.literal_costs[0] = 0.0;
        for i in 0..self.num_bytes {
            self.literal_costs[i + 1] = self.literal_costs[i]
                + cost_literal[window[(position + i) & ring_mask] as usize];
        }
    }

    #[inline]
    pub fn command_cost(&self, code: u16) -> f32 {
        self.cost_cmd[code as usize]
    }

    #[inline]
    pub fn distance_cost(&self, symbol: usize) -> f32 {
        self.cost_dist[symbol]
    }

    #[inline]
    pub fn literal_costs(&self, from: usize, to: usize) -> f32 {
        self.literal_costs[to] - self.literal_costs[from]
    }

    #[inline]
    pub fn min_command_cost(&self) -> f32 {
        self.min_cost_cmd
    }
}

/// Shannon bit costs from a histogram, floored at one bit, with a flat
/// penalty for symbols the histogram never saw.
fn set_cost(histogram: &[u32], cost: &mut [f32]) {
    let sum: usize = histogram.iter().map(|&h| h as usize).sum();
    let log2sum = fast_log2(sum) as f32;
    for (cost, &count) in cost.iter_mut().zip(histogram) {
        if count == 0 {
            *cost = log2sum + 2.0;
            continue;
        }
        *cost = (log2sum - fast_log2(count as usize) as f32).max(1.0);
    }
}
