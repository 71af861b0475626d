////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Position-dependent bit-cost estimation for literal bytes.
//!
//! Before the first optimizer pass has any commands to fit a histogram from,
//! literal bytes are priced by how common they are in a window around their
//! own position. The estimate slides a 256-entry histogram over the input and
//! charges each byte the Shannon cost of its frequency inside the window.

const WINDOW_HALF: usize = 2000;

/// Base-2 logarithm, with `log2(0)` pinned to zero so empty histograms price
/// every symbol uniformly.
#[inline]
pub(crate) fn fast_log2(v: usize) -> f64 {
    if v == 0 {
        0.0
    } else {
        (v as f64).log2()
    }
}

/// Fill `costs` with the predicted bit cost of each literal at
/// `position..position + costs.len()` in the window.
pub fn estimate_bit_costs(position: usize, ring_mask: usize, window: &[u8], costs: &mut [f32]) {
    let num_bytes = costs.len();
    let mut histogram = [0usize; 256];
    let mut in_window = WINDOW_HALF.min(num_bytes);
    for i in 0..in_window {
        histogram[window[(position + i) & ring_mask] as usize] += 1;
    }
    for (i, cost) in costs.iter_mut().enumerate() {
        if i >= WINDOW_HALF {
            histogram[window[(position + i - WINDOW_HALF) & ring_mask] as usize] -= 1;
            in_window -= 1;
        }
        if i + WINDOW_HALF < num_bytes {
            histogram[window[(position + i + WINDOW_HALF) & ring_mask] as usize] += 1;
            in_window += 1;
        }
        let histo = histogram[window[(position + i) & ring_mask] as usize].max(1);
        let mut lit_cost = fast_log2(in_window) - fast_log2(histo);
        // small bias towards literals; a cost below one bit is softened rather
        // than clamped so the ordering between rare bytes survives
        lit_cost += 0.029;
        if lit_cost < 1.0 {
            lit_cost = lit_cost * 0.5 + 0.5;
        }
        *cost = lit_cost as f32;
    }
}
