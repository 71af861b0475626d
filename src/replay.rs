////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Command-level reconstruction.
//!
//! Replays a command stream the way a conforming decoder would: literal runs
//! come from the source, copies come from the already-decoded window, and
//! the distance cache evolves by the same rule the emitter uses. This is the
//! consumer the round-trip and cache-fidelity tests check the selector
//! against; it writes no bit-stream.

use crate::command::{Command, NUM_SHORT_CODES, SHORT_CODE_CACHE_INDEX, SHORT_CODE_CACHE_OFFSET};
use crate::{Error, ZopflifyResult};

/// A reconstructed command stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    /// The bytes the commands decode to.
    pub bytes: Vec<u8>,
    /// Distance cache after the last command.
    pub dist_cache: [i32; 4],
}

fn copy_within_slice(v: &mut [u8], from: usize, to: usize, len: usize) {
    if from > to {
        let (dst, src) = v.split_at_mut(from);
        dst[to..to + len].copy_from_slice(&src[..len]);
    } else {
        let (src, dst) = v.split_at_mut(to);
        dst[..len].copy_from_slice(&src[from..from + len]);
    }
}

/// Decode `commands` against the literal bytes of `source`, starting from
/// `starting_dist_cache`.
///
/// # Errors
/// - [`Error::InvalidCommand`]: a command read literals past the source or
///   copied from before the start of the decoded window
pub fn replay_commands(
    source: &[u8],
    commands: &[Command],
    starting_dist_cache: [i32; 4],
) -> ZopflifyResult<Replay> {
    let total: usize = commands
        .iter()
        .map(|c| (c.insert_len + c.copy_len) as usize)
        .sum();
    let mut bytes = vec![0u8; total];
    let mut dist_cache = starting_dist_cache;
    let mut pos = 0usize;

    for (index, cmd) in commands.iter().enumerate() {
        let insert = cmd.insert_len as usize;
        if pos + insert > source.len() {
            return Err(Error::InvalidCommand(index));
        }
        bytes[pos..pos + insert].copy_from_slice(&source[pos..pos + insert]);
        pos += insert;

        let copy = cmd.copy_len as usize;
        if copy == 0 {
            continue;
        }
        let dist_code = cmd.restore_distance_code() as usize;
        let distance = if dist_code < NUM_SHORT_CODES {
            let slot = dist_cache[SHORT_CODE_CACHE_INDEX[dist_code]];
            let resolved = slot + SHORT_CODE_CACHE_OFFSET[dist_code];
            if resolved <= 0 {
                return Err(Error::InvalidCommand(index));
            }
            resolved as usize
        } else {
            dist_code - 15
        };
        if distance > pos {
            return Err(Error::InvalidCommand(index));
        }

        let src = pos - distance;
        if distance >= copy {
            copy_within_slice(&mut bytes, src, pos, copy);
        } else {
            // overlapping copy; the run repeats itself
            for k in 0..copy {
                bytes[pos + k] = bytes[src + k];
            }
        }
        pos += copy;

        if dist_code > 0 {
            dist_cache[3] = dist_cache[2];
            dist_cache[2] = dist_cache[1];
            dist_cache[1] = dist_cache[0];
            dist_cache[0] = distance as i32;
        }
    }

    Ok(Replay { bytes, dist_cache })
}
