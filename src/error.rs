////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

use onlyerror::Error;

/// Failures surfaced by the selector and the command replayer.
///
/// None of these are retried; they propagate to whatever container-level
/// encoder is driving the selection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The match finder broke its contract: a zero distance, a candidate past
    /// the window end, or lengths/distances that are not monotone.
    #[error("match finder emitted an invalid candidate at position {0}")]
    InvalidMatch(usize),
    /// The back-pointer chain is inconsistent. The literal-only path always
    /// reaches the end of the block with finite cost, so observing this means
    /// the cost model produced non-finite values.
    #[error("shortest-path chain is inconsistent; cost model produced non-finite costs")]
    BrokenPath,
    /// A replayed command referenced data outside the decoded window.
    #[error("command {0} references data outside the decoded window")]
    InvalidCommand(usize),
}
