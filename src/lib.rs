////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

#![warn(clippy::pedantic, clippy::cargo)]
// Symbols, lengths and distances move between integer widths constantly;
// the narrowing conversions are intentional.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
// extra-bit counts become f32 cost terms; they are tiny
#![allow(clippy::cast_precision_loss)]
// Default::default() is more idiomatic imo
#![allow(clippy::default_trait_access)]
// too many lines is a dumb metric
#![allow(clippy::too_many_lines)]

//! Zopfli-style backward-reference selection for Brotli-format compressors.
//!
//! Given a window of raw bytes, the selector chooses the sequence of
//! `(insert length, copy length, backward distance)` commands with the
//! lowest predicted bit cost under the container's symbol tables, by running
//! a shortest-path optimization over byte positions. Entropy coding and
//! bit-stream writing are deliberately out of scope; the output is the
//! command stream a container encoder would feed to its entropy coder.
//!
//! The easiest way in is [`easy_backward_references`]:
//!
//! ```
//! use zopflify::{easy_backward_references, Params};
//!
//! let input = b"how much wood would a woodchuck chuck".repeat(8);
//! let selection = easy_backward_references(&input, &Params::default()).unwrap();
//! assert!(!selection.commands.is_empty());
//! ```
//!
//! [`create_backward_references`] is the full-control entry point: it works
//! on a ring-buffer window, carries the distance cache and pending literal
//! run across blocks, and accepts any [`MatchFinder`] implementation.

pub mod command;
mod error;
pub mod literal_cost;
pub mod matching;
pub mod replay;
mod selector;

pub use crate::command::Command;
pub use crate::error::Error;
pub use crate::matching::hash_chain::HashChainFinder;
pub use crate::matching::{BackwardMatch, MatchFinder};
pub use crate::selector::{
    create_backward_references, easy_backward_references, max_backward_limit, Params, Quality,
    Selection, INITIAL_DISTANCE_CACHE,
};

/// Result alias used across the crate.
pub type ZopflifyResult<T> = Result<T, Error>;
