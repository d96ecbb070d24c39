//! Library target for the `m3u8dl` package.
//!
//! The deliverable is the `m3u8dl` binary (`src/main.rs`); argument mapping and
//! progress reporting live here so they can be unit tested.

pub mod cli;
pub mod error;
pub mod progress;
pub mod utils;

#[doc(hidden)]
pub use m3u8_engine;
