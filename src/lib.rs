//! Matched molecular pair fragmentation and pairing.
//!
//! Molecules are cut at bonds matching a [`BondPattern`] into a constant
//! [`FragmentKey`] and a changing [`FragmentValue`]. Records sharing a Key
//! are then paired into [`Transform`]s.

use tracing::level_filters::LevelFilter;

mod element;
pub use element::*;

mod error;
pub use error::*;

mod molecule;
pub use molecule::*;

pub mod parse;

mod canon;
pub use canon::*;

mod bond_ref;
pub use bond_ref::*;

mod combinations;
pub use combinations::*;

mod pattern;
pub use pattern::*;

mod cutter;
pub use cutter::*;

mod triplet;
pub use triplet::*;

mod fragment;
pub use fragment::*;

mod factory;
pub use factory::*;

mod fingerprint;
pub use fingerprint::*;

mod config;
pub use config::*;

mod intern;
pub use intern::*;

mod batch;
pub use batch::*;

mod pairing;
pub use pairing::*;

mod table;
pub use table::*;

mod correlation;
pub use correlation::*;

mod pipeline;
pub use pipeline::*;

/// Install a formatted `tracing` subscriber at `level` (`error`, `warn`,
/// `info`, `debug`, `trace` or `off`). Unknown levels fall back to `info`.
/// Calling it again is harmless.
pub fn init_logging(level: &str) {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}
