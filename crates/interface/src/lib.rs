#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod diagnostics;
pub use diagnostics::{DiagCtxt, ErrorGuaranteed};

mod pos;
pub use pos::Pos;

pub use anstream::ColorChoice;

/// The current version of the Octet backend.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the plural suffix for `count` items.
#[macro_export]
macro_rules! pluralize {
    ($count:expr) => {
        if $count == 1 { "" } else { "s" }
    };
}
