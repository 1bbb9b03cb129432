//! # spyglass-utils
//!
//! Node access and on-disk caching shared by the Spyglass crates.

#[macro_use]
extern crate tracing;

pub mod cache;
pub mod rpc;
