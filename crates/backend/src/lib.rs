//! # spyglass-backend
//!
//! Spyglass's instrumentation backend: an EVM assembler and disassembler, a linker, the
//! bytecode patch engine and the iterative trace builder.

#[macro_use]
extern crate tracing;

pub mod asm;
pub mod link;
pub mod patch;
pub mod trace;

pub use patch::{patch_bytecode, PatchOptions, Patcher};
pub use trace::{Trace, Tracer};
