//! # IntScript
//!
//! A small toolchain for a register-less, position-addressed integer
//! machine. Programs exist in three progressively lower forms:
//!
//! 1. **Source** (`.is`) — an imperative language with modules, functions,
//!    scalar and array variables, and one scalar input and output channel.
//! 2. **Assembly** (`.asm`) — symbolic instructions over named cells.
//! 3. **Intcode** (`.ic`) — a single line of comma-separated integers,
//!    executable by the [virtual machine](vm).
//!
//! The [`compiler`] lowers source to assembly, the [`asm`] module encodes
//! assembly to intcode, and the [`vm`] runs intcode against an I/O device.
//! Three binaries (`compile`, `as`, `run`) wrap the pipeline.

pub mod asm;
pub mod cli;
pub mod compiler;
pub mod scan;
pub mod vm;
