//! A bytecode builder and interpreter for a typed, SSA-form intermediate
//! representation (§1).
//!
//! `ir` is the input contract: callers hand the builder a `Function` built
//! from basic blocks with a single terminator and PHI nodes at block heads.
//! `builder` turns one into a `bytecode::BytecodeFunction` through liveness
//! analysis, register allocation, and instruction translation (§4).
//! `interpreter` executes the result with a match-based dispatch loop over
//! typed value slots (§5).

pub mod bytecode;
pub mod builder;
pub mod error;
pub mod interpreter;
pub mod ir;

pub use error::{BuildError, Error, ExecutionError, Result};
