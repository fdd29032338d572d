//! The container the builder produces and the interpreter consumes (§4, §6.3).
//!
//! Deliberately has no dependency on the `ir` module: a `BytecodeFunction` is
//! a flat, already-typed-and-allocated program. The `(ir operation, scalar
//! type) -> Opcode` lookup tables that bridge the two modules live in
//! `builder::translate`, which is free to depend on both.

mod function;
mod instruction;
mod opcode;

pub use function::{BytecodeFunction, ConstantSlot, ExternalCallContext};
pub use instruction::{Instruction, Slot, Target};
pub use opcode::{number_opcodes, opcode_from_id, Opcode, ALL_OPCODES};
