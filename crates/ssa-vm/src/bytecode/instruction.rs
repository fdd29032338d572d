//! The decoded instruction shapes a `BytecodeFunction` stores (§4.2, §4.4).
//!
//! The original packs every instruction into fixed-width 64-bit slots inside
//! a flat byte buffer, addressed by an instruction pointer that advances by
//! `GetInstructionSlotSize(opcode)` slots. This crate addresses instructions
//! by their position in a `Vec<Instruction>` instead of by byte offset — the
//! same "some opcodes cost more than one unit of IP advance" shape survives
//! in `Opcode::static_slot_size` (used by `dump()`'s reporting and by the
//! `internal-call` arity story), but the interpreter's dispatch loop steps
//! by vector index rather than decoding a byte stream.

use super::opcode::Opcode;

/// An operand or destination: an index into the active `Activation`'s value
/// slots (§5.2). Slot 0 is reserved/dummy, matching the original's layout.
pub type Slot = u32;

/// A resolved branch target: the index of the destination's first
/// instruction inside the enclosing `BytecodeFunction`'s instruction vector.
pub type Target = u32;

#[derive(Debug, Clone)]
pub enum Instruction {
    /// `dest <- lhs OP rhs`: covers the AllTypes/IntTypes/FloatTypes
    /// arithmetic, bitwise, and compare families.
    Binary { opcode: Opcode, dest: Slot, lhs: Slot, rhs: Slot },

    /// `dest <- OP(src)`: casts (sext/zext/trunc/bitcast/ptrtoint/inttoptr/
    /// float<->int/float width change), `load`, `phi_mov`, `nop_mov`.
    Unary { opcode: Opcode, dest: Slot, src: Slot },

    /// `[ptr] <- value`.
    Store { opcode: Opcode, ptr: Slot, value: Slot },

    /// `dest <- ptr + index * elem_size` (a non-constant-indexed GEP step).
    GepArray { opcode: Opcode, dest: Slot, ptr: Slot, index: Slot, elem_size: u32 },

    /// `dest <- ptr + offset` (a constant-folded GEP/struct-field step).
    GepOffset { dest: Slot, ptr: Slot, offset: u32 },

    /// `dest <- extract_bytes(agg, byte_offset)`, sized by the destination
    /// value's own type (the caller already resolved which typed `Unary`
    /// load-like opcode applies if this is really a re-load of a slot the
    /// aggregate already occupies).
    ExtractValue { dest: Slot, agg: Slot, byte_offset: u32 },

    Select { dest: Slot, cond: Slot, if_true: Slot, if_false: Slot },

    BranchUncond { target: Target },

    /// `BranchCond` branches to `target_true` when taken; `BranchCondFt`
    /// (same shape, different opcode) falls through to the next instruction
    /// instead of encoding an explicit false target, matching the original's
    /// `branch_cond`/`branch_cond_ft` distinction used when the false
    /// successor is the block laid out immediately after this one.
    BranchCond { cond: Slot, target_true: Target, target_false: Option<Target> },

    Ret { value: Option<Slot> },

    /// `result, overflow <- OP(lhs, rhs)`; the "two destination slots in one
    /// instruction" shape the original's with-overflow opcodes encode.
    Overflow { opcode: Opcode, result: Slot, overflow: Slot, lhs: Slot, rhs: Slot },

    /// `memcpy`/`memmove`/`memset` over `[dst, dst+len)`; `src_or_val` is a
    /// source pointer for copy/move or a byte value for `memset`.
    MemIntrinsic { opcode: Opcode, dst: Slot, src_or_val: Slot, len: Slot },

    /// Call into a sibling `BytecodeFunction` held by this function (§4.4);
    /// self-describing arity is why this is the one variable-slot-size
    /// opcode (`Opcode::CallInternal.static_slot_size() == None`).
    CallInternal { dest: Option<Slot>, callee_index: u32, args: Vec<Slot> },

    /// Call through the host trampoline registry (§9 FFI note), addressed by
    /// a precomputed `ExternalCallContext` rather than by name at run time.
    CallExternal { dest: Option<Slot>, context_index: u32, args: Vec<Slot> },

    /// Call to one of the small set of host builtins the interpreter has a
    /// type-specialized handler inlined for (§4.5's fast path).
    ExplicitCall { opcode: Opcode, dest: Option<Slot>, args: Vec<Slot> },

    /// Reserves `size_bytes` of scratch memory in the active activation and
    /// writes a pointer to it into `dest`.
    Alloca { dest: Slot, size_bytes: u32 },
}

impl Instruction {
    /// The opcode this instruction decodes to, for `dump()` and for the
    /// jump-table-completeness property.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Binary { opcode, .. }
            | Instruction::Unary { opcode, .. }
            | Instruction::Store { opcode, .. }
            | Instruction::Overflow { opcode, .. }
            | Instruction::MemIntrinsic { opcode, .. }
            | Instruction::ExplicitCall { opcode, .. } => *opcode,
            Instruction::GepArray { opcode, .. } => *opcode,
            Instruction::GepOffset { .. } => Opcode::GepOffset,
            Instruction::ExtractValue { .. } => Opcode::ExtractValue,
            Instruction::Select { .. } => Opcode::Select,
            Instruction::BranchUncond { .. } => Opcode::BranchUncond,
            Instruction::BranchCond { target_false, .. } => {
                if target_false.is_some() {
                    Opcode::BranchCond
                } else {
                    Opcode::BranchCondFt
                }
            }
            Instruction::Ret { .. } => Opcode::Ret,
            Instruction::CallInternal { .. } => Opcode::CallInternal,
            Instruction::CallExternal { .. } => Opcode::CallExternal,
            Instruction::Alloca { .. } => Opcode::Alloca,
        }
    }

    /// The slot footprint this instruction reports in `dump()`, mirroring
    /// `BytecodeFunction::GetInstructionSlotSize` (§4.2).
    #[must_use]
    pub fn slot_size(&self) -> usize {
        match self {
            Instruction::CallInternal { args, .. } => 1 + args.len(),
            other => other.opcode().static_slot_size().unwrap_or(1),
        }
    }
}
