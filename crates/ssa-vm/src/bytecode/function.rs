//! The translated, directly executable container (§4.4, §6.3).
//!
//! Mirrors `BytecodeFunction`'s role in the original: the builder's sole
//! product, and the interpreter's sole input. Nested internal calls are
//! owned by value (`sub_functions`), matching §4.4/§9's "no ownership
//! cycles, resolved once at build time" contract.

use std::fmt::Write as _;

use super::instruction::Instruction;

/// A materialized constant pool entry: its 64-bit slot value plus the
/// original width, kept only so `dump_contents()` can print it at the right
/// byte width (the bytecode module otherwise has no notion of `ir::Type`).
#[derive(Debug, Clone, Copy)]
pub struct ConstantSlot {
    pub bits: u64,
    pub byte_size: u8,
}

/// Everything the interpreter needs to marshal an external call without
/// consulting the callee's name at run time (§9 FFI note). Built once by
/// the translator, looked up by `CallExternal::context_index`.
#[derive(Debug, Clone)]
pub struct ExternalCallContext {
    pub symbol: String,
    pub arg_count: usize,
    pub has_return: bool,
}

#[derive(Debug, Clone)]
pub struct BytecodeFunction {
    pub name: String,
    pub param_count: usize,
    pub has_return: bool,
    pub instructions: Vec<Instruction>,
    pub constants: Vec<ConstantSlot>,
    pub external_call_contexts: Vec<ExternalCallContext>,
    /// Internally-called functions, owned by this one, addressed by
    /// `CallInternal::callee_index`.
    pub sub_functions: Vec<BytecodeFunction>,
    /// Number of value slots an activation of this function needs
    /// (slot 0 is the reserved dummy slot), as produced by register
    /// allocation (§4.1).
    pub slot_count: usize,
}

impl BytecodeFunction {
    /// Converts an instruction index into the dispatch engine's instruction
    /// pointer. The original computes a byte address into a flat bytecode
    /// buffer; this container addresses instructions by `Vec` position
    /// instead (§4.4's note that there is no wire format to preserve), so
    /// the "pointer" here is the index itself — kept as a named conversion
    /// rather than used as a bare `usize` so the round-trip property (§8
    /// universal property 5) has something concrete to state.
    #[must_use]
    pub fn ip_from_index(&self, index: usize) -> usize {
        index
    }

    #[must_use]
    pub fn index_from_ip(&self, ip: usize) -> usize {
        ip
    }

    /// Static slot footprint of the instruction at `index`, mirroring
    /// `GetInstructionSlotSize` (§4.2, §4.4) — every opcode except
    /// `call_internal` reports a size independent of its operands.
    #[must_use]
    pub fn slot_size(&self, index: usize) -> usize {
        self.instructions[index].slot_size()
    }

    #[must_use]
    pub fn new(name: impl Into<String>, param_count: usize, has_return: bool) -> Self {
        BytecodeFunction {
            name: name.into(),
            param_count,
            has_return,
            instructions: Vec::new(),
            constants: Vec::new(),
            external_call_contexts: Vec::new(),
            sub_functions: Vec::new(),
            slot_count: 1,
        }
    }

    /// Per-instruction textual form: index, opcode mnemonic, operand slots —
    /// the Rust analogue of the original's `Dump()`.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (idx, inst) in self.instructions.iter().enumerate() {
            let _ = writeln!(out, "{idx:4}: {}", self.dump_one(inst));
        }
        out
    }

    fn dump_one(&self, inst: &Instruction) -> String {
        let name = inst.opcode().name();
        match inst {
            Instruction::Binary { dest, lhs, rhs, .. } => format!("{name} %{dest}, %{lhs}, %{rhs}"),
            Instruction::Unary { dest, src, .. } => format!("{name} %{dest}, %{src}"),
            Instruction::Store { ptr, value, .. } => format!("{name} [%{ptr}], %{value}"),
            Instruction::GepArray { dest, ptr, index, elem_size, .. } => {
                format!("{name} %{dest}, %{ptr}, %{index} * {elem_size}")
            }
            Instruction::GepOffset { dest, ptr, offset } => {
                format!("{name} %{dest}, %{ptr} + {offset}")
            }
            Instruction::ExtractValue { dest, agg, byte_offset } => {
                format!("{name} %{dest}, %{agg} @ +{byte_offset}")
            }
            Instruction::Select { dest, cond, if_true, if_false } => {
                format!("{name} %{dest}, %{cond}, %{if_true}, %{if_false}")
            }
            Instruction::BranchUncond { target } => format!("{name} -> {target}"),
            Instruction::BranchCond { cond, target_true, target_false } => match target_false {
                Some(f) => format!("{name} %{cond}, -> {target_true}, -> {f}"),
                None => format!("{name} %{cond}, -> {target_true}"),
            },
            Instruction::Ret { value: Some(v) } => format!("{name} %{v}"),
            Instruction::Ret { value: None } => name.to_string(),
            Instruction::Overflow { result, overflow, lhs, rhs, .. } => {
                format!("{name} %{result}, %{overflow}, %{lhs}, %{rhs}")
            }
            Instruction::MemIntrinsic { dst, src_or_val, len, .. } => {
                format!("{name} %{dst}, %{src_or_val}, %{len}")
            }
            Instruction::CallInternal { dest, callee_index, args } => {
                let callee = self.sub_functions.get(*callee_index as usize).map_or("?", |f| f.name.as_str());
                Self::dump_call(name, dest.as_ref(), callee, args)
            }
            Instruction::CallExternal { dest, context_index, args } => {
                let callee = self
                    .external_call_contexts
                    .get(*context_index as usize)
                    .map_or("?", |c| c.symbol.as_str());
                Self::dump_call(name, dest.as_ref(), callee, args)
            }
            Instruction::ExplicitCall { dest, args, .. } => {
                Self::dump_call(name, dest.as_ref(), "", args)
            }
            Instruction::Alloca { dest, size_bytes } => format!("{name} %{dest}, {size_bytes} bytes"),
        }
    }

    fn dump_call(name: &str, dest: Option<&u32>, callee: &str, args: &[u32]) -> String {
        let args = args.iter().map(|a| format!("%{a}")).collect::<Vec<_>>().join(", ");
        match dest {
            Some(d) => format!("{name} %{d} <- {callee}({args})"),
            None => format!("{name} {callee}({args})"),
        }
    }

    /// Bytecode dump followed by the constant pool in decimal and hex, the
    /// Rust analogue of the original's `DumpContents()` `.bf` file writer —
    /// this crate returns the report as a `String` instead of writing a
    /// binary-encoded blob to disk, since there is no wire format to preserve.
    #[must_use]
    pub fn dump_contents(&self) -> String {
        let mut out = format!("function {} ({} params)\n", self.name, self.param_count);
        out.push_str(&self.dump());
        out.push_str("constants:\n");
        for (idx, c) in self.constants.iter().enumerate() {
            let _ = writeln!(out, "  [{idx}] {} (0x{:x}, {} bytes)", c.bits as i64, c.bits, c.byte_size);
        }
        for sub in &self.sub_functions {
            out.push_str("--- sub-function ---\n");
            out.push_str(&sub.dump_contents());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcode::Opcode;

    #[test]
    fn dump_renders_binary_and_ret() {
        let mut f = BytecodeFunction::new("add_one", 1, true);
        f.constants.push(ConstantSlot { bits: 1, byte_size: 4 });
        f.instructions.push(Instruction::Binary {
            opcode: Opcode::AddI32,
            dest: 3,
            lhs: 1,
            rhs: 2,
        });
        f.instructions.push(Instruction::Ret { value: Some(3) });
        let dump = f.dump();
        assert!(dump.contains("add_i32 %3, %1, %2"));
        assert!(dump.contains("ret %3"));
    }

    #[test]
    fn dump_contents_includes_constant_table() {
        let mut f = BytecodeFunction::new("k", 0, true);
        f.constants.push(ConstantSlot { bits: 7, byte_size: 4 });
        let dump = f.dump_contents();
        assert!(dump.contains("function k (0 params)"));
        assert!(dump.contains("[0] 7 (0x7, 4 bytes)"));
    }
}
