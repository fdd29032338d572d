//! Per-instruction emission: typed opcode selection, PHI-edge copies, and
//! branch-target relocation (§4.2, §4.3).
//!
//! Branch targets are only known once the destination block has itself been
//! translated, so forward branches are emitted with a placeholder target and
//! recorded as a fixup; a second pass patches every fixup once every block's
//! start index is known. This generalizes a `CallFixup` / `resolve_call_fixups`
//! two-pass pattern from call-site patching to branch-target patching.

use std::collections::HashMap;

use crate::bytecode::{
    self, BytecodeFunction, ConstantSlot, ExternalCallContext, Instruction as BInst, Opcode,
};
use crate::error::{BuildError, Result};
use crate::ir::{self, BinOp, BlockId, CastOp, Constant, Function, Module, Operand, OverflowOp, Predicate, Type, ValueId};

use super::analyser::{analyse, Analysis};
use super::regalloc::{allocate, Allocation, RegisterAllocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

fn scalar_of(ty: &Type) -> Result<Scalar> {
    Ok(match ty {
        Type::Bool | Type::I8 => Scalar::I8,
        Type::I16 => Scalar::I16,
        Type::I32 => Scalar::I32,
        Type::I64 | Type::Ptr => Scalar::I64,
        Type::F32 => Scalar::F32,
        Type::F64 => Scalar::F64,
        Type::Array { .. } | Type::Struct(_) => {
            return Err(BuildError::NotSupported(format!("{ty:?} does not fit in a value slot")).into())
        }
    })
}

fn int_scalar_by_size(byte_size: u64) -> Result<Scalar> {
    Ok(match byte_size {
        1 => Scalar::I8,
        2 => Scalar::I16,
        4 => Scalar::I32,
        8 => Scalar::I64,
        other => return Err(BuildError::NotSupported(format!("unsupported scalar width {other}")).into()),
    })
}

macro_rules! all_types_family {
    ($base:expr, $scalar:expr, $( $variant:ident ),* $(,)?) => {{
        let variants = [$( Opcode::$variant ),*];
        let idx = match $scalar { Scalar::I8 => 0, Scalar::I16 => 1, Scalar::I32 => 2, Scalar::I64 => 3, Scalar::F32 => 4, Scalar::F64 => 5 };
        let _ = $base;
        variants[idx]
    }};
}

fn all_types_opcode(base: AllTypesBase, s: Scalar) -> Opcode {
    match base {
        AllTypesBase::Add => all_types_family!(base, s, AddI8, AddI16, AddI32, AddI64, AddF32, AddF64),
        AllTypesBase::Sub => all_types_family!(base, s, SubI8, SubI16, SubI32, SubI64, SubF32, SubF64),
        AllTypesBase::Mul => all_types_family!(base, s, MulI8, MulI16, MulI32, MulI64, MulF32, MulF64),
        AllTypesBase::Div => all_types_family!(base, s, DivI8, DivI16, DivI32, DivI64, DivF32, DivF64),
        AllTypesBase::CmpEq => all_types_family!(base, s, CmpEqI8, CmpEqI16, CmpEqI32, CmpEqI64, CmpEqF32, CmpEqF64),
        AllTypesBase::CmpNe => all_types_family!(base, s, CmpNeI8, CmpNeI16, CmpNeI32, CmpNeI64, CmpNeF32, CmpNeF64),
        AllTypesBase::CmpGt => all_types_family!(base, s, CmpGtI8, CmpGtI16, CmpGtI32, CmpGtI64, CmpGtF32, CmpGtF64),
        AllTypesBase::CmpGe => all_types_family!(base, s, CmpGeI8, CmpGeI16, CmpGeI32, CmpGeI64, CmpGeF32, CmpGeF64),
        AllTypesBase::CmpLt => all_types_family!(base, s, CmpLtI8, CmpLtI16, CmpLtI32, CmpLtI64, CmpLtF32, CmpLtF64),
        AllTypesBase::CmpLe => all_types_family!(base, s, CmpLeI8, CmpLeI16, CmpLeI32, CmpLeI64, CmpLeF32, CmpLeF64),
    }
}

#[derive(Debug, Clone, Copy)]
enum AllTypesBase {
    Add,
    Sub,
    Mul,
    Div,
    CmpEq,
    CmpNe,
    CmpGt,
    CmpGe,
    CmpLt,
    CmpLe,
}

/// `IntTypes`-family scalars (`I8`/`I16`/`I32`/`I64`) indexed 0..4.
fn int_idx(s: Scalar) -> Result<usize> {
    Ok(match s {
        Scalar::I8 => 0,
        Scalar::I16 => 1,
        Scalar::I32 => 2,
        Scalar::I64 => 3,
        Scalar::F32 | Scalar::F64 => {
            return Err(BuildError::NotSupported("integer-only opcode used on a float operand".into()).into())
        }
    })
}

macro_rules! int_types_family {
    ($idx:expr, $( $variant:ident ),* $(,)?) => {{
        let variants = [$( Opcode::$variant ),*];
        variants[$idx]
    }};
}

#[derive(Debug, Clone, Copy)]
enum IntTypesBase {
    SDiv,
    Rem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    CmpSGt,
    CmpSGe,
    CmpSLt,
    CmpSLe,
}

fn int_types_opcode(base: IntTypesBase, s: Scalar) -> Result<Opcode> {
    let idx = int_idx(s)?;
    Ok(match base {
        IntTypesBase::SDiv => int_types_family!(idx, SDivI8, SDivI16, SDivI32, SDivI64),
        IntTypesBase::Rem => int_types_family!(idx, RemI8, RemI16, RemI32, RemI64),
        IntTypesBase::SRem => int_types_family!(idx, SRemI8, SRemI16, SRemI32, SRemI64),
        IntTypesBase::And => int_types_family!(idx, AndI8, AndI16, AndI32, AndI64),
        IntTypesBase::Or => int_types_family!(idx, OrI8, OrI16, OrI32, OrI64),
        IntTypesBase::Xor => int_types_family!(idx, XorI8, XorI16, XorI32, XorI64),
        IntTypesBase::Shl => int_types_family!(idx, ShlI8, ShlI16, ShlI32, ShlI64),
        IntTypesBase::LShr => int_types_family!(idx, LShrI8, LShrI16, LShrI32, LShrI64),
        IntTypesBase::AShr => int_types_family!(idx, AShrI8, AShrI16, AShrI32, AShrI64),
        IntTypesBase::CmpSGt => int_types_family!(idx, CmpSGtI8, CmpSGtI16, CmpSGtI32, CmpSGtI64),
        IntTypesBase::CmpSGe => int_types_family!(idx, CmpSGeI8, CmpSGeI16, CmpSGeI32, CmpSGeI64),
        IntTypesBase::CmpSLt => int_types_family!(idx, CmpSLtI8, CmpSLtI16, CmpSLtI32, CmpSLtI64),
        IntTypesBase::CmpSLe => int_types_family!(idx, CmpSLeI8, CmpSLeI16, CmpSLeI32, CmpSLeI64),
    })
}

fn overflow_opcode(op: OverflowOp, s: Scalar) -> Result<Opcode> {
    let idx = int_idx(s)?;
    Ok(match op {
        OverflowOp::UAdd => int_types_family!(idx, UAddOverflowI8, UAddOverflowI16, UAddOverflowI32, UAddOverflowI64),
        OverflowOp::SAdd => int_types_family!(idx, SAddOverflowI8, SAddOverflowI16, SAddOverflowI32, SAddOverflowI64),
        OverflowOp::USub => int_types_family!(idx, USubOverflowI8, USubOverflowI16, USubOverflowI32, USubOverflowI64),
        OverflowOp::SSub => int_types_family!(idx, SSubOverflowI8, SSubOverflowI16, SSubOverflowI32, SSubOverflowI64),
        OverflowOp::UMul => int_types_family!(idx, UMulOverflowI8, UMulOverflowI16, UMulOverflowI32, UMulOverflowI64),
        OverflowOp::SMul => int_types_family!(idx, SMulOverflowI8, SMulOverflowI16, SMulOverflowI32, SMulOverflowI64),
    })
}

fn size_int_opcode_load(byte_size: u64) -> Result<Opcode> {
    Ok(match int_scalar_by_size(byte_size)? {
        Scalar::I8 => Opcode::LoadI8,
        Scalar::I16 => Opcode::LoadI16,
        Scalar::I32 => Opcode::LoadI32,
        Scalar::I64 => Opcode::LoadI64,
        Scalar::F32 | Scalar::F64 => unreachable!(),
    })
}

fn size_int_opcode_store(byte_size: u64) -> Result<Opcode> {
    Ok(match int_scalar_by_size(byte_size)? {
        Scalar::I8 => Opcode::StoreI8,
        Scalar::I16 => Opcode::StoreI16,
        Scalar::I32 => Opcode::StoreI32,
        Scalar::I64 => Opcode::StoreI64,
        Scalar::F32 | Scalar::F64 => unreachable!(),
    })
}

fn size_int_opcode_gep_array(byte_size: u64) -> Result<Opcode> {
    Ok(match int_scalar_by_size(byte_size)? {
        Scalar::I8 => Opcode::GepArrayI8,
        Scalar::I16 => Opcode::GepArrayI16,
        Scalar::I32 => Opcode::GepArrayI32,
        Scalar::I64 => Opcode::GepArrayI64,
        Scalar::F32 | Scalar::F64 => unreachable!(),
    })
}

fn binop_opcode(op: BinOp, ty: &Type) -> Result<Opcode> {
    let s = scalar_of(ty)?;
    Ok(match op {
        BinOp::Add => all_types_opcode(AllTypesBase::Add, s),
        BinOp::Sub => all_types_opcode(AllTypesBase::Sub, s),
        BinOp::Mul => all_types_opcode(AllTypesBase::Mul, s),
        BinOp::UDiv | BinOp::FDiv => all_types_opcode(AllTypesBase::Div, s),
        BinOp::SDiv => int_types_opcode(IntTypesBase::SDiv, s)?,
        BinOp::URem => int_types_opcode(IntTypesBase::Rem, s)?,
        BinOp::SRem => int_types_opcode(IntTypesBase::SRem, s)?,
        BinOp::FRem => match s {
            Scalar::F32 => Opcode::FRemF32,
            Scalar::F64 => Opcode::FRemF64,
            _ => return Err(BuildError::NotSupported("frem used on a non-float operand".into()).into()),
        },
        BinOp::And => int_types_opcode(IntTypesBase::And, s)?,
        BinOp::Or => int_types_opcode(IntTypesBase::Or, s)?,
        BinOp::Xor => int_types_opcode(IntTypesBase::Xor, s)?,
        BinOp::Shl => int_types_opcode(IntTypesBase::Shl, s)?,
        BinOp::LShr => int_types_opcode(IntTypesBase::LShr, s)?,
        BinOp::AShr => int_types_opcode(IntTypesBase::AShr, s)?,
    })
}

fn cmp_opcode(pred: Predicate, ty: &Type) -> Result<Opcode> {
    let s = scalar_of(ty)?;
    Ok(match pred {
        Predicate::Eq => all_types_opcode(AllTypesBase::CmpEq, s),
        Predicate::Ne => all_types_opcode(AllTypesBase::CmpNe, s),
        Predicate::Gt => all_types_opcode(AllTypesBase::CmpGt, s),
        Predicate::Ge => all_types_opcode(AllTypesBase::CmpGe, s),
        Predicate::Lt => all_types_opcode(AllTypesBase::CmpLt, s),
        Predicate::Le => all_types_opcode(AllTypesBase::CmpLe, s),
        Predicate::SGt => int_types_opcode(IntTypesBase::CmpSGt, s)?,
        Predicate::SGe => int_types_opcode(IntTypesBase::CmpSGe, s)?,
        Predicate::SLt => int_types_opcode(IntTypesBase::CmpSLt, s)?,
        Predicate::SLe => int_types_opcode(IntTypesBase::CmpSLe, s)?,
    })
}

/// Each cast op maps to exactly one match arm; there is no ambiguity to
/// resolve between e.g. `FpToSi` and `SiToFp` the way an enum-of-ints
/// `switch` in the original has to disambiguate by destination type alone
/// (see DESIGN.md for this decision).
fn cast_opcode(op: CastOp, src_ty: &Type, dst_ty: &Type) -> Result<Opcode> {
    Ok(match op {
        CastOp::SExt => sext_zext_opcode(src_ty, dst_ty, true)?,
        CastOp::ZExt => sext_zext_opcode(src_ty, dst_ty, false)?,
        CastOp::Trunc | CastOp::BitCast | CastOp::PtrToInt | CastOp::IntToPtr => {
            return Err(BuildError::NotSupported(
                "non-no-op trunc/bitcast/ptrtoint/inttoptr casts are not part of the translated opcode set".into(),
            )
            .into())
        }
        CastOp::FpTrunc => Opcode::DoubleToFloat,
        CastOp::FpExt => Opcode::FloatToDouble,
        CastOp::FpToSi => float_to_int_opcode(src_ty, dst_ty, true)?,
        CastOp::FpToUi => float_to_int_opcode(src_ty, dst_ty, false)?,
        CastOp::SiToFp => int_to_float_opcode(src_ty, dst_ty, true)?,
        CastOp::UiToFp => int_to_float_opcode(src_ty, dst_ty, false)?,
    })
}

fn sext_zext_opcode(src_ty: &Type, dst_ty: &Type, signed: bool) -> Result<Opcode> {
    let pair = (scalar_of(src_ty)?, scalar_of(dst_ty)?);
    Ok(match (signed, pair) {
        (true, (Scalar::I8, Scalar::I16)) => Opcode::SextI8I16,
        (true, (Scalar::I8, Scalar::I32)) => Opcode::SextI8I32,
        (true, (Scalar::I8, Scalar::I64)) => Opcode::SextI8I64,
        (true, (Scalar::I16, Scalar::I32)) => Opcode::SextI16I32,
        (true, (Scalar::I16, Scalar::I64)) => Opcode::SextI16I64,
        (true, (Scalar::I32, Scalar::I64)) => Opcode::SextI32I64,
        (false, (Scalar::I8, Scalar::I16)) => Opcode::ZextI8I16,
        (false, (Scalar::I8, Scalar::I32)) => Opcode::ZextI8I32,
        (false, (Scalar::I8, Scalar::I64)) => Opcode::ZextI8I64,
        (false, (Scalar::I16, Scalar::I32)) => Opcode::ZextI16I32,
        (false, (Scalar::I16, Scalar::I64)) => Opcode::ZextI16I64,
        (false, (Scalar::I32, Scalar::I64)) => Opcode::ZextI32I64,
        _ => return Err(BuildError::NotSupported(format!("unsupported ext widening {src_ty:?} -> {dst_ty:?}")).into()),
    })
}

fn float_to_int_opcode(src_ty: &Type, dst_ty: &Type, signed: bool) -> Result<Opcode> {
    let dst = int_idx(scalar_of(dst_ty)?)?;
    Ok(match (scalar_of(src_ty)?, signed) {
        (Scalar::F32, true) => int_types_family!(dst, FloatToSII8, FloatToSII16, FloatToSII32, FloatToSII64),
        (Scalar::F32, false) => int_types_family!(dst, FloatToUII8, FloatToUII16, FloatToUII32, FloatToUII64),
        (Scalar::F64, true) => int_types_family!(dst, DoubleToSII8, DoubleToSII16, DoubleToSII32, DoubleToSII64),
        (Scalar::F64, false) => int_types_family!(dst, DoubleToUII8, DoubleToUII16, DoubleToUII32, DoubleToUII64),
        _ => return Err(BuildError::NotSupported("float-to-int cast on a non-float source".into()).into()),
    })
}

fn int_to_float_opcode(src_ty: &Type, dst_ty: &Type, signed: bool) -> Result<Opcode> {
    let src = int_idx(scalar_of(src_ty)?)?;
    Ok(match (scalar_of(dst_ty)?, signed) {
        (Scalar::F32, true) => int_types_family!(src, SIToFloatI8, SIToFloatI16, SIToFloatI32, SIToFloatI64),
        (Scalar::F32, false) => int_types_family!(src, UIToFloatI8, UIToFloatI16, UIToFloatI32, UIToFloatI64),
        (Scalar::F64, true) => int_types_family!(src, SIToDoubleI8, SIToDoubleI16, SIToDoubleI32, SIToDoubleI64),
        (Scalar::F64, false) => int_types_family!(src, UIToDoubleI8, UIToDoubleI16, UIToDoubleI32, UIToDoubleI64),
        _ => return Err(BuildError::NotSupported("int-to-float cast on a non-float destination".into()).into()),
    })
}

#[derive(Debug, Clone, Copy)]
enum Fixup {
    Uncond,
    CondTrue,
    CondFalse,
}

/// What a fixup resolves against: a real block's start index, or a landing
/// stub's (neither is known until its owner has been translated).
#[derive(Debug, Clone, Copy)]
enum FixupTarget {
    Block(BlockId),
    Stub(usize),
}

/// A deferred PHI-copy sequence for one control-flow edge, emitted after
/// every real block so it never lands between a conditional branch and its
/// fall-through successor (§4.3: a copy that only belongs to one edge of a
/// branch must not run on the other edge).
struct LandingStub {
    from: BlockId,
    succ: BlockId,
}

pub struct TranslateOptions {
    pub register_allocator: RegisterAllocator,
}

/// Translates every function reachable (by internal call) from `entry`,
/// returning the entry function with callees owned recursively as
/// `sub_functions` (§4.4).
pub fn build(module: &Module, entry: &str, options: &TranslateOptions) -> Result<BytecodeFunction> {
    let mut cache: HashMap<String, BytecodeFunction> = HashMap::new();
    build_function(module, entry, options, &mut cache)
}

fn build_function(
    module: &Module,
    name: &str,
    options: &TranslateOptions,
    cache: &mut HashMap<String, BytecodeFunction>,
) -> Result<BytecodeFunction> {
    if let Some(cached) = cache.get(name) {
        return Ok(cached.clone());
    }
    let function = module.functions.get(name).ok_or_else(|| BuildError::UnknownFunction(name.to_string()))?;
    let analysis = analyse(function);

    let mut translator = FunctionTranslator::new(function, &analysis, module, options, cache);
    translator.assign_slots()?;
    translator.translate_blocks()?;
    translator.patch_fixups();

    let out = translator.into_bytecode_function()?;
    cache.insert(name.to_string(), out.clone());
    Ok(out)
}

struct FunctionTranslator<'a> {
    function: &'a Function,
    analysis: &'a Analysis,
    module: &'a Module,
    options: &'a TranslateOptions,
    cache: &'a mut HashMap<String, BytecodeFunction>,

    slot_of: HashMap<ValueId, u32>,
    const_slot: HashMap<u64, u32>,
    constants: Vec<ConstantSlot>,
    instructions: Vec<BInst>,
    external_call_contexts: Vec<ExternalCallContext>,
    sub_functions: Vec<BytecodeFunction>,
    sub_function_index: HashMap<String, u32>,
    block_start: HashMap<BlockId, u32>,
    fixups: Vec<(usize, FixupTarget, Fixup)>,
    landing_stubs: Vec<LandingStub>,
    landing_stub_start: HashMap<usize, u32>,
    slot_count: u32,
    /// Per-block count of temporaries requested for the self-successor PHI
    /// swap (§4.3); the grand total adds the per-function max, not the sum,
    /// since temporaries from different blocks never coexist.
    temp_slots_used: HashMap<BlockId, u32>,
    max_temp_slots: u32,
}

impl<'a> FunctionTranslator<'a> {
    fn new(
        function: &'a Function,
        analysis: &'a Analysis,
        module: &'a Module,
        options: &'a TranslateOptions,
        cache: &'a mut HashMap<String, BytecodeFunction>,
    ) -> Self {
        FunctionTranslator {
            function,
            analysis,
            module,
            options,
            cache,
            slot_of: HashMap::new(),
            const_slot: HashMap::new(),
            constants: Vec::new(),
            instructions: Vec::new(),
            external_call_contexts: Vec::new(),
            sub_functions: Vec::new(),
            sub_function_index: HashMap::new(),
            block_start: HashMap::new(),
            fixups: Vec::new(),
            landing_stubs: Vec::new(),
            landing_stub_start: HashMap::new(),
            slot_count: 1,
            temp_slots_used: HashMap::new(),
            max_temp_slots: 0,
        }
    }

    /// Allocates the next temporary slot for `block`'s self-successor PHI
    /// swap, past the end of the allocator's slot range; reused by every
    /// subsequent block (only one block's temporaries are live at a time).
    fn temp_slot(&mut self, block: BlockId) -> u32 {
        let used = self.temp_slots_used.entry(block).or_insert(0);
        *used += 1;
        self.max_temp_slots = self.max_temp_slots.max(*used);
        self.slot_count + *used - 1
    }

    /// Constants get slots first (in first-encountered order), then
    /// arguments in declared order, then every other value via the
    /// configured register allocator — constants and arguments are pinned
    /// for the activation's whole lifetime and never reach `regalloc`.
    fn assign_slots(&mut self) -> Result<()> {
        for block in &self.function.blocks {
            for inst in block.instructions.iter().chain(block.phis.iter()) {
                for operand in inst.operands() {
                    if let Operand::Const(c) = operand {
                        self.intern_constant(c);
                    }
                }
            }
            if let Some(Operand::Const(c)) = block.terminator.operand() {
                self.intern_constant(c);
            }
        }

        let mut next_slot = 1 + self.constants.len() as u32;
        for &arg in &self.function.params {
            self.slot_of.insert(arg, next_slot);
            next_slot += 1;
        }

        let other_values: Vec<ValueId> =
            self.analysis.value_order.iter().copied().filter(|v| !self.function.params.contains(v)).collect();
        let Allocation { slot_of, slot_count } =
            allocate(&other_values, self.analysis, next_slot, self.options.register_allocator);
        self.slot_of.extend(slot_of);
        self.slot_count = slot_count;
        Ok(())
    }

    fn intern_constant(&mut self, c: Constant) -> u32 {
        let bits = c.to_bits();
        if let Some(&slot) = self.const_slot.get(&bits) {
            return slot;
        }
        let idx = self.constants.len() as u32;
        self.constants.push(ConstantSlot { bits, byte_size: c.ty().byte_size() as u8 });
        let slot = 1 + idx;
        self.const_slot.insert(bits, slot);
        slot
    }

    fn operand_slot(&mut self, op: Operand) -> Result<u32> {
        match op {
            Operand::Value(v) => {
                let canonical = self.analysis.resolve(v);
                self.slot_of
                    .get(&canonical)
                    .copied()
                    .ok_or_else(|| BuildError::NotSupported(format!("value {canonical:?} has no assigned slot")).into())
            }
            Operand::Const(c) => Ok(self.intern_constant(c)),
        }
    }

    fn translate_blocks(&mut self) -> Result<()> {
        let rpo = self.analysis.rpo.clone();
        for (pos, &block_id) in rpo.iter().enumerate() {
            self.block_start.insert(block_id, self.instructions.len() as u32);
            let block = self.function.block(block_id).clone();
            for inst in &block.instructions {
                self.translate_instruction(inst)?;
            }
            let next_block = rpo.get(pos + 1).copied();
            self.translate_terminator(block_id, &block.terminator, next_block)?;
        }
        self.emit_landing_stubs()?;
        Ok(())
    }

    /// Resolves a control-flow edge's branch target. An edge into a
    /// PHI-less block lands on it directly; an edge into a block with PHIs
    /// is routed through a landing stub instead of copying inline, because
    /// a conditional branch's two edges share the instruction that precedes
    /// them and an inline copy would run on both regardless of which edge is
    /// actually taken. The stub itself is only emitted once every real block
    /// has been translated, so it can never be mistaken for a fall-through
    /// successor of the branch that reaches it.
    fn resolve_edge_target(&mut self, from: BlockId, succ: BlockId) -> FixupTarget {
        if self.function.block(succ).phis.is_empty() {
            FixupTarget::Block(succ)
        } else {
            let stub_id = self.landing_stubs.len();
            self.landing_stubs.push(LandingStub { from, succ });
            FixupTarget::Stub(stub_id)
        }
    }

    /// Emits each deferred landing stub's PHI copies followed by an
    /// unconditional branch back to the real successor, once every real
    /// block's start index is known.
    fn emit_landing_stubs(&mut self) -> Result<()> {
        let stubs = std::mem::take(&mut self.landing_stubs);
        for (stub_id, stub) in stubs.into_iter().enumerate() {
            let start = self.instructions.len() as u32;
            self.landing_stub_start.insert(stub_id, start);
            if stub.succ == stub.from {
                self.emit_self_successor_phi_swap(stub.from)?;
            } else {
                self.emit_common_phi_copies(stub.from, stub.succ)?;
            }
            let idx = self.instructions.len();
            self.instructions.push(BInst::BranchUncond { target: 0 });
            self.fixups.push((idx, FixupTarget::Block(stub.succ), Fixup::Uncond));
        }
        Ok(())
    }

    /// Inline PHI copy for an unconditional branch's single successor: there
    /// is no other edge to corrupt, so the copy runs directly ahead of the
    /// (possibly elided) branch instead of through a landing stub.
    fn emit_inline_phi_copies(&mut self, from: BlockId, target: BlockId) -> Result<()> {
        if self.function.block(target).phis.is_empty() {
            return Ok(());
        }
        if target == from {
            self.emit_self_successor_phi_swap(from)
        } else {
            self.emit_common_phi_copies(from, target)
        }
    }

    /// Common case (`S != B`): a straight `phi_mov` per PHI, skipped when
    /// source and destination already share a slot.
    fn emit_common_phi_copies(&mut self, from: BlockId, succ: BlockId) -> Result<()> {
        for phi in &self.function.block(succ).phis.clone() {
            let ir::Instruction::Phi { id, incoming, .. } = phi else { continue };
            let (_, incoming_op) = incoming
                .iter()
                .find(|(pred, _)| *pred == from)
                .copied()
                .ok_or_else(|| BuildError::NotSupported(format!("phi {id:?} has no incoming value for its predecessor")))?;
            let src = self.operand_slot(incoming_op)?;
            let dest = self.operand_slot(Operand::Value(*id))?;
            if src != dest {
                self.instructions.push(BInst::Unary { opcode: Opcode::PhiMov, dest, src });
            }
        }
        Ok(())
    }

    /// Self-successor case (`S == B`, §4.3's lost-copy/PHI-swap problem): a
    /// block that loops back to its own head with PHIs can have incoming
    /// values that alias each other's destination slot (a swap). Moving
    /// straight to each destination would let an earlier move clobber a
    /// later PHI's source, so every incoming value is first collected into a
    /// fresh temporary slot, and only once all of them have been read are the
    /// temporaries moved into their real destinations.
    fn emit_self_successor_phi_swap(&mut self, block: BlockId) -> Result<()> {
        let mut pending_moves = Vec::new();
        for phi in &self.function.block(block).phis.clone() {
            let ir::Instruction::Phi { id, incoming, .. } = phi else { continue };
            let (_, incoming_op) = incoming
                .iter()
                .find(|(pred, _)| *pred == block)
                .copied()
                .ok_or_else(|| BuildError::NotSupported(format!("phi {id:?} has no incoming value for its predecessor")))?;
            let src = self.operand_slot(incoming_op)?;
            let temp = self.temp_slot(block);
            self.instructions.push(BInst::Unary { opcode: Opcode::PhiMov, dest: temp, src });
            pending_moves.push((self.operand_slot(Operand::Value(*id))?, temp));
        }
        for (dest, temp) in pending_moves {
            self.instructions.push(BInst::Unary { opcode: Opcode::PhiMov, dest, src: temp });
        }
        Ok(())
    }

    fn translate_terminator(
        &mut self,
        from: BlockId,
        terminator: &ir::Terminator,
        next_block: Option<BlockId>,
    ) -> Result<()> {
        match terminator {
            ir::Terminator::Br(target) => {
                self.emit_inline_phi_copies(from, *target)?;
                // elided when the target is already the next block in RPO order
                // (the common straight-line fall-through case, §4.3).
                if next_block == Some(*target) {
                    return Ok(());
                }
                let idx = self.instructions.len();
                self.instructions.push(BInst::BranchUncond { target: 0 });
                self.fixups.push((idx, FixupTarget::Block(*target), Fixup::Uncond));
            }
            ir::Terminator::CondBr { cond, if_true, if_false } => {
                let cond_slot = self.operand_slot(*cond)?;
                let true_target = self.resolve_edge_target(from, *if_true);
                let idx = self.instructions.len();
                // when the false successor is laid out immediately after this
                // block *and* needs no PHI copies of its own, fall through
                // instead of encoding an explicit target (`branch_cond_ft`,
                // §4.3); `patch_fixups` then only patches the true target. A
                // false successor with PHIs always gets an explicit target
                // (its own landing stub), never the fall-through path, so its
                // copies can't be skipped by falling straight past them.
                let false_has_phis = !self.function.block(*if_false).phis.is_empty();
                if !false_has_phis && next_block == Some(*if_false) {
                    self.instructions.push(BInst::BranchCond { cond: cond_slot, target_true: 0, target_false: None });
                    self.fixups.push((idx, true_target, Fixup::CondTrue));
                } else {
                    let false_target = self.resolve_edge_target(from, *if_false);
                    self.instructions.push(BInst::BranchCond { cond: cond_slot, target_true: 0, target_false: Some(0) });
                    self.fixups.push((idx, true_target, Fixup::CondTrue));
                    self.fixups.push((idx, false_target, Fixup::CondFalse));
                }
            }
            ir::Terminator::Ret(value) => {
                let value = match value {
                    Some(op) => Some(self.operand_slot(*op)?),
                    None => None,
                };
                self.instructions.push(BInst::Ret { value });
            }
            ir::Terminator::Unreachable => {
                return Err(BuildError::NotSupported(format!("block {from:?} falls through to unreachable")).into())
            }
        }
        Ok(())
    }

    fn patch_fixups(&mut self) {
        for (idx, target, kind) in std::mem::take(&mut self.fixups) {
            let target = match target {
                FixupTarget::Block(b) => self.block_start[&b],
                FixupTarget::Stub(s) => self.landing_stub_start[&s],
            };
            match (&mut self.instructions[idx], kind) {
                (BInst::BranchUncond { target: t }, Fixup::Uncond) => *t = target,
                (BInst::BranchCond { target_true, .. }, Fixup::CondTrue) => *target_true = target,
                (BInst::BranchCond { target_false, .. }, Fixup::CondFalse) => *target_false = Some(target),
                _ => unreachable!("fixup kind does not match instruction shape"),
            }
        }
    }

    fn translate_instruction(&mut self, inst: &ir::Instruction) -> Result<()> {
        // no-op aliases never reach bytecode: their id resolves straight
        // through to the operand they alias (see `analyser::no_op_alias_target`).
        if let Some(id) = inst.result_id() {
            if self.analysis.resolve(id) != id {
                return Ok(());
            }
        }

        match inst {
            ir::Instruction::BinOp { id, op, ty, lhs, rhs } => {
                let opcode = binop_opcode(*op, ty)?;
                let dest = self.operand_slot(Operand::Value(*id))?;
                let lhs = self.operand_slot(*lhs)?;
                let rhs = self.operand_slot(*rhs)?;
                self.instructions.push(BInst::Binary { opcode, dest, lhs, rhs });
            }
            ir::Instruction::Cmp { id, pred, operand_ty, lhs, rhs } => {
                let opcode = cmp_opcode(*pred, operand_ty)?;
                let dest = self.operand_slot(Operand::Value(*id))?;
                let lhs = self.operand_slot(*lhs)?;
                let rhs = self.operand_slot(*rhs)?;
                self.instructions.push(BInst::Binary { opcode, dest, lhs, rhs });
            }
            ir::Instruction::Cast { id, op, src_ty, dst_ty, value } => {
                let opcode = cast_opcode(*op, src_ty, dst_ty)?;
                let dest = self.operand_slot(Operand::Value(*id))?;
                let src = self.operand_slot(*value)?;
                self.instructions.push(BInst::Unary { opcode, dest, src });
            }
            ir::Instruction::Load { id, ty, ptr } => {
                let opcode = size_int_opcode_load(ty.byte_size())?;
                let dest = self.operand_slot(Operand::Value(*id))?;
                let src = self.operand_slot(*ptr)?;
                self.instructions.push(BInst::Unary { opcode, dest, src });
            }
            ir::Instruction::Store { ty, ptr, value } => {
                let opcode = size_int_opcode_store(ty.byte_size())?;
                let ptr = self.operand_slot(*ptr)?;
                let value = self.operand_slot(*value)?;
                self.instructions.push(BInst::Store { opcode, ptr, value });
            }
            ir::Instruction::Alloca { id, elem_ty, count } => {
                let Operand::Const(c) = count else {
                    return Err(BuildError::NotSupported("alloca with a non-constant element count".into()).into());
                };
                let size_bytes = (elem_ty.byte_size() * c.as_u64()) as u32;
                let dest = self.operand_slot(Operand::Value(*id))?;
                self.instructions.push(BInst::Alloca { dest, size_bytes });
            }
            ir::Instruction::Gep { id, source_ty, ptr, indices } => {
                self.translate_gep(*id, source_ty, *ptr, indices)?;
            }
            ir::Instruction::Select { id, cond, if_true, if_false, .. } => {
                let dest = self.operand_slot(Operand::Value(*id))?;
                let cond = self.operand_slot(*cond)?;
                let if_true = self.operand_slot(*if_true)?;
                let if_false = self.operand_slot(*if_false)?;
                self.instructions.push(BInst::Select { dest, cond, if_true, if_false });
            }
            ir::Instruction::ExtractValue { id, agg_ty, agg, indices } => {
                let result_ty = element_type_at(agg_ty, indices)?;
                // Resolved open question: the original's size guard is
                // inverted; the correct condition rejects an extracted value
                // *larger* than a slot, not one that fits.
                if result_ty.byte_size() > 8 {
                    return Err(BuildError::ValueTooLarge(format!("{result_ty:?}")).into());
                }
                let byte_offset = struct_gep_byte_offset(agg_ty, indices)? as u32;
                let dest = self.operand_slot(Operand::Value(*id))?;
                let agg = self.operand_slot(*agg)?;
                self.instructions.push(BInst::ExtractValue { dest, agg, byte_offset });
            }
            ir::Instruction::Call { id, callee, args, .. } => {
                self.translate_call(*id, callee, args)?;
            }
            ir::Instruction::WithOverflow { result_id, overflow_id, op, ty, lhs, rhs } => {
                let opcode = overflow_opcode(*op, scalar_of(ty)?)?;
                let result = self.operand_slot(Operand::Value(*result_id))?;
                let overflow = self.operand_slot(Operand::Value(*overflow_id))?;
                let lhs = self.operand_slot(*lhs)?;
                let rhs = self.operand_slot(*rhs)?;
                self.instructions.push(BInst::Overflow { opcode, result, overflow, lhs, rhs });
            }
            ir::Instruction::MemIntrinsic { op, dst, src_or_val, len } => {
                let opcode = match op {
                    ir::MemOp::Memcpy => Opcode::LlvmMemcpy,
                    ir::MemOp::Memmove => Opcode::LlvmMemmove,
                    ir::MemOp::Memset => Opcode::LlvmMemset,
                };
                let dst = self.operand_slot(*dst)?;
                let src_or_val = self.operand_slot(*src_or_val)?;
                let len = self.operand_slot(*len)?;
                self.instructions.push(BInst::MemIntrinsic { opcode, dst, src_or_val, len });
            }
            ir::Instruction::Crc32 { id, crc, data } => {
                let dest = self.operand_slot(Operand::Value(*id))?;
                let crc = self.operand_slot(*crc)?;
                let data = self.operand_slot(*data)?;
                self.instructions.push(BInst::Binary { opcode: Opcode::LlvmSse42Crc32, dest, lhs: crc, rhs: data });
            }
            ir::Instruction::Phi { .. } => {
                // handled up front as part of `assign_slots`/`emit_phi_copies`;
                // a PHI never emits an instruction at its own position.
            }
        }
        Ok(())
    }

    fn translate_gep(&mut self, id: ValueId, source_ty: &Type, ptr: Operand, indices: &[Operand]) -> Result<()> {
        let dest = self.operand_slot(Operand::Value(id))?;
        let ptr_slot = self.operand_slot(ptr)?;
        let Some((first, rest)) = indices.split_first() else {
            return Err(BuildError::NotSupported("gep with no indices".into()).into());
        };

        let after_array = match first {
            Operand::Const(c) if c.as_i64() == 0 && rest.is_empty() => {
                // zero-index, single-step GEPs are merged as no-op aliases by
                // the analyser and never reach this point.
                ptr_slot
            }
            Operand::Const(c) => {
                let offset = (source_ty.byte_size() as i64 * c.as_i64()) as u32;
                if rest.is_empty() {
                    self.instructions.push(BInst::GepOffset { dest, ptr: ptr_slot, offset });
                    dest
                } else {
                    let tmp = dest;
                    self.instructions.push(BInst::GepOffset { dest: tmp, ptr: ptr_slot, offset });
                    tmp
                }
            }
            Operand::Value(_) => {
                let idx_slot = self.operand_slot(*first)?;
                let opcode = size_int_opcode_gep_array(source_ty.byte_size())?;
                self.instructions.push(BInst::GepArray {
                    opcode,
                    dest,
                    ptr: ptr_slot,
                    index: idx_slot,
                    elem_size: source_ty.byte_size() as u32,
                });
                dest
            }
        };

        let mut cur_ty = source_ty.clone();
        let mut cur_slot = after_array;
        for index in rest {
            let Operand::Const(c) = index else {
                return Err(BuildError::NotSupported("nested gep index into a struct must be constant".into()).into());
            };
            let field = c.as_u64() as u32;
            let offset = match &cur_ty {
                Type::Struct(fields) => Type::struct_element_offset(fields, field) as u32,
                Type::Array { element, .. } => element.byte_size() as u32 * field,
                other => return Err(BuildError::NotSupported(format!("cannot index into {other:?}")).into()),
            };
            self.instructions.push(BInst::GepOffset { dest, ptr: cur_slot, offset });
            cur_slot = dest;
            cur_ty = match &cur_ty {
                Type::Struct(fields) => fields[field as usize].clone(),
                Type::Array { element, .. } => (**element).clone(),
                _ => unreachable!(),
            };
        }
        Ok(())
    }

    fn translate_call(&mut self, id: Option<ValueId>, callee: &ir::Callee, args: &[Operand]) -> Result<()> {
        let dest = match id {
            Some(v) => Some(self.operand_slot(Operand::Value(v))?),
            None => None,
        };
        let mut arg_slots = Vec::with_capacity(args.len());
        for a in args {
            arg_slots.push(self.operand_slot(*a)?);
        }

        match callee {
            ir::Callee::Internal(name) => {
                let callee_index = if let Some(&idx) = self.sub_function_index.get(name) {
                    idx
                } else {
                    let sub = build_function(self.module, name, self.options, self.cache)?;
                    let idx = self.sub_functions.len() as u32;
                    self.sub_functions.push(sub);
                    self.sub_function_index.insert(name.clone(), idx);
                    idx
                };
                self.instructions.push(BInst::CallInternal { dest, callee_index, args: arg_slots });
            }
            ir::Callee::External(symbol) => {
                let context_index = self.external_call_contexts.len() as u32;
                self.external_call_contexts.push(ExternalCallContext {
                    symbol: symbol.clone(),
                    arg_count: arg_slots.len(),
                    has_return: dest.is_some(),
                });
                self.instructions.push(BInst::CallExternal { dest, context_index, args: arg_slots });
            }
            ir::Callee::Explicit(name) => {
                let opcode = match name.as_str() {
                    "pow" => Opcode::ExplicitCallPow,
                    "abs_i64" => Opcode::ExplicitCallAbsI64,
                    other => return Err(BuildError::NotSupported(format!("unknown explicit builtin '{other}'")).into()),
                };
                self.instructions.push(BInst::ExplicitCall { opcode, dest, args: arg_slots });
            }
        }
        Ok(())
    }

    fn into_bytecode_function(self) -> Result<BytecodeFunction> {
        let total_slots = self.slot_count + self.max_temp_slots;
        // the original packs a value slot index into `index_t` (a `uint16_t`);
        // a function needing more distinct slots than that can hold is rejected
        // at build time rather than silently truncated.
        u16::try_from(total_slots).map_err(|_| BuildError::TooManySlots)?;

        let mut out = BytecodeFunction::new(self.function.name.clone(), self.function.params.len(), self.function.ret_type.is_some());
        out.instructions = self.instructions;
        out.constants = self.constants;
        out.external_call_contexts = self.external_call_contexts;
        out.sub_functions = self.sub_functions;
        out.slot_count = total_slots as usize;
        Ok(out)
    }
}

fn element_type_at(agg_ty: &Type, indices: &[u32]) -> Result<Type> {
    let mut cur = agg_ty.clone();
    for &i in indices {
        cur = match &cur {
            Type::Struct(fields) => fields[i as usize].clone(),
            Type::Array { element, .. } => (**element).clone(),
            other => return Err(BuildError::NotSupported(format!("cannot extract from {other:?}")).into()),
        };
    }
    Ok(cur)
}

fn struct_gep_byte_offset(agg_ty: &Type, indices: &[u32]) -> Result<u64> {
    let mut cur = agg_ty.clone();
    let mut offset = 0u64;
    for &i in indices {
        offset += match &cur {
            Type::Struct(fields) => Type::struct_element_offset(fields, i),
            Type::Array { element, .. } => element.byte_size() * u64::from(i),
            other => return Err(BuildError::NotSupported(format!("cannot extract from {other:?}")).into()),
        };
        cur = match &cur {
            Type::Struct(fields) => fields[i as usize].clone(),
            Type::Array { element, .. } => (**element).clone(),
            _ => unreachable!(),
        };
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, Terminator};

    fn single_block_add() -> Function {
        let mut entry = BasicBlock::new(BlockId(0));
        entry.instructions.push(ir::Instruction::BinOp {
            id: ValueId(2),
            op: BinOp::Add,
            ty: Type::I32,
            lhs: Operand::Value(ValueId(0)),
            rhs: Operand::Value(ValueId(1)),
        });
        entry.terminator = Terminator::Ret(Some(Operand::Value(ValueId(2))));
        Function {
            name: "add".into(),
            params: vec![ValueId(0), ValueId(1)],
            param_types: vec![Type::I32, Type::I32],
            ret_type: Some(Type::I32),
            blocks: vec![entry],
        }
    }

    #[test]
    fn translates_a_simple_add_and_ret() {
        let f = single_block_add();
        let mut module = Module::new();
        module.add(f);
        let opts = TranslateOptions { register_allocator: RegisterAllocator::Greedy };
        let bf = build(&module, "add", &opts).unwrap();
        assert_eq!(bf.instructions.len(), 2);
        assert!(matches!(bf.instructions[0], bytecode::Instruction::Binary { opcode: Opcode::AddI32, .. }));
        assert!(matches!(bf.instructions[1], bytecode::Instruction::Ret { value: Some(_) }));
    }

    #[test]
    fn unknown_internal_callee_is_a_build_error() {
        let mut entry = BasicBlock::new(BlockId(0));
        entry.instructions.push(ir::Instruction::Call {
            id: Some(ValueId(1)),
            callee: ir::Callee::Internal("missing".into()),
            ret_ty: Some(Type::I32),
            args: vec![],
        });
        entry.terminator = Terminator::Ret(Some(Operand::Value(ValueId(1))));
        let f = Function { name: "f".into(), params: vec![], param_types: vec![], ret_type: Some(Type::I32), blocks: vec![entry] };
        let mut module = Module::new();
        module.add(f);
        let opts = TranslateOptions { register_allocator: RegisterAllocator::Greedy };
        let err = build(&module, "f", &opts).unwrap_err();
        assert!(matches!(err, crate::Error::Build(BuildError::UnknownFunction(_))));
    }
}
