//! The SSA function shape consumed by the bytecode builder (§6.1).
//!
//! This mirrors the LLVM-level contract the original core was built against
//! (basic blocks with a single terminator, PHI nodes at block heads, a closed
//! instruction set) without depending on an actual LLVM binding: callers build
//! `Function` values directly instead of parsing a textual IR.

use super::types::{Constant, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// An operand is either a previously defined value or an inline constant.
/// Keeping constants as a distinct operand form (rather than forcing every
/// constant through a value id first) mirrors `IsConstantValue`/`GetConstantValue`
/// being queried directly on an LLVM `Value*` operand.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    Value(ValueId),
    Const(Constant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    FDiv,
    FRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    SGt,
    SGe,
    SLt,
    SLe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    SExt,
    ZExt,
    Trunc,
    BitCast,
    PtrToInt,
    IntToPtr,
    FpTrunc,
    FpExt,
    FpToSi,
    FpToUi,
    SiToFp,
    UiToFp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowOp {
    UAdd,
    SAdd,
    USub,
    SSub,
    UMul,
    SMul,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOp {
    Memcpy,
    Memmove,
    Memset,
}

/// The callee of a `Call` instruction, resolved per §4.3's three call forms.
#[derive(Debug, Clone)]
pub enum Callee {
    /// A call to another `ir::Function` in the same `Module`, looked up by name.
    Internal(String),
    /// A call to a host function with no statically known wrapper; marshaled
    /// through the interpreter's call-trampoline registry (§9 FFI note).
    External(String),
    /// A call to a small, closed set of host functions the interpreter inlines
    /// a type-specialized handler for (the "fast path" of §4.5).
    Explicit(String),
}

#[derive(Debug, Clone)]
pub enum Instruction {
    BinOp {
        id: ValueId,
        op: BinOp,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    Cmp {
        id: ValueId,
        pred: Predicate,
        /// type of the operands being compared (result is always `Bool`)
        operand_ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    Cast {
        id: ValueId,
        op: CastOp,
        src_ty: Type,
        dst_ty: Type,
        value: Operand,
    },
    Load {
        id: ValueId,
        ty: Type,
        ptr: Operand,
    },
    Store {
        ty: Type,
        ptr: Operand,
        value: Operand,
    },
    /// `count` is the number of elements, `elem_ty` their type; `count == Const(1)`
    /// is the common fixed-size alloca.
    Alloca {
        id: ValueId,
        elem_ty: Type,
        count: Operand,
    },
    /// `source_ty` is the pointee type the first index walks into (matches
    /// `getelementptr`'s "source element type"); `indices[0]` walks the array
    /// dimension of `source_ty` itself, the rest walk nested array/struct types.
    Gep {
        id: ValueId,
        source_ty: Type,
        ptr: Operand,
        indices: Vec<Operand>,
    },
    Select {
        id: ValueId,
        ty: Type,
        cond: Operand,
        if_true: Operand,
        if_false: Operand,
    },
    /// `agg_ty` is the static type of the aggregate operand; indices walk
    /// nested array/struct types exactly as `Gep`'s do.
    ExtractValue {
        id: ValueId,
        agg_ty: Type,
        agg: Operand,
        indices: Vec<u32>,
    },
    Call {
        /// `None` for a void call.
        id: Option<ValueId>,
        callee: Callee,
        ret_ty: Option<Type>,
        args: Vec<Operand>,
    },
    /// A `*.with.overflow.*` intrinsic whose two observers (result, overflow
    /// flag) are named up front instead of being discovered via `extractvalue`
    /// (the analyser's overflow-capture pass, §4.1, folds the two into this
    /// shape at IR-construction time in this crate rather than at analysis time).
    WithOverflow {
        result_id: ValueId,
        overflow_id: ValueId,
        op: OverflowOp,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    MemIntrinsic {
        op: MemOp,
        dst: Operand,
        src_or_val: Operand,
        len: Operand,
    },
    /// The `llvm.x86.sse42.crc32` intrinsic family, restricted (as the
    /// original does) to its 64-bit form: `dst = crc32c(crc, data)`, both
    /// operands and the result `i64`.
    Crc32 {
        id: ValueId,
        crc: Operand,
        data: Operand,
    },
    Phi {
        id: ValueId,
        ty: Type,
        /// one entry per predecessor block
        incoming: Vec<(BlockId, Operand)>,
    },
}

impl Instruction {
    /// The value id this instruction defines, if any.
    #[must_use]
    pub fn result_id(&self) -> Option<ValueId> {
        match self {
            Instruction::BinOp { id, .. }
            | Instruction::Cmp { id, .. }
            | Instruction::Cast { id, .. }
            | Instruction::Load { id, .. }
            | Instruction::Alloca { id, .. }
            | Instruction::Gep { id, .. }
            | Instruction::Select { id, .. }
            | Instruction::ExtractValue { id, .. }
            | Instruction::Crc32 { id, .. }
            | Instruction::Phi { id, .. } => Some(*id),
            Instruction::Call { id, .. } => *id,
            Instruction::WithOverflow { .. }
            | Instruction::Store { .. }
            | Instruction::MemIntrinsic { .. } => None,
        }
    }

    /// Every value/operand this instruction reads, in emission order.
    #[must_use]
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Instruction::BinOp { lhs, rhs, .. } | Instruction::Cmp { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            Instruction::Cast { value, .. } => vec![*value],
            Instruction::Load { ptr, .. } => vec![*ptr],
            Instruction::Store { ptr, value, .. } => vec![*ptr, *value],
            Instruction::Alloca { count, .. } => vec![*count],
            Instruction::Gep { ptr, indices, .. } => {
                let mut ops = vec![*ptr];
                ops.extend(indices.iter().copied());
                ops
            }
            Instruction::Select { cond, if_true, if_false, .. } => {
                vec![*cond, *if_true, *if_false]
            }
            Instruction::ExtractValue { agg, .. } => vec![*agg],
            Instruction::Call { args, .. } => args.clone(),
            Instruction::WithOverflow { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instruction::MemIntrinsic { dst, src_or_val, len, .. } => {
                vec![*dst, *src_or_val, *len]
            }
            Instruction::Crc32 { crc, data, .. } => vec![*crc, *data],
            Instruction::Phi { incoming, .. } => incoming.iter().map(|(_, v)| *v).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Br(BlockId),
    CondBr { cond: Operand, if_true: BlockId, if_false: BlockId },
    Ret(Option<Operand>),
    Unreachable,
}

impl Terminator {
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br(b) => vec![*b],
            Terminator::CondBr { if_true, if_false, .. } => vec![*if_true, *if_false],
            Terminator::Ret(_) | Terminator::Unreachable => vec![],
        }
    }

    #[must_use]
    pub fn operand(&self) -> Option<Operand> {
        match self {
            Terminator::CondBr { cond, .. } => Some(*cond),
            Terminator::Ret(value) => *value,
            Terminator::Br(_) | Terminator::Unreachable => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub phis: Vec<Instruction>,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    #[must_use]
    pub fn new(id: BlockId) -> Self {
        BasicBlock { id, phis: Vec::new(), instructions: Vec::new(), terminator: Terminator::Unreachable }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// value ids of the function's arguments, in declaration order; these are
    /// "defined at index 0" per §4.1.
    pub params: Vec<ValueId>,
    pub param_types: Vec<Type>,
    pub ret_type: Option<Type>,
    /// entry block is `blocks[0]`.
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    #[must_use]
    pub fn entry(&self) -> &BasicBlock {
        &self.blocks[0]
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks.iter().find(|b| b.id == id).expect("unknown block id")
    }
}

/// A collection of functions an `Internal` call may reference by name.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub functions: std::collections::HashMap<String, Function>,
}

impl Module {
    #[must_use]
    pub fn new() -> Self {
        Module::default()
    }

    pub fn add(&mut self, function: Function) {
        self.functions.insert(function.name.clone(), function);
    }
}
