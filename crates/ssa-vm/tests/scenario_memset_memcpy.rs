//! End-to-end: allocate two 16-byte buffers, fill the first with `0xAB` via
//! `memset`, copy it into the second via `memcpy`, then read back one byte of
//! the copy through a `Gep` + `Load`, run through `builder::build` ->
//! `interpreter::execute` so the allocation/intrinsic/pointer-arithmetic path
//! is exercised for real rather than via hand-built bytecode.

use ssa_vm::builder::{build, RegisterAllocator, TranslateOptions};
use ssa_vm::interpreter::execute;
use ssa_vm::ir::{BasicBlock, BlockId, Constant, Function, Instruction, MemOp, Module, Operand, Terminator, Type, ValueId};

fn memset_memcpy() -> Function {
    let src = ValueId(0);
    let dst = ValueId(1);
    let byte_ptr = ValueId(2);
    let byte_val = ValueId(3);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.instructions.push(Instruction::Alloca {
        id: src,
        elem_ty: Type::I8,
        count: Operand::Const(Constant::I32(16)),
    });
    entry.instructions.push(Instruction::Alloca {
        id: dst,
        elem_ty: Type::I8,
        count: Operand::Const(Constant::I32(16)),
    });
    entry.instructions.push(Instruction::MemIntrinsic {
        op: MemOp::Memset,
        dst: Operand::Value(src),
        src_or_val: Operand::Const(Constant::I8(-85)), // bit pattern 0xAB
        len: Operand::Const(Constant::I32(16)),
    });
    entry.instructions.push(Instruction::MemIntrinsic {
        op: MemOp::Memcpy,
        dst: Operand::Value(dst),
        src_or_val: Operand::Value(src),
        len: Operand::Const(Constant::I32(16)),
    });
    entry.instructions.push(Instruction::Gep {
        id: byte_ptr,
        source_ty: Type::I8,
        ptr: Operand::Value(dst),
        indices: vec![Operand::Const(Constant::I32(7))],
    });
    entry.instructions.push(Instruction::Load { id: byte_val, ty: Type::I8, ptr: Operand::Value(byte_ptr) });
    entry.terminator = Terminator::Ret(Some(Operand::Value(byte_val)));

    Function {
        name: "entry".into(),
        params: vec![],
        param_types: vec![],
        ret_type: Some(Type::I8),
        blocks: vec![entry],
    }
}

#[test]
fn copied_byte_matches_the_memset_fill() {
    let mut module = Module::new();
    module.add(memset_memcpy());
    let options = TranslateOptions { register_allocator: RegisterAllocator::Greedy };
    let function = build(&module, "entry", &options).unwrap();
    let result = execute(&function, &[]).unwrap();
    assert_eq!(result as u8, 0xAB);
}
