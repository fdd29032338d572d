//! End-to-end: `fn entry(a, b) -> i32 { add(a, b) }` calling a second
//! `ir::Function` in the same `Module` by name (§4.3's internal-call form),
//! run through `builder::build` -> `interpreter::execute` so cross-function
//! slot layout and the `CallInternal` dispatch are exercised for real.

use ssa_vm::builder::{build, RegisterAllocator, TranslateOptions};
use ssa_vm::interpreter::execute;
use ssa_vm::ir::{BasicBlock, BinOp, BlockId, Callee, Function, Instruction, Module, Operand, Terminator, Type, ValueId};

fn add_function() -> Function {
    let a = ValueId(0);
    let b = ValueId(1);
    let sum = ValueId(2);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.instructions.push(Instruction::BinOp {
        id: sum,
        op: BinOp::Add,
        ty: Type::I32,
        lhs: Operand::Value(a),
        rhs: Operand::Value(b),
    });
    entry.terminator = Terminator::Ret(Some(Operand::Value(sum)));

    Function {
        name: "add".into(),
        params: vec![a, b],
        param_types: vec![Type::I32, Type::I32],
        ret_type: Some(Type::I32),
        blocks: vec![entry],
    }
}

fn entry_function() -> Function {
    let a = ValueId(0);
    let b = ValueId(1);
    let result = ValueId(2);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.instructions.push(Instruction::Call {
        id: Some(result),
        callee: Callee::Internal("add".into()),
        ret_ty: Some(Type::I32),
        args: vec![Operand::Value(a), Operand::Value(b)],
    });
    entry.terminator = Terminator::Ret(Some(Operand::Value(result)));

    Function {
        name: "entry".into(),
        params: vec![a, b],
        param_types: vec![Type::I32, Type::I32],
        ret_type: Some(Type::I32),
        blocks: vec![entry],
    }
}

#[test]
fn internal_call_adds_four_and_six() {
    let mut module = Module::new();
    module.add(add_function());
    module.add(entry_function());
    let options = TranslateOptions { register_allocator: RegisterAllocator::Greedy };
    let function = build(&module, "entry", &options).unwrap();
    let result = execute(&function, &[4u32 as u64, 6u32 as u64]).unwrap();
    assert_eq!(result as i32, 10);
}
