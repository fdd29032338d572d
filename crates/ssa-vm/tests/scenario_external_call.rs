//! End-to-end: `fn entry(a, b) -> i32 { scenario_external_call_add(a, b) }`, where
//! the callee is a host trampoline registered through `interpreter::ffi`
//! rather than another `ir::Function`, run through `builder::build` ->
//! `interpreter::execute` so the `CallExternal` emission and the
//! `ExternalCallContext` plumbing are exercised for real.

use ssa_vm::interpreter::execute;
use ssa_vm::interpreter::ffi::register_external;
use ssa_vm::builder::{build, RegisterAllocator, TranslateOptions};
use ssa_vm::ir::{BasicBlock, BlockId, Callee, Function, Instruction, Module, Operand, Terminator, Type, ValueId};

fn external_call() -> Function {
    let a = ValueId(0);
    let b = ValueId(1);
    let result = ValueId(2);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.instructions.push(Instruction::Call {
        id: Some(result),
        callee: Callee::External("scenario_external_call_add".into()),
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
fn external_call_adds_four_and_six() {
    register_external("scenario_external_call_add", |args: &[u64]| args[0].wrapping_add(args[1]));

    let mut module = Module::new();
    module.add(external_call());
    let options = TranslateOptions { register_allocator: RegisterAllocator::Greedy };
    let function = build(&module, "entry", &options).unwrap();
    let result = execute(&function, &[4u32 as u64, 6u32 as u64]).unwrap();
    assert_eq!(result as i32, 10);
}
