//! End-to-end: `fn entry(a: i32) -> i32 { let mut i = 0; let mut a = a; while i < 10 { i += 1; a -= 1; } a }`
//!
//! `i` and `a` are both block-head PHIs on the same back edge, exercised
//! through the real `builder::build` -> `interpreter::execute` pipeline
//! (rather than hand-assembled bytecode) so a regression in the translator's
//! self-successor PHI lowering shows up here.

use ssa_vm::builder::{build, RegisterAllocator, TranslateOptions};
use ssa_vm::interpreter::execute;
use ssa_vm::ir::{BasicBlock, BinOp, BlockId, Constant, Function, Instruction, Module, Operand, Predicate, Terminator, Type, ValueId};

fn loop_with_phi() -> Function {
    let a_param = ValueId(0);
    let i_loop = ValueId(1);
    let a_loop = ValueId(2);
    let i_next = ValueId(3);
    let a_next = ValueId(4);
    let cond_exit = ValueId(5);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.terminator = Terminator::Br(BlockId(1));

    let mut loop_block = BasicBlock::new(BlockId(1));
    loop_block.phis.push(Instruction::Phi {
        id: i_loop,
        ty: Type::I32,
        incoming: vec![(BlockId(0), Operand::Const(Constant::I32(0))), (BlockId(1), Operand::Value(i_next))],
    });
    loop_block.phis.push(Instruction::Phi {
        id: a_loop,
        ty: Type::I32,
        incoming: vec![(BlockId(0), Operand::Value(a_param)), (BlockId(1), Operand::Value(a_next))],
    });
    loop_block.instructions.push(Instruction::Cmp {
        id: cond_exit,
        pred: Predicate::SGe,
        operand_ty: Type::I32,
        lhs: Operand::Value(i_loop),
        rhs: Operand::Const(Constant::I32(10)),
    });
    loop_block.instructions.push(Instruction::BinOp {
        id: i_next,
        op: BinOp::Add,
        ty: Type::I32,
        lhs: Operand::Value(i_loop),
        rhs: Operand::Const(Constant::I32(1)),
    });
    loop_block.instructions.push(Instruction::BinOp {
        id: a_next,
        op: BinOp::Sub,
        ty: Type::I32,
        lhs: Operand::Value(a_loop),
        rhs: Operand::Const(Constant::I32(1)),
    });
    loop_block.terminator =
        Terminator::CondBr { cond: Operand::Value(cond_exit), if_true: BlockId(2), if_false: BlockId(1) };

    let mut exit = BasicBlock::new(BlockId(2));
    exit.terminator = Terminator::Ret(Some(Operand::Value(a_loop)));

    Function {
        name: "entry".into(),
        params: vec![a_param],
        param_types: vec![Type::I32],
        ret_type: Some(Type::I32),
        blocks: vec![entry, loop_block, exit],
    }
}

#[test]
fn loop_with_phi_decrements_a_ten_times() {
    let mut module = Module::new();
    module.add(loop_with_phi());
    let options = TranslateOptions { register_allocator: RegisterAllocator::Greedy };
    let function = build(&module, "entry", &options).unwrap();
    let result = execute(&function, &[44u32 as u64]).unwrap();
    assert_eq!(result as i32, 34);
}

#[test]
fn loop_with_phi_naive_allocator_agrees() {
    let mut module = Module::new();
    module.add(loop_with_phi());
    let options = TranslateOptions { register_allocator: RegisterAllocator::Naive };
    let function = build(&module, "entry", &options).unwrap();
    let result = execute(&function, &[44u32 as u64]).unwrap();
    assert_eq!(result as i32, 34);
}
