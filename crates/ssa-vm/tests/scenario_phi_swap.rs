//! End-to-end: a two-iteration loop whose block head carries a pair of PHIs
//! that swap on every back edge (§4.3's lost-copy/PHI-swap problem), run
//! through `builder::build` -> `interpreter::execute` so the translator's
//! self-successor swap is exercised for real rather than via hand-written
//! bytecode.
//!
//! `a` starts at the argument, `b` starts at 0; each iteration sets the next
//! `a` to the current `b` and the next `b` to the current `a`. A swap is its
//! own inverse, so after an even number of iterations `a` is back to the
//! original argument.

use ssa_vm::builder::{build, RegisterAllocator, TranslateOptions};
use ssa_vm::interpreter::execute;
use ssa_vm::ir::{BasicBlock, BinOp, BlockId, Constant, Function, Instruction, Module, Operand, Predicate, Terminator, Type, ValueId};

fn phi_swap() -> Function {
    let a_param = ValueId(0);
    let i_loop = ValueId(1);
    let a_loop = ValueId(2);
    let b_loop = ValueId(3);
    let cond_exit = ValueId(4);
    let i_next = ValueId(5);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.terminator = Terminator::Br(BlockId(1));

    let mut loop_block = BasicBlock::new(BlockId(1));
    loop_block.phis.push(Instruction::Phi {
        id: i_loop,
        ty: Type::I32,
        incoming: vec![(BlockId(0), Operand::Const(Constant::I32(0))), (BlockId(1), Operand::Value(i_next))],
    });
    // the swap: next a <- current b, next b <- current a
    loop_block.phis.push(Instruction::Phi {
        id: a_loop,
        ty: Type::I32,
        incoming: vec![(BlockId(0), Operand::Value(a_param)), (BlockId(1), Operand::Value(b_loop))],
    });
    loop_block.phis.push(Instruction::Phi {
        id: b_loop,
        ty: Type::I32,
        incoming: vec![(BlockId(0), Operand::Const(Constant::I32(0))), (BlockId(1), Operand::Value(a_loop))],
    });
    loop_block.instructions.push(Instruction::Cmp {
        id: cond_exit,
        pred: Predicate::SGe,
        operand_ty: Type::I32,
        lhs: Operand::Value(i_loop),
        rhs: Operand::Const(Constant::I32(2)),
    });
    loop_block.instructions.push(Instruction::BinOp {
        id: i_next,
        op: BinOp::Add,
        ty: Type::I32,
        lhs: Operand::Value(i_loop),
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
fn two_swaps_return_to_the_original_value() {
    let mut module = Module::new();
    module.add(phi_swap());
    let options = TranslateOptions { register_allocator: RegisterAllocator::Greedy };
    let function = build(&module, "entry", &options).unwrap();
    let result = execute(&function, &[44u32 as u64]).unwrap();
    assert_eq!(result as i32, 44);
}

#[test]
fn two_swaps_naive_allocator_agrees() {
    let mut module = Module::new();
    module.add(phi_swap());
    let options = TranslateOptions { register_allocator: RegisterAllocator::Naive };
    let function = build(&module, "entry", &options).unwrap();
    let result = execute(&function, &[44u32 as u64]).unwrap();
    assert_eq!(result as i32, 44);
}
