//! End-to-end: `f(a, b) = (a+b == 10 && !ovf_add) && ((i32::MIN - b) == 2147483642 && ovf_sub)`.
//!
//! The second half models the documented overflow scenario: `2147483648`
//! does not fit in `i32`, so its bit pattern is `i32::MIN`, and subtracting
//! from it overflows in signed arithmetic (never in unsigned, since the
//! operand only decreases).

use ssa_vm::builder::{build, RegisterAllocator, TranslateOptions};
use ssa_vm::interpreter::execute;
use ssa_vm::ir::{BasicBlock, BinOp, BlockId, Constant, Function, Instruction, Module, Operand, OverflowOp, Predicate, Terminator, Type, ValueId};

fn overflow_intrinsics() -> Function {
    let a = ValueId(0);
    let b = ValueId(1);
    let sum = ValueId(2);
    let ovf_add = ValueId(3);
    let sum_is_ten = ValueId(4);
    let add_clean = ValueId(5);
    let part1 = ValueId(6);
    let diff = ValueId(7);
    let ovf_sub = ValueId(8);
    let diff_matches = ValueId(9);
    let part2 = ValueId(10);
    let result = ValueId(11);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.instructions.push(Instruction::WithOverflow {
        result_id: sum,
        overflow_id: ovf_add,
        op: OverflowOp::UAdd,
        ty: Type::I32,
        lhs: Operand::Value(a),
        rhs: Operand::Value(b),
    });
    entry.instructions.push(Instruction::Cmp {
        id: sum_is_ten,
        pred: Predicate::Eq,
        operand_ty: Type::I32,
        lhs: Operand::Value(sum),
        rhs: Operand::Const(Constant::I32(10)),
    });
    entry.instructions.push(Instruction::Cmp {
        id: add_clean,
        pred: Predicate::Eq,
        operand_ty: Type::Bool,
        lhs: Operand::Value(ovf_add),
        rhs: Operand::Const(Constant::Bool(false)),
    });
    entry.instructions.push(Instruction::BinOp {
        id: part1,
        op: BinOp::And,
        ty: Type::Bool,
        lhs: Operand::Value(sum_is_ten),
        rhs: Operand::Value(add_clean),
    });
    entry.instructions.push(Instruction::WithOverflow {
        result_id: diff,
        overflow_id: ovf_sub,
        op: OverflowOp::SSub,
        ty: Type::I32,
        lhs: Operand::Const(Constant::I32(i32::MIN)),
        rhs: Operand::Value(b),
    });
    entry.instructions.push(Instruction::Cmp {
        id: diff_matches,
        pred: Predicate::Eq,
        operand_ty: Type::I32,
        lhs: Operand::Value(diff),
        rhs: Operand::Const(Constant::I32(2_147_483_642)),
    });
    entry.instructions.push(Instruction::BinOp {
        id: part2,
        op: BinOp::And,
        ty: Type::Bool,
        lhs: Operand::Value(diff_matches),
        rhs: Operand::Value(ovf_sub),
    });
    entry.instructions.push(Instruction::BinOp {
        id: result,
        op: BinOp::And,
        ty: Type::Bool,
        lhs: Operand::Value(part1),
        rhs: Operand::Value(part2),
    });
    entry.terminator = Terminator::Ret(Some(Operand::Value(result)));

    Function {
        name: "entry".into(),
        params: vec![a, b],
        param_types: vec![Type::I32, Type::I32],
        ret_type: Some(Type::Bool),
        blocks: vec![entry],
    }
}

#[test]
fn overflow_scenario_with_four_and_six_is_true() {
    let mut module = Module::new();
    module.add(overflow_intrinsics());
    let options = TranslateOptions { register_allocator: RegisterAllocator::Greedy };
    let function = build(&module, "entry", &options).unwrap();
    let result = execute(&function, &[4u32 as u64, 6u32 as u64]).unwrap();
    assert_eq!(result, 1);
}
