use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use ssa_vm::builder::{build, RegisterAllocator, TranslateOptions};
use ssa_vm::interpreter;
use ssa_vm::ir::{
    BasicBlock, BinOp, BlockId, Callee, Constant, Function, Instruction, Module, Operand,
    OverflowOp, Predicate, Terminator, Type, ValueId,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "ssa-vm")]
#[command(about = "Bytecode builder and interpreter for a typed SSA-form IR")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a built-in example program to bytecode and print it.
    Dump {
        #[arg(value_enum, help = "Which example program to build")]
        example: Example,

        #[arg(long, value_enum, default_value = "greedy", help = "Register allocation strategy")]
        regalloc: Regalloc,
    },
    /// Translate and execute a built-in example program, printing its result.
    Run {
        #[arg(value_enum, help = "Which example program to build")]
        example: Example,

        #[arg(long, value_enum, default_value = "greedy", help = "Register allocation strategy")]
        regalloc: Regalloc,

        #[arg(long, help = "Arguments to pass to the entry function", num_args = 0..)]
        args: Vec<i64>,
    },
    /// Print the interpreter and builder version.
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum Example {
    /// `fn add(a: i32, b: i32) -> i32 { a + b }`
    Add,
    /// `fn countdown(n: i32) -> i32 { while n != 0 { n -= 1 } n }`, exercising
    /// a back edge and a block-head PHI.
    Countdown,
    /// `fn checked_add(a: u32, b: u32) -> i32 { select(overflow, -1, a + b) }`
    Overflow,
    /// `fn sum_to(n: i32) -> i32 { n == 0 ? 0 : n + sum_to(n - 1) }`, an
    /// internal call into a recursively translated sub-function.
    Recurse,
}

#[derive(Clone, Copy, ValueEnum)]
enum Regalloc {
    Naive,
    Greedy,
}

impl From<Regalloc> for RegisterAllocator {
    fn from(value: Regalloc) -> Self {
        match value {
            Regalloc::Naive => RegisterAllocator::Naive,
            Regalloc::Greedy => RegisterAllocator::Greedy,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dump { example, regalloc } => {
            let module = build_example_module(example);
            let options = TranslateOptions { register_allocator: regalloc.into() };
            let function =
                build(&module, "entry", &options).context("translating example to bytecode")?;
            print!("{}", function.dump_contents());
        }
        Commands::Run { example, regalloc, args } => {
            let module = build_example_module(example);
            let options = TranslateOptions { register_allocator: regalloc.into() };
            let function =
                build(&module, "entry", &options).context("translating example to bytecode")?;
            let arguments: Vec<u64> = args.iter().map(|&a| a as u64).collect();
            let result = interpreter::execute(&function, &arguments).context("executing bytecode")?;
            println!("{}", result as i64);
        }
        Commands::Version => {
            println!("ssa-vm {VERSION}");
        }
    }

    Ok(())
}

fn build_example_module(example: Example) -> Module {
    let mut module = Module::new();
    match example {
        Example::Add => module.add(add_example()),
        Example::Countdown => module.add(countdown_example()),
        Example::Overflow => module.add(overflow_example()),
        Example::Recurse => {
            module.add(recurse_entry_example());
            module.add(sum_to_example());
        }
    }
    module
}

/// `fn entry(a: i32, b: i32) -> i32 { a + b }`
fn add_example() -> Function {
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
        name: "entry".into(),
        params: vec![a, b],
        param_types: vec![Type::I32, Type::I32],
        ret_type: Some(Type::I32),
        blocks: vec![entry],
    }
}

/// `fn entry(n: i32) -> i32 { while n != 0 { n -= 1 } n }`
///
/// `loop` is its own predecessor, so the PHI for `n` exercises the
/// self-successor swap (the lost-copy problem) rather than a plain copy.
fn countdown_example() -> Function {
    let n_param = ValueId(0);
    let n_loop = ValueId(1);
    let n_next = ValueId(2);
    let cond = ValueId(3);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.terminator = Terminator::Br(BlockId(1));

    let mut loop_block = BasicBlock::new(BlockId(1));
    loop_block.phis.push(Instruction::Phi {
        id: n_loop,
        ty: Type::I32,
        incoming: vec![(BlockId(0), Operand::Value(n_param)), (BlockId(1), Operand::Value(n_next))],
    });
    loop_block.instructions.push(Instruction::Cmp {
        id: cond,
        pred: Predicate::Eq,
        operand_ty: Type::I32,
        lhs: Operand::Value(n_loop),
        rhs: Operand::Const(Constant::I32(0)),
    });
    loop_block.instructions.push(Instruction::BinOp {
        id: n_next,
        op: BinOp::Sub,
        ty: Type::I32,
        lhs: Operand::Value(n_loop),
        rhs: Operand::Const(Constant::I32(1)),
    });
    loop_block.terminator =
        Terminator::CondBr { cond: Operand::Value(cond), if_true: BlockId(2), if_false: BlockId(1) };

    let mut exit = BasicBlock::new(BlockId(2));
    exit.terminator = Terminator::Ret(Some(Operand::Value(n_loop)));

    Function {
        name: "entry".into(),
        params: vec![n_param],
        param_types: vec![Type::I32],
        ret_type: Some(Type::I32),
        blocks: vec![entry, loop_block, exit],
    }
}

/// `fn entry(a: u32, b: u32) -> i32 { let (s, ovf) = a.overflowing_add(b); if ovf { -1 } else { s as i32 } }`
fn overflow_example() -> Function {
    let a = ValueId(0);
    let b = ValueId(1);
    let sum = ValueId(2);
    let did_overflow = ValueId(3);
    let result = ValueId(4);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.instructions.push(Instruction::WithOverflow {
        result_id: sum,
        overflow_id: did_overflow,
        op: OverflowOp::UAdd,
        ty: Type::I32,
        lhs: Operand::Value(a),
        rhs: Operand::Value(b),
    });
    entry.instructions.push(Instruction::Select {
        id: result,
        ty: Type::I32,
        cond: Operand::Value(did_overflow),
        if_true: Operand::Const(Constant::I32(-1)),
        if_false: Operand::Value(sum),
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

/// `fn entry(n: i32) -> i32 { sum_to(n) }`
fn recurse_entry_example() -> Function {
    let n = ValueId(0);
    let result = ValueId(1);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.instructions.push(Instruction::Call {
        id: Some(result),
        callee: Callee::Internal("sum_to".into()),
        ret_ty: Some(Type::I32),
        args: vec![Operand::Value(n)],
    });
    entry.terminator = Terminator::Ret(Some(Operand::Value(result)));

    Function {
        name: "entry".into(),
        params: vec![n],
        param_types: vec![Type::I32],
        ret_type: Some(Type::I32),
        blocks: vec![entry],
    }
}

/// `fn sum_to(n: i32) -> i32 { if n == 0 { 0 } else { n + sum_to(n - 1) } }`
fn sum_to_example() -> Function {
    let n = ValueId(0);
    let is_zero = ValueId(1);
    let n_minus_one = ValueId(2);
    let recursive_result = ValueId(3);
    let sum = ValueId(4);

    let mut entry = BasicBlock::new(BlockId(0));
    entry.instructions.push(Instruction::Cmp {
        id: is_zero,
        pred: Predicate::Eq,
        operand_ty: Type::I32,
        lhs: Operand::Value(n),
        rhs: Operand::Const(Constant::I32(0)),
    });
    entry.terminator =
        Terminator::CondBr { cond: Operand::Value(is_zero), if_true: BlockId(1), if_false: BlockId(2) };

    let mut base_case = BasicBlock::new(BlockId(1));
    base_case.terminator = Terminator::Ret(Some(Operand::Const(Constant::I32(0))));

    let mut recursive_case = BasicBlock::new(BlockId(2));
    recursive_case.instructions.push(Instruction::BinOp {
        id: n_minus_one,
        op: BinOp::Sub,
        ty: Type::I32,
        lhs: Operand::Value(n),
        rhs: Operand::Const(Constant::I32(1)),
    });
    recursive_case.instructions.push(Instruction::Call {
        id: Some(recursive_result),
        callee: Callee::Internal("sum_to".into()),
        ret_ty: Some(Type::I32),
        args: vec![Operand::Value(n_minus_one)],
    });
    recursive_case.instructions.push(Instruction::BinOp {
        id: sum,
        op: BinOp::Add,
        ty: Type::I32,
        lhs: Operand::Value(n),
        rhs: Operand::Value(recursive_result),
    });
    recursive_case.terminator = Terminator::Ret(Some(Operand::Value(sum)));

    Function {
        name: "sum_to".into(),
        params: vec![n],
        param_types: vec![Type::I32],
        ret_type: Some(Type::I32),
        blocks: vec![entry, base_case, recursive_case],
    }
}
