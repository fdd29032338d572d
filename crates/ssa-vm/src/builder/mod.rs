//! Turns an `ir::Function` into a `bytecode::BytecodeFunction` (§4): analyse
//! liveness, allocate registers, translate instructions, resolve branch
//! relocations. `build` is the sole public entry point; the three stages are
//! otherwise only reachable through it, matching the original's
//! `Analyse -> Allocate -> Translate -> Finalize` pipeline being internal to
//! `BytecodeBuilder::CreateBytecodeFunction`.

pub mod analyser;
pub mod regalloc;
pub mod translate;

pub use regalloc::RegisterAllocator;
pub use translate::{build, TranslateOptions};
