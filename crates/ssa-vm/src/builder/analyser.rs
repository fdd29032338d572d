//! Liveness analysis and no-op alias merging (§4.1).
//!
//! Values get a `(first, last)` instruction-index live range computed over a
//! reverse-post-order (RPO) walk of the function's blocks. Function
//! arguments are defined at index 0; every other instruction gets a
//! monotonically increasing index as it is visited in RPO order. PHI
//! instructions are never assigned their own index — they extend live
//! ranges at the predecessor's terminator instead (see `extend_for_phis`).

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, Function, Instruction, Operand, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
    pub first: u32,
    pub last: u32,
}

impl Liveness {
    fn touch(&mut self, index: u32) {
        self.first = self.first.min(index);
        self.last = self.last.max(index);
    }
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub rpo: Vec<BlockId>,
    /// The index each block's terminator was assigned, keyed by block.
    pub terminator_index: HashMap<BlockId, u32>,
    /// The instruction index each block's first real instruction starts at
    /// (used for back-edge detection).
    pub block_start_index: HashMap<BlockId, u32>,
    pub liveness: HashMap<ValueId, Liveness>,
    /// No-op instructions (bitcast, same-width trunc/ptrtoint, zero-index
    /// GEP) map their own id to the operand they alias; they never get
    /// translated into bytecode and never get their own register.
    pub aliases: HashMap<ValueId, ValueId>,
    /// Canonical (non-aliased, non-argument) values in first-touched order,
    /// used by the naive allocator's tie-break (§4.1).
    pub value_order: Vec<ValueId>,
}

impl Analysis {
    /// Follows the alias chain to the value that actually owns a register.
    #[must_use]
    pub fn resolve(&self, id: ValueId) -> ValueId {
        let mut cur = id;
        while let Some(&next) = self.aliases.get(&cur) {
            cur = next;
        }
        cur
    }
}

#[must_use]
pub fn analyse(function: &Function) -> Analysis {
    let rpo = reverse_postorder(function);
    let mut rpo_position: HashMap<BlockId, usize> = HashMap::new();
    for (pos, b) in rpo.iter().enumerate() {
        rpo_position.insert(*b, pos);
    }

    let mut liveness: HashMap<ValueId, Liveness> = HashMap::new();
    let mut aliases: HashMap<ValueId, ValueId> = HashMap::new();
    let mut value_order: Vec<ValueId> = Vec::new();
    let mut terminator_index: HashMap<BlockId, u32> = HashMap::new();
    let mut block_start_index: HashMap<BlockId, u32> = HashMap::new();

    for &arg in &function.params {
        liveness.insert(arg, Liveness { first: 0, last: 0 });
    }

    let mut index: u32 = 1;
    for &block_id in &rpo {
        let block = function.block(block_id);
        block_start_index.insert(block_id, index);

        for inst in &block.instructions {
            let this_index = index;
            index += 1;

            if let Some(alias_of) = no_op_alias_target(inst, &aliases) {
                let id = inst.result_id().expect("no-op candidates always define a value");
                aliases.insert(id, alias_of);
                // the alias still "touches" its operand at this point.
                touch(&mut liveness, alias_of, this_index);
                continue;
            }

            if let Some(id) = inst.result_id() {
                liveness.entry(id).or_insert(Liveness { first: this_index, last: this_index });
                touch(&mut liveness, id, this_index);
                value_order.push(id);
            }
            for operand in inst.operands() {
                if let Operand::Value(v) = operand {
                    let canonical = resolve_chain(&aliases, v);
                    touch(&mut liveness, canonical, this_index);
                }
            }
        }

        let term_index = index;
        index += 1;
        terminator_index.insert(block_id, term_index);
        if let Some(Operand::Value(v)) = block.terminator.operand() {
            let canonical = resolve_chain(&aliases, v);
            touch(&mut liveness, canonical, term_index);
        }
    }

    extend_for_phis(function, &rpo, &terminator_index, &aliases, &mut liveness);
    extend_for_back_edges(function, &rpo, &rpo_position, &terminator_index, &block_start_index, &mut liveness);

    Analysis { rpo, terminator_index, block_start_index, liveness, aliases, value_order }
}

fn touch(liveness: &mut HashMap<ValueId, Liveness>, id: ValueId, index: u32) {
    liveness.entry(id).or_insert(Liveness { first: index, last: index }).touch(index);
}

fn resolve_chain(aliases: &HashMap<ValueId, ValueId>, id: ValueId) -> ValueId {
    let mut cur = id;
    while let Some(&next) = aliases.get(&cur) {
        cur = next;
    }
    cur
}

/// Identifies the no-op instruction shapes of §4.1: a bitcast, a
/// same-width trunc/ptrtoint, or a zero-index GEP. Returns the canonical
/// value id the instruction's result should alias to.
fn no_op_alias_target(inst: &Instruction, aliases: &HashMap<ValueId, ValueId>) -> Option<ValueId> {
    match inst {
        Instruction::Cast { op, src_ty, dst_ty, value, .. } => {
            let same_width = src_ty.byte_size() == dst_ty.byte_size();
            let is_noop = matches!(op, crate::ir::CastOp::BitCast)
                || (matches!(op, crate::ir::CastOp::Trunc | crate::ir::CastOp::PtrToInt) && same_width);
            if is_noop {
                match value {
                    Operand::Value(v) => Some(resolve_chain(aliases, *v)),
                    Operand::Const(_) => None,
                }
            } else {
                None
            }
        }
        Instruction::Gep { ptr, indices, .. } => {
            let all_zero = indices.iter().all(|op| matches!(op, Operand::Const(c) if c.as_i64() == 0));
            if all_zero {
                match ptr {
                    Operand::Value(v) => Some(resolve_chain(aliases, *v)),
                    Operand::Const(_) => None,
                }
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Extends live ranges across PHI resolution points (§4.1): the PHI's own
/// destination is touched at the predecessor's terminator index, and the
/// incoming value for that predecessor is kept alive one index further, to
/// survive the copy the translator inserts before the branch.
fn extend_for_phis(
    function: &Function,
    rpo: &[BlockId],
    terminator_index: &HashMap<BlockId, u32>,
    aliases: &HashMap<ValueId, ValueId>,
    liveness: &mut HashMap<ValueId, Liveness>,
) {
    for &block_id in rpo {
        let block = function.block(block_id);
        let term_idx = terminator_index[&block_id];
        for succ in block.terminator.successors() {
            for phi in &function.block(succ).phis {
                let Instruction::Phi { id, incoming, .. } = phi else { continue };
                touch(liveness, resolve_chain(aliases, *id), term_idx);
                if let Some((_, Operand::Value(v))) = incoming.iter().find(|(from, _)| *from == block_id) {
                    touch(liveness, resolve_chain(aliases, *v), term_idx + 1);
                }
            }
        }
    }
}

/// A successor already visited earlier in RPO order is a back-edge target
/// (a loop header). Any value whose live range strictly spans that target's
/// first instruction index must stay live through the back-edge, or the
/// allocator could hand its register to something else mid-loop.
fn extend_for_back_edges(
    function: &Function,
    rpo: &[BlockId],
    rpo_position: &HashMap<BlockId, usize>,
    terminator_index: &HashMap<BlockId, u32>,
    block_start_index: &HashMap<BlockId, u32>,
    liveness: &mut HashMap<ValueId, Liveness>,
) {
    for (pos, &block_id) in rpo.iter().enumerate() {
        let block = function.block(block_id);
        for succ in block.terminator.successors() {
            let succ_pos = rpo_position[&succ];
            if succ_pos > pos {
                continue; // forward edge
            }
            let target_first = block_start_index[&succ];
            let term_idx = terminator_index[&block_id];
            for live in liveness.values_mut() {
                if live.first < target_first && target_first < live.last {
                    live.last = live.last.max(term_idx + 1);
                }
            }
        }
    }
}

fn reverse_postorder(function: &Function) -> Vec<BlockId> {
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    visit(function, function.entry().id, &mut visited, &mut postorder);
    postorder.reverse();
    postorder
}

fn visit(function: &Function, block: BlockId, visited: &mut HashSet<BlockId>, postorder: &mut Vec<BlockId>) {
    if !visited.insert(block) {
        return;
    }
    for succ in function.block(block).terminator.successors() {
        visit(function, succ, visited, postorder);
    }
    postorder.push(block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock as Block, Operand as Op, Terminator, Type};

    fn linear_function() -> Function {
        let mut entry = Block::new(BlockId(0));
        entry.instructions.push(Instruction::BinOp {
            id: ValueId(1),
            op: crate::ir::BinOp::Add,
            ty: Type::I32,
            lhs: Op::Value(ValueId(0)),
            rhs: Op::Const(crate::ir::Constant::I32(1)),
        });
        entry.terminator = Terminator::Ret(Some(Op::Value(ValueId(1))));

        Function {
            name: "f".into(),
            params: vec![ValueId(0)],
            param_types: vec![Type::I32],
            ret_type: Some(Type::I32),
            blocks: vec![entry],
        }
    }

    #[test]
    fn argument_is_defined_at_index_zero() {
        let f = linear_function();
        let a = analyse(&f);
        assert_eq!(a.liveness[&ValueId(0)].first, 0);
    }

    #[test]
    fn rpo_starts_at_entry() {
        let f = linear_function();
        let a = analyse(&f);
        assert_eq!(a.rpo[0], BlockId(0));
    }

    #[test]
    fn zero_index_gep_aliases_its_pointer() {
        let mut entry = Block::new(BlockId(0));
        entry.instructions.push(Instruction::Gep {
            id: ValueId(1),
            source_ty: Type::I32,
            ptr: Op::Value(ValueId(0)),
            indices: vec![Op::Const(crate::ir::Constant::I64(0))],
        });
        entry.terminator = Terminator::Ret(Some(Op::Value(ValueId(1))));
        let f = Function {
            name: "f".into(),
            params: vec![ValueId(0)],
            param_types: vec![Type::Ptr],
            ret_type: Some(Type::I32),
            blocks: vec![entry],
        };
        let a = analyse(&f);
        assert_eq!(a.resolve(ValueId(1)), ValueId(0));
    }
}
