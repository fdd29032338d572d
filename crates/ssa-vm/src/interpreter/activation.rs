//! The per-execution activation record (§5): value slots, scratch
//! allocations, and typed slot access.
//!
//! Grounded on `bytecode_interpreter.cpp`'s `InitializeActivationRecord` /
//! `AllocateMemory` for the shape (a flat `values_` vector plus an
//! allocations list released en masse at teardown). The original treats a
//! value slot's contents as a raw pointer and dereferences it directly; this
//! workspace denies `unsafe_code`, so pointers here are opaque handles into
//! `Activation::allocations` rather than real addresses (see `Pointer`
//! below and DESIGN.md).

use crate::bytecode::ExternalCallContext;
use crate::error::{ExecutionError, Result};

/// A pointer value as it lives in a 64-bit value slot: the high 32 bits name
/// one of the activation's scratch allocations (1-based; 0 is the null/
/// invalid pointer), the low 32 bits are a byte offset into it. `alloca`,
/// `gep_offset`, and `gep_array` only ever produce or advance one of these;
/// `load`/`store`/the mem intrinsics are the only opcodes that resolve one
/// into actual bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointer {
    pub alloc_id: u32,
    pub offset: u32,
}

impl Pointer {
    pub const NULL: Pointer = Pointer { alloc_id: 0, offset: 0 };

    #[must_use]
    pub fn to_bits(self) -> u64 {
        (u64::from(self.alloc_id) << 32) | u64::from(self.offset)
    }

    #[must_use]
    pub fn from_bits(bits: u64) -> Pointer {
        Pointer { alloc_id: (bits >> 32) as u32, offset: bits as u32 }
    }

    /// Advances the offset by a signed byte delta, keeping the same
    /// allocation (the `gep_offset`/`gep_array` contract); out-of-range
    /// results are caught at the next actual memory access, not here.
    #[must_use]
    pub fn add_offset(self, delta: i64) -> Pointer {
        let new_offset = (i64::from(self.offset) + delta) as u32;
        Pointer { alloc_id: self.alloc_id, offset: new_offset }
    }
}

/// A scalar that can be reinterpreted to and from the bit pattern of a
/// 64-bit value slot (§5 "Typed slot access"): reads sign/zero-extend or
/// bit-reinterpret per the opcode's type, writes store the low bits and
/// leave the rest of the slot undefined (zeroed here, for determinism).
pub trait SlotValue: Copy {
    fn from_bits(bits: u64) -> Self;
    fn to_bits(self) -> u64;
}

macro_rules! int_slot_value {
    ($ty:ty, $unsigned:ty) => {
        impl SlotValue for $ty {
            fn from_bits(bits: u64) -> Self {
                bits as $unsigned as $ty
            }
            fn to_bits(self) -> u64 {
                u64::from(self as $unsigned)
            }
        }
    };
}

int_slot_value!(i8, u8);
int_slot_value!(u8, u8);
int_slot_value!(i16, u16);
int_slot_value!(u16, u16);
int_slot_value!(i32, u32);
int_slot_value!(u32, u32);

impl SlotValue for i64 {
    fn from_bits(bits: u64) -> Self {
        bits as i64
    }
    fn to_bits(self) -> u64 {
        self as u64
    }
}

impl SlotValue for u64 {
    fn from_bits(bits: u64) -> Self {
        bits
    }
    fn to_bits(self) -> u64 {
        self
    }
}

impl SlotValue for f32 {
    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
    fn to_bits(self) -> u64 {
        u64::from(f32::to_bits(self))
    }
}

impl SlotValue for f64 {
    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }
}

impl SlotValue for bool {
    fn from_bits(bits: u64) -> Self {
        bits != 0
    }
    fn to_bits(self) -> u64 {
        u64::from(self)
    }
}

/// One external-call site's materialized call interface (§4.5, §5): the
/// original rebuilds `ffi_cif` here because it needs pointers into the
/// current `values_` vector; this crate's trampolines take plain `u64`
/// slices, so what survives activation-time preparation is just the site's
/// static shape, resolved once rather than re-read from the
/// `ExternalCallContext` on every call.
#[derive(Debug, Clone)]
pub struct CallActivation {
    pub arg_count: usize,
    pub has_return: bool,
}

/// The mutable per-execution state (§5): value slots, scratch allocations,
/// and the prepared external-call activations. Private to the thread that
/// owns it; nothing here is `Send`/`Sync` on purpose (see DESIGN.md).
pub struct Activation {
    pub values: Vec<u64>,
    pub allocations: Vec<Vec<u8>>,
    pub call_activations: Vec<CallActivation>,
}

impl Activation {
    /// Resizes `values` to `slot_count`, fills the constant pool and
    /// arguments into their pinned slots, and materializes the external-call
    /// activations, exactly mirroring `InitializeActivationRecord`'s order.
    pub fn new(
        slot_count: usize,
        constants: &[u64],
        arguments: &[u64],
        expected_args: usize,
        external_call_contexts: &[ExternalCallContext],
    ) -> Result<Activation> {
        if arguments.len() != expected_args {
            return Err(ExecutionError::ArgumentCountMismatch { expected: expected_args, actual: arguments.len() }.into());
        }

        let mut values = vec![0u64; slot_count];
        let mut slot = 1usize;
        for &c in constants {
            values[slot] = c;
            slot += 1;
        }
        for &a in arguments {
            values[slot] = a;
            slot += 1;
        }

        let call_activations = external_call_contexts
            .iter()
            .map(|ctx| CallActivation { arg_count: ctx.arg_count, has_return: ctx.has_return })
            .collect();

        Ok(Activation { values, allocations: Vec::new(), call_activations })
    }

    #[must_use]
    pub fn read_raw(&self, slot: u32) -> u64 {
        self.values[slot as usize]
    }

    pub fn write_raw(&mut self, slot: u32, bits: u64) {
        self.values[slot as usize] = bits;
    }

    #[must_use]
    pub fn read<T: SlotValue>(&self, slot: u32) -> T {
        T::from_bits(self.read_raw(slot))
    }

    pub fn write<T: SlotValue>(&mut self, slot: u32, value: T) {
        self.write_raw(slot, value.to_bits());
    }

    #[must_use]
    pub fn read_pointer(&self, slot: u32) -> Pointer {
        Pointer::from_bits(self.read_raw(slot))
    }

    pub fn write_pointer(&mut self, slot: u32, ptr: Pointer) {
        self.write_raw(slot, ptr.to_bits());
    }

    /// `alloca`: reserves `size_bytes` of zeroed scratch memory, owned by
    /// this activation for its whole lifetime, and returns a handle to it.
    pub fn alloc(&mut self, size_bytes: u32) -> Result<Pointer> {
        self.allocations.push(vec![0u8; size_bytes as usize]);
        let alloc_id =
            u32::try_from(self.allocations.len()).map_err(|_| ExecutionError::AllocationFailed(size_bytes as usize))?;
        Ok(Pointer { alloc_id, offset: 0 })
    }

    fn buffer(&self, ptr: Pointer) -> Result<&[u8]> {
        if ptr.alloc_id == 0 {
            return Err(ExecutionError::NullPointer.into());
        }
        self.allocations
            .get(ptr.alloc_id as usize - 1)
            .map(Vec::as_slice)
            .ok_or(ExecutionError::NullPointer.into())
    }

    fn buffer_mut(&mut self, ptr: Pointer) -> Result<&mut [u8]> {
        if ptr.alloc_id == 0 {
            return Err(ExecutionError::NullPointer.into());
        }
        self.allocations
            .get_mut(ptr.alloc_id as usize - 1)
            .map(Vec::as_mut_slice)
            .ok_or(ExecutionError::NullPointer.into())
    }

    /// `load`: reads `len` little-endian bytes at `ptr`, zero-extended into
    /// a 64-bit slot value.
    pub fn load_bytes(&self, ptr: Pointer, len: usize) -> Result<u64> {
        let buf = self.buffer(ptr)?;
        let start = ptr.offset as usize;
        let end = start
            .checked_add(len)
            .ok_or(ExecutionError::OutOfBounds { alloc_id: ptr.alloc_id, offset: ptr.offset, len: len as u32 })?;
        let slice = buf.get(start..end).ok_or(ExecutionError::OutOfBounds {
            alloc_id: ptr.alloc_id,
            offset: ptr.offset,
            len: len as u32,
        })?;
        let mut bytes = [0u8; 8];
        bytes[..len].copy_from_slice(slice);
        Ok(u64::from_le_bytes(bytes))
    }

    /// `store`: writes the low `len` bytes of `value` to `ptr`.
    pub fn store_bytes(&mut self, ptr: Pointer, len: usize, value: u64) -> Result<()> {
        let bytes = value.to_le_bytes();
        let start = ptr.offset as usize;
        let end = start
            .checked_add(len)
            .ok_or(ExecutionError::OutOfBounds { alloc_id: ptr.alloc_id, offset: ptr.offset, len: len as u32 })?;
        let buf = self.buffer_mut(ptr)?;
        let slice = buf.get_mut(start..end).ok_or(ExecutionError::OutOfBounds {
            alloc_id: ptr.alloc_id,
            offset: ptr.offset,
            len: len as u32,
        })?;
        slice.copy_from_slice(&bytes[..len]);
        Ok(())
    }

    /// `llvm.memcpy`/`llvm.memmove`: copies `len` bytes from `src` to `dst`,
    /// permitting overlap the way `memmove` does (the translator never
    /// distinguishes them at the activation-record level; overlap safety is
    /// what tells them apart on a real host).
    pub fn mem_copy(&mut self, dst: Pointer, src: Pointer, len: usize) -> Result<()> {
        let src_bytes = self.buffer(src)?.get(src.offset as usize..src.offset as usize + len).ok_or(
            ExecutionError::OutOfBounds { alloc_id: src.alloc_id, offset: src.offset, len: len as u32 },
        )?;
        let src_bytes = src_bytes.to_vec();
        let dst_buf = self.buffer_mut(dst)?;
        let dst_slice = dst_buf.get_mut(dst.offset as usize..dst.offset as usize + len).ok_or(
            ExecutionError::OutOfBounds { alloc_id: dst.alloc_id, offset: dst.offset, len: len as u32 },
        )?;
        dst_slice.copy_from_slice(&src_bytes);
        Ok(())
    }

    /// `llvm.memset`: fills `len` bytes at `dst` with the low byte of `value`.
    pub fn mem_set(&mut self, dst: Pointer, value: u8, len: usize) -> Result<()> {
        let buf = self.buffer_mut(dst)?;
        let slice = buf.get_mut(dst.offset as usize..dst.offset as usize + len).ok_or(ExecutionError::OutOfBounds {
            alloc_id: dst.alloc_id,
            offset: dst.offset,
            len: len as u32,
        })?;
        slice.fill(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_bit_pack_round_trips() {
        let p = Pointer { alloc_id: 3, offset: 17 };
        assert_eq!(Pointer::from_bits(p.to_bits()), p);
    }

    #[test]
    fn alloc_then_store_then_load_round_trips() {
        let mut act = Activation::new(2, &[], &[], 0, &[]).unwrap();
        let ptr = act.alloc(16).unwrap();
        act.store_bytes(ptr, 4, 0xAABB_CCDD).unwrap();
        assert_eq!(act.load_bytes(ptr, 4).unwrap(), 0xAABB_CCDD);
    }

    #[test]
    fn load_out_of_bounds_is_an_error() {
        let mut act = Activation::new(2, &[], &[], 0, &[]).unwrap();
        let ptr = act.alloc(4).unwrap();
        assert!(act.load_bytes(ptr.add_offset(1), 8).is_err());
    }

    #[test]
    fn argument_count_mismatch_is_rejected() {
        let err = Activation::new(4, &[], &[1, 2], 1, &[]).unwrap_err();
        assert!(matches!(err, crate::Error::Execution(ExecutionError::ArgumentCountMismatch { .. })));
    }
}
