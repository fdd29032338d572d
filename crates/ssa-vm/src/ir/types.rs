//! The scalar and aggregate type domain of the input IR (§6.1).

/// A type as it appears on an IR value. Limited to what the builder can
/// translate: scalars that fit in a 64-bit value slot, plus arrays/structs
/// used only as the source type of a `getelementptr`/`extractvalue` (their
/// instances never occupy a value slot directly).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Ptr,
    F32,
    F64,
    Array { element: Box<Type>, len: u32 },
    Struct(Vec<Type>),
}

impl Type {
    /// Size in bytes, as `CodeContext::GetTypeSize` would report.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        match self {
            Type::Bool | Type::I8 => 1,
            Type::I16 => 2,
            Type::I32 | Type::F32 => 4,
            Type::I64 | Type::F64 | Type::Ptr => 8,
            Type::Array { element, len } => element.byte_size() * u64::from(*len),
            Type::Struct(fields) => {
                let mut offset = 0u64;
                for field in fields {
                    offset = align_up(offset, field.align());
                    offset += field.byte_size();
                }
                align_up(offset, self.align())
            }
        }
    }

    fn align(&self) -> u64 {
        match self {
            Type::Bool | Type::I8 => 1,
            Type::I16 => 2,
            Type::I32 | Type::F32 => 4,
            Type::I64 | Type::F64 | Type::Ptr => 8,
            Type::Array { element, .. } => element.align(),
            Type::Struct(fields) => fields.iter().map(Type::align).max().unwrap_or(1),
        }
    }

    /// Byte offset of `fields[index]` inside a struct with this field layout.
    #[must_use]
    pub fn struct_element_offset(fields: &[Type], index: u32) -> u64 {
        let mut offset = 0u64;
        for field in &fields[..index as usize] {
            offset = align_up(offset, field.align());
            offset += field.byte_size();
        }
        align_up(offset, fields[index as usize].align())
    }

    #[must_use]
    pub fn alloc_size_in_bits(&self) -> u64 {
        self.byte_size() * 8
    }

    /// True for the scalar domain the register allocator and dispatch engine
    /// actually operate on (everything that can live in one value slot).
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::Ptr | Type::F32 | Type::F64
        )
    }

    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }
}

fn align_up(offset: u64, align: u64) -> u64 {
    (offset + align - 1) / align * align
}

/// A compile-time-known constant value, sign/zero-extended to 64 bits the way
/// `GetConstantValue` does for its integer case, or bit-reinterpreted for the
/// float case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Constant {
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            Constant::Bool(_) => Type::Bool,
            Constant::I8(_) => Type::I8,
            Constant::I16(_) => Type::I16,
            Constant::I32(_) => Type::I32,
            Constant::I64(_) => Type::I64,
            Constant::F32(_) => Type::F32,
            Constant::F64(_) => Type::F64,
        }
    }

    /// The 64-bit pool value this constant materializes to. Distinct constants
    /// with identical bit patterns (e.g. `I32(1)` and `Bool(true)`) intentionally
    /// alias to the same bits, matching the "by value" constant pool of §3.
    #[must_use]
    pub fn to_bits(self) -> u64 {
        match self {
            Constant::Bool(v) => u64::from(v),
            Constant::I8(v) => i64::from(v) as u64,
            Constant::I16(v) => i64::from(v) as u64,
            Constant::I32(v) => i64::from(v) as u64,
            Constant::I64(v) => v as u64,
            Constant::F32(v) => u64::from(v.to_bits()),
            Constant::F64(v) => v.to_bits(),
        }
    }

    /// Signed integer value, for constant GEP index folding.
    ///
    /// # Panics
    /// Panics if this constant is not an integer constant; callers must check
    /// `Constant::ty().is_scalar()`/pattern-match as the builder does (the
    /// original's `GetConstantIntegerValueSigned` has the same precondition).
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Constant::Bool(v) => i64::from(v),
            Constant::I8(v) => i64::from(v),
            Constant::I16(v) => i64::from(v),
            Constant::I32(v) => i64::from(v),
            Constant::I64(v) => v,
            Constant::F32(_) | Constant::F64(_) => {
                panic!("as_i64 called on a non-integer constant")
            }
        }
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.as_i64() as u64
    }
}
