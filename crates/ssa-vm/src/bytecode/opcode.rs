//! The closed opcode enumeration (§3, §4.3).
//!
//! Rather than templating handlers by type (the original's macro-generated
//! `.def` table), opcode variants are enumerated directly per §9's guidance,
//! with the `(base op, scalar type) -> Opcode` mapping built as a const
//! lookup table in `builder::translate`. The `opcodes!` macro below only
//! removes the need to repeat each variant's name/slot-size twice.

macro_rules! opcodes {
    ( $( $variant:ident = $id:expr, $name:expr, $slots:expr ; )* ) => {
        #[repr(u16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $variant = $id, )*
        }

        impl Opcode {
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $( Opcode::$variant => $name, )*
                }
            }

            /// Static slot footprint of this opcode, or `None` for the sole
            /// variable-length opcode (`CallInternal`, which self-describes
            /// its arity).
            #[must_use]
            pub fn static_slot_size(self) -> Option<usize> {
                match self {
                    $( Opcode::$variant => $slots, )*
                }
            }
        }
    };
}

opcodes! {
    Undefined = 0, "undefined", Some(1);

    // ---- AllTypes family (I8, I16, I32, I64, F32, F64): 10 base ops ----
    AddI8 = 1, "add_i8", Some(1);
    AddI16 = 2, "add_i16", Some(1);
    AddI32 = 3, "add_i32", Some(1);
    AddI64 = 4, "add_i64", Some(1);
    AddF32 = 5, "add_f32", Some(1);
    AddF64 = 6, "add_f64", Some(1);

    SubI8 = 7, "sub_i8", Some(1);
    SubI16 = 8, "sub_i16", Some(1);
    SubI32 = 9, "sub_i32", Some(1);
    SubI64 = 10, "sub_i64", Some(1);
    SubF32 = 11, "sub_f32", Some(1);
    SubF64 = 12, "sub_f64", Some(1);

    MulI8 = 13, "mul_i8", Some(1);
    MulI16 = 14, "mul_i16", Some(1);
    MulI32 = 15, "mul_i32", Some(1);
    MulI64 = 16, "mul_i64", Some(1);
    MulF32 = 17, "mul_f32", Some(1);
    MulF64 = 18, "mul_f64", Some(1);

    DivI8 = 19, "div_i8", Some(1);
    DivI16 = 20, "div_i16", Some(1);
    DivI32 = 21, "div_i32", Some(1);
    DivI64 = 22, "div_i64", Some(1);
    DivF32 = 23, "div_f32", Some(1);
    DivF64 = 24, "div_f64", Some(1);

    CmpEqI8 = 25, "cmp_eq_i8", Some(1);
    CmpEqI16 = 26, "cmp_eq_i16", Some(1);
    CmpEqI32 = 27, "cmp_eq_i32", Some(1);
    CmpEqI64 = 28, "cmp_eq_i64", Some(1);
    CmpEqF32 = 29, "cmp_eq_f32", Some(1);
    CmpEqF64 = 30, "cmp_eq_f64", Some(1);

    CmpNeI8 = 31, "cmp_ne_i8", Some(1);
    CmpNeI16 = 32, "cmp_ne_i16", Some(1);
    CmpNeI32 = 33, "cmp_ne_i32", Some(1);
    CmpNeI64 = 34, "cmp_ne_i64", Some(1);
    CmpNeF32 = 35, "cmp_ne_f32", Some(1);
    CmpNeF64 = 36, "cmp_ne_f64", Some(1);

    CmpGtI8 = 37, "cmp_gt_i8", Some(1);
    CmpGtI16 = 38, "cmp_gt_i16", Some(1);
    CmpGtI32 = 39, "cmp_gt_i32", Some(1);
    CmpGtI64 = 40, "cmp_gt_i64", Some(1);
    CmpGtF32 = 41, "cmp_gt_f32", Some(1);
    CmpGtF64 = 42, "cmp_gt_f64", Some(1);

    CmpGeI8 = 43, "cmp_ge_i8", Some(1);
    CmpGeI16 = 44, "cmp_ge_i16", Some(1);
    CmpGeI32 = 45, "cmp_ge_i32", Some(1);
    CmpGeI64 = 46, "cmp_ge_i64", Some(1);
    CmpGeF32 = 47, "cmp_ge_f32", Some(1);
    CmpGeF64 = 48, "cmp_ge_f64", Some(1);

    CmpLtI8 = 49, "cmp_lt_i8", Some(1);
    CmpLtI16 = 50, "cmp_lt_i16", Some(1);
    CmpLtI32 = 51, "cmp_lt_i32", Some(1);
    CmpLtI64 = 52, "cmp_lt_i64", Some(1);
    CmpLtF32 = 53, "cmp_lt_f32", Some(1);
    CmpLtF64 = 54, "cmp_lt_f64", Some(1);

    CmpLeI8 = 55, "cmp_le_i8", Some(1);
    CmpLeI16 = 56, "cmp_le_i16", Some(1);
    CmpLeI32 = 57, "cmp_le_i32", Some(1);
    CmpLeI64 = 58, "cmp_le_i64", Some(1);
    CmpLeF32 = 59, "cmp_le_f32", Some(1);
    CmpLeF64 = 60, "cmp_le_f64", Some(1);

    // ---- IntTypes family (I8, I16, I32, I64): 13 base ops ----
    SDivI8 = 61, "sdiv_i8", Some(1);
    SDivI16 = 62, "sdiv_i16", Some(1);
    SDivI32 = 63, "sdiv_i32", Some(1);
    SDivI64 = 64, "sdiv_i64", Some(1);

    RemI8 = 65, "rem_i8", Some(1);
    RemI16 = 66, "rem_i16", Some(1);
    RemI32 = 67, "rem_i32", Some(1);
    RemI64 = 68, "rem_i64", Some(1);

    SRemI8 = 69, "srem_i8", Some(1);
    SRemI16 = 70, "srem_i16", Some(1);
    SRemI32 = 71, "srem_i32", Some(1);
    SRemI64 = 72, "srem_i64", Some(1);

    AndI8 = 73, "and_i8", Some(1);
    AndI16 = 74, "and_i16", Some(1);
    AndI32 = 75, "and_i32", Some(1);
    AndI64 = 76, "and_i64", Some(1);

    OrI8 = 77, "or_i8", Some(1);
    OrI16 = 78, "or_i16", Some(1);
    OrI32 = 79, "or_i32", Some(1);
    OrI64 = 80, "or_i64", Some(1);

    XorI8 = 81, "xor_i8", Some(1);
    XorI16 = 82, "xor_i16", Some(1);
    XorI32 = 83, "xor_i32", Some(1);
    XorI64 = 84, "xor_i64", Some(1);

    ShlI8 = 85, "shl_i8", Some(1);
    ShlI16 = 86, "shl_i16", Some(1);
    ShlI32 = 87, "shl_i32", Some(1);
    ShlI64 = 88, "shl_i64", Some(1);

    LShrI8 = 89, "lshr_i8", Some(1);
    LShrI16 = 90, "lshr_i16", Some(1);
    LShrI32 = 91, "lshr_i32", Some(1);
    LShrI64 = 92, "lshr_i64", Some(1);

    AShrI8 = 93, "ashr_i8", Some(1);
    AShrI16 = 94, "ashr_i16", Some(1);
    AShrI32 = 95, "ashr_i32", Some(1);
    AShrI64 = 96, "ashr_i64", Some(1);

    CmpSGtI8 = 97, "cmp_sgt_i8", Some(1);
    CmpSGtI16 = 98, "cmp_sgt_i16", Some(1);
    CmpSGtI32 = 99, "cmp_sgt_i32", Some(1);
    CmpSGtI64 = 100, "cmp_sgt_i64", Some(1);

    CmpSGeI8 = 101, "cmp_sge_i8", Some(1);
    CmpSGeI16 = 102, "cmp_sge_i16", Some(1);
    CmpSGeI32 = 103, "cmp_sge_i32", Some(1);
    CmpSGeI64 = 104, "cmp_sge_i64", Some(1);

    CmpSLtI8 = 105, "cmp_slt_i8", Some(1);
    CmpSLtI16 = 106, "cmp_slt_i16", Some(1);
    CmpSLtI32 = 107, "cmp_slt_i32", Some(1);
    CmpSLtI64 = 108, "cmp_slt_i64", Some(1);

    CmpSLeI8 = 109, "cmp_sle_i8", Some(1);
    CmpSLeI16 = 110, "cmp_sle_i16", Some(1);
    CmpSLeI32 = 111, "cmp_sle_i32", Some(1);
    CmpSLeI64 = 112, "cmp_sle_i64", Some(1);

    // ---- FloatTypes family (F32, F64): 1 base op ----
    FRemF32 = 113, "frem_f32", Some(1);
    FRemF64 = 114, "frem_f64", Some(1);

    // ---- SizeIntTypes family (by byte size 1/2/4/8): 3 base ops ----
    LoadI8 = 115, "load_i8", Some(1);
    LoadI16 = 116, "load_i16", Some(1);
    LoadI32 = 117, "load_i32", Some(1);
    LoadI64 = 118, "load_i64", Some(1);

    StoreI8 = 119, "store_i8", Some(1);
    StoreI16 = 120, "store_i16", Some(1);
    StoreI32 = 121, "store_i32", Some(1);
    StoreI64 = 122, "store_i64", Some(1);

    GepArrayI8 = 123, "gep_array_i8", Some(1);
    GepArrayI16 = 124, "gep_array_i16", Some(1);
    GepArrayI32 = 125, "gep_array_i32", Some(1);
    GepArrayI64 = 126, "gep_array_i64", Some(1);

    // ---- sext/zext, pairwise by (src size, dst size) ----
    SextI8I16 = 127, "sext_i8_i16", Some(1);
    SextI8I32 = 128, "sext_i8_i32", Some(1);
    SextI8I64 = 129, "sext_i8_i64", Some(1);
    SextI16I32 = 130, "sext_i16_i32", Some(1);
    SextI16I64 = 131, "sext_i16_i64", Some(1);
    SextI32I64 = 132, "sext_i32_i64", Some(1);

    ZextI8I16 = 133, "zext_i8_i16", Some(1);
    ZextI8I32 = 134, "zext_i8_i32", Some(1);
    ZextI8I64 = 135, "zext_i8_i64", Some(1);
    ZextI16I32 = 136, "zext_i16_i32", Some(1);
    ZextI16I64 = 137, "zext_i16_i64", Some(1);
    ZextI32I64 = 138, "zext_i32_i64", Some(1);

    // ---- float <-> float width conversion ----
    DoubleToFloat = 139, "doubletofloat", Some(1);
    FloatToDouble = 140, "floattodouble", Some(1);

    // ---- float -> int, dispatched by the destination int type ----
    FloatToSII8 = 141, "floattosi_i8", Some(1);
    FloatToSII16 = 142, "floattosi_i16", Some(1);
    FloatToSII32 = 143, "floattosi_i32", Some(1);
    FloatToSII64 = 144, "floattosi_i64", Some(1);

    FloatToUII8 = 145, "floattoui_i8", Some(1);
    FloatToUII16 = 146, "floattoui_i16", Some(1);
    FloatToUII32 = 147, "floattoui_i32", Some(1);
    FloatToUII64 = 148, "floattoui_i64", Some(1);

    DoubleToSII8 = 149, "doubletosi_i8", Some(1);
    DoubleToSII16 = 150, "doubletosi_i16", Some(1);
    DoubleToSII32 = 151, "doubletosi_i32", Some(1);
    DoubleToSII64 = 152, "doubletosi_i64", Some(1);

    DoubleToUII8 = 153, "doubletoui_i8", Some(1);
    DoubleToUII16 = 154, "doubletoui_i16", Some(1);
    DoubleToUII32 = 155, "doubletoui_i32", Some(1);
    DoubleToUII64 = 156, "doubletoui_i64", Some(1);

    // ---- int -> float, dispatched by the source int type ----
    SIToFloatI8 = 157, "sitofloat_i8", Some(1);
    SIToFloatI16 = 158, "sitofloat_i16", Some(1);
    SIToFloatI32 = 159, "sitofloat_i32", Some(1);
    SIToFloatI64 = 160, "sitofloat_i64", Some(1);

    SIToDoubleI8 = 161, "sitodouble_i8", Some(1);
    SIToDoubleI16 = 162, "sitodouble_i16", Some(1);
    SIToDoubleI32 = 163, "sitodouble_i32", Some(1);
    SIToDoubleI64 = 164, "sitodouble_i64", Some(1);

    UIToFloatI8 = 165, "uitofloat_i8", Some(1);
    UIToFloatI16 = 166, "uitofloat_i16", Some(1);
    UIToFloatI32 = 167, "uitofloat_i32", Some(1);
    UIToFloatI64 = 168, "uitofloat_i64", Some(1);

    UIToDoubleI8 = 169, "uitodouble_i8", Some(1);
    UIToDoubleI16 = 170, "uitodouble_i16", Some(1);
    UIToDoubleI32 = 171, "uitodouble_i32", Some(1);
    UIToDoubleI64 = 172, "uitodouble_i64", Some(1);

    // ---- overflow-aware arithmetic, dispatched by operand int type, double-slot ----
    UAddOverflowI8 = 173, "uadd_overflow_i8", Some(2);
    UAddOverflowI16 = 174, "uadd_overflow_i16", Some(2);
    UAddOverflowI32 = 175, "uadd_overflow_i32", Some(2);
    UAddOverflowI64 = 176, "uadd_overflow_i64", Some(2);

    SAddOverflowI8 = 177, "sadd_overflow_i8", Some(2);
    SAddOverflowI16 = 178, "sadd_overflow_i16", Some(2);
    SAddOverflowI32 = 179, "sadd_overflow_i32", Some(2);
    SAddOverflowI64 = 180, "sadd_overflow_i64", Some(2);

    USubOverflowI8 = 181, "usub_overflow_i8", Some(2);
    USubOverflowI16 = 182, "usub_overflow_i16", Some(2);
    USubOverflowI32 = 183, "usub_overflow_i32", Some(2);
    USubOverflowI64 = 184, "usub_overflow_i64", Some(2);

    SSubOverflowI8 = 185, "ssub_overflow_i8", Some(2);
    SSubOverflowI16 = 186, "ssub_overflow_i16", Some(2);
    SSubOverflowI32 = 187, "ssub_overflow_i32", Some(2);
    SSubOverflowI64 = 188, "ssub_overflow_i64", Some(2);

    UMulOverflowI8 = 189, "umul_overflow_i8", Some(2);
    UMulOverflowI16 = 190, "umul_overflow_i16", Some(2);
    UMulOverflowI32 = 191, "umul_overflow_i32", Some(2);
    UMulOverflowI64 = 192, "umul_overflow_i64", Some(2);

    SMulOverflowI8 = 193, "smul_overflow_i8", Some(2);
    SMulOverflowI16 = 194, "smul_overflow_i16", Some(2);
    SMulOverflowI32 = 195, "smul_overflow_i32", Some(2);
    SMulOverflowI64 = 196, "smul_overflow_i64", Some(2);

    // ---- untyped / structural opcodes ----
    GepOffset = 197, "gep_offset", Some(1);
    PhiMov = 198, "phi_mov", Some(1);
    NopMov = 199, "nop_mov", Some(1);
    Select = 200, "select", Some(2);
    BranchUncond = 201, "branch_uncond", Some(1);
    BranchCond = 202, "branch_cond", Some(1);
    BranchCondFt = 203, "branch_cond_ft", Some(1);
    Ret = 204, "ret", Some(1);
    ExtractValue = 205, "extractvalue", Some(1);
    CallExternal = 206, "call_external", Some(2);
    /// self-describing arity; see `Instruction::InternalCall`.
    CallInternal = 207, "call_internal", None;

    // ---- named intrinsics / explicit builtins ----
    LlvmMemcpy = 208, "llvm_memcpy", Some(1);
    LlvmMemmove = 209, "llvm_memmove", Some(1);
    LlvmMemset = 210, "llvm_memset", Some(1);
    LlvmSse42Crc32 = 211, "llvm_sse42_crc32", Some(1);
    ExplicitCallPow = 212, "explicit_call_pow", Some(1);
    ExplicitCallAbsI64 = 213, "explicit_call_abs_i64", Some(1);

    /// Reserves scratch memory in the current activation (§5.2); the
    /// allocation's lifetime is the activation's, never individually freed.
    Alloca = 214, "alloca", Some(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_is_zero() {
        assert_eq!(Opcode::Undefined as u16, 0);
    }

    #[test]
    fn names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for id in 0..=(Opcode::Alloca as u16) {
            let Some(op) = opcode_from_id(id) else { continue };
            assert!(seen.insert(op.name()), "duplicate opcode name {}", op.name());
        }
    }

    #[test]
    fn call_internal_has_no_static_size() {
        assert_eq!(Opcode::CallInternal.static_slot_size(), None);
    }

    #[test]
    fn select_and_overflow_take_two_slots() {
        assert_eq!(Opcode::Select.static_slot_size(), Some(2));
        assert_eq!(Opcode::SAddOverflowI32.static_slot_size(), Some(2));
    }
}

/// Reconstructs an `Opcode` from its numeric id (the inverse of `as u16`),
/// used by the dispatch engine and by `GetNumberOpcodes`-equivalent checks.
#[must_use]
pub fn opcode_from_id(id: u16) -> Option<Opcode> {
    // SAFETY-free: done via an exhaustive range check against the contiguous,
    // hand-assigned discriminant space declared above instead of a transmute.
    const MAX_ID: u16 = Opcode::Alloca as u16;
    if id > MAX_ID {
        return None;
    }
    ALL_OPCODES.iter().copied().find(|op| *op as u16 == id)
}

#[must_use]
pub fn number_opcodes() -> usize {
    ALL_OPCODES.len()
}

/// All opcodes, used for the jump-table completeness property (§8 universal
/// property 6) and for `opcode_from_id`.
pub const ALL_OPCODES: &[Opcode] = &{
    use Opcode::*;
    [
        Undefined, AddI8, AddI16, AddI32, AddI64, AddF32, AddF64, SubI8, SubI16, SubI32, SubI64,
        SubF32, SubF64, MulI8, MulI16, MulI32, MulI64, MulF32, MulF64, DivI8, DivI16, DivI32,
        DivI64, DivF32, DivF64, CmpEqI8, CmpEqI16, CmpEqI32, CmpEqI64, CmpEqF32, CmpEqF64,
        CmpNeI8, CmpNeI16, CmpNeI32, CmpNeI64, CmpNeF32, CmpNeF64, CmpGtI8, CmpGtI16, CmpGtI32,
        CmpGtI64, CmpGtF32, CmpGtF64, CmpGeI8, CmpGeI16, CmpGeI32, CmpGeI64, CmpGeF32, CmpGeF64,
        CmpLtI8, CmpLtI16, CmpLtI32, CmpLtI64, CmpLtF32, CmpLtF64, CmpLeI8, CmpLeI16, CmpLeI32,
        CmpLeI64, CmpLeF32, CmpLeF64, SDivI8, SDivI16, SDivI32, SDivI64, RemI8, RemI16, RemI32,
        RemI64, SRemI8, SRemI16, SRemI32, SRemI64, AndI8, AndI16, AndI32, AndI64, OrI8, OrI16,
        OrI32, OrI64, XorI8, XorI16, XorI32, XorI64, ShlI8, ShlI16, ShlI32, ShlI64, LShrI8,
        LShrI16, LShrI32, LShrI64, AShrI8, AShrI16, AShrI32, AShrI64, CmpSGtI8, CmpSGtI16,
        CmpSGtI32, CmpSGtI64, CmpSGeI8, CmpSGeI16, CmpSGeI32, CmpSGeI64, CmpSLtI8, CmpSLtI16,
        CmpSLtI32, CmpSLtI64, CmpSLeI8, CmpSLeI16, CmpSLeI32, CmpSLeI64, FRemF32, FRemF64,
        LoadI8, LoadI16, LoadI32, LoadI64, StoreI8, StoreI16, StoreI32, StoreI64, GepArrayI8,
        GepArrayI16, GepArrayI32, GepArrayI64, SextI8I16, SextI8I32, SextI8I64, SextI16I32,
        SextI16I64, SextI32I64, ZextI8I16, ZextI8I32, ZextI8I64, ZextI16I32, ZextI16I64,
        ZextI32I64, DoubleToFloat, FloatToDouble, FloatToSII8, FloatToSII16, FloatToSII32,
        FloatToSII64, FloatToUII8, FloatToUII16, FloatToUII32, FloatToUII64, DoubleToSII8,
        DoubleToSII16, DoubleToSII32, DoubleToSII64, DoubleToUII8, DoubleToUII16, DoubleToUII32,
        DoubleToUII64, SIToFloatI8, SIToFloatI16, SIToFloatI32, SIToFloatI64, SIToDoubleI8,
        SIToDoubleI16, SIToDoubleI32, SIToDoubleI64, UIToFloatI8, UIToFloatI16, UIToFloatI32,
        UIToFloatI64, UIToDoubleI8, UIToDoubleI16, UIToDoubleI32, UIToDoubleI64,
        UAddOverflowI8, UAddOverflowI16, UAddOverflowI32, UAddOverflowI64, SAddOverflowI8,
        SAddOverflowI16, SAddOverflowI32, SAddOverflowI64, USubOverflowI8, USubOverflowI16,
        USubOverflowI32, USubOverflowI64, SSubOverflowI8, SSubOverflowI16, SSubOverflowI32,
        SSubOverflowI64, UMulOverflowI8, UMulOverflowI16, UMulOverflowI32, UMulOverflowI64,
        SMulOverflowI8, SMulOverflowI16, SMulOverflowI32, SMulOverflowI64, GepOffset, PhiMov,
        NopMov, Select, BranchUncond, BranchCond, BranchCondFt, Ret, ExtractValue, CallExternal,
        CallInternal, LlvmMemcpy, LlvmMemmove, LlvmMemset, LlvmSse42Crc32, ExplicitCallPow,
        ExplicitCallAbsI64, Alloca,
    ]
};
