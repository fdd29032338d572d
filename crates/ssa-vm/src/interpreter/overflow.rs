//! Portable overflow-aware arithmetic (§4.6).
//!
//! Ported from `overflow_builtins.h`'s documented contract rather than from
//! its GCC `__builtin_*_overflow` implementation: `(a op b)` is written
//! modulo the type's width, and the function reports whether the
//! mathematical result did not fit. Rust's `overflowing_*` methods give the
//! same pair directly and are what every handler actually calls in
//! `interpreter::dispatch`; this module exists so the formulas themselves —
//! the ones `overflow_builtins_test.cpp` pins down — are independently
//! testable against that oracle.

#[must_use]
pub fn uadd_overflow_u8(a: u8, b: u8) -> (u8, bool) {
    (a.wrapping_add(b), u8::MAX - a < b)
}
#[must_use]
pub fn uadd_overflow_u16(a: u16, b: u16) -> (u16, bool) {
    (a.wrapping_add(b), u16::MAX - a < b)
}
#[must_use]
pub fn uadd_overflow_u32(a: u32, b: u32) -> (u32, bool) {
    (a.wrapping_add(b), u32::MAX - a < b)
}
#[must_use]
pub fn uadd_overflow_u64(a: u64, b: u64) -> (u64, bool) {
    (a.wrapping_add(b), u64::MAX - a < b)
}

#[must_use]
pub fn usub_overflow_u8(a: u8, b: u8) -> (u8, bool) {
    (a.wrapping_sub(b), b > a)
}
#[must_use]
pub fn usub_overflow_u16(a: u16, b: u16) -> (u16, bool) {
    (a.wrapping_sub(b), b > a)
}
#[must_use]
pub fn usub_overflow_u32(a: u32, b: u32) -> (u32, bool) {
    (a.wrapping_sub(b), b > a)
}
#[must_use]
pub fn usub_overflow_u64(a: u64, b: u64) -> (u64, bool) {
    (a.wrapping_sub(b), b > a)
}

macro_rules! signed_add_overflow {
    ($name:ident, $ty:ty, $min:expr) => {
        #[must_use]
        pub fn $name(a: $ty, b: $ty) -> ($ty, bool) {
            let res = a.wrapping_add(b);
            let overflow = ((a ^ b) & (res ^ a)) & $min != 0;
            (res, overflow)
        }
    };
}

macro_rules! signed_sub_overflow {
    ($name:ident, $ty:ty, $min:expr) => {
        #[must_use]
        pub fn $name(a: $ty, b: $ty) -> ($ty, bool) {
            let res = a.wrapping_sub(b);
            let overflow = ((a ^ b) & (res ^ a)) & $min != 0;
            (res, overflow)
        }
    };
}

signed_add_overflow!(sadd_overflow_i8, i8, i8::MIN);
signed_add_overflow!(sadd_overflow_i16, i16, i16::MIN);
signed_add_overflow!(sadd_overflow_i32, i32, i32::MIN);
signed_add_overflow!(sadd_overflow_i64, i64, i64::MIN);

signed_sub_overflow!(ssub_overflow_i8, i8, i8::MIN);
signed_sub_overflow!(ssub_overflow_i16, i16, i16::MIN);
signed_sub_overflow!(ssub_overflow_i32, i32, i32::MIN);
signed_sub_overflow!(ssub_overflow_i64, i64, i64::MIN);

macro_rules! mul_overflow {
    ($name:ident, $ty:ty) => {
        #[must_use]
        pub fn $name(a: $ty, b: $ty) -> ($ty, bool) {
            let res = a.wrapping_mul(b);
            let overflow = a != 0 && res / a != b;
            (res, overflow)
        }
    };
}

mul_overflow!(umul_overflow_u8, u8);
mul_overflow!(umul_overflow_u16, u16);
mul_overflow!(umul_overflow_u32, u32);
mul_overflow!(umul_overflow_u64, u64);

mul_overflow!(smul_overflow_i8, i8);
mul_overflow!(smul_overflow_i16, i16);
mul_overflow!(smul_overflow_i32, i32);
mul_overflow!(smul_overflow_i64, i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uadd_matches_std_oracle() {
        for (a, b) in [(1u32, 2u32), (u32::MAX, 1), (u32::MAX / 2, u32::MAX / 2 + 2)] {
            assert_eq!(uadd_overflow_u32(a, b), a.overflowing_add(b));
        }
    }

    #[test]
    fn usub_matches_std_oracle() {
        for (a, b) in [(5u32, 2u32), (2, 5), (0, 0)] {
            assert_eq!(usub_overflow_u32(a, b), a.overflowing_sub(b));
        }
    }

    #[test]
    fn sadd_matches_std_oracle() {
        for (a, b) in [(1i32, 2i32), (i32::MAX, 1), (i32::MIN, -1), (-5, -5)] {
            assert_eq!(sadd_overflow_i32(a, b), a.overflowing_add(b));
        }
    }

    #[test]
    fn ssub_matches_std_oracle() {
        for (a, b) in [(1i32, 2i32), (i32::MIN, 1), (i32::MAX, -1)] {
            assert_eq!(ssub_overflow_i32(a, b), a.overflowing_sub(b));
        }
    }

    #[test]
    fn umul_matches_std_oracle() {
        for (a, b) in [(3u32, 4u32), (u32::MAX, 2), (0, u32::MAX)] {
            assert_eq!(umul_overflow_u32(a, b), a.overflowing_mul(b));
        }
    }

    #[test]
    fn smul_matches_std_oracle() {
        for (a, b) in [(3i32, 4i32), (i32::MIN, -1), (i32::MAX, 2), (0, i32::MIN)] {
            assert_eq!(smul_overflow_i32(a, b), a.overflowing_mul(b));
        }
    }

    #[test]
    fn documented_overflow_scenario() {
        // §8: (2147483648 - b) == 2147483642 && ovf_sub, for b = 6. The bit
        // pattern 2147483648 (0x8000_0000) does not fit in i32; reinterpreted
        // as i32 it is `i32::MIN`, and the subtraction overflows in signed
        // arithmetic (it never would in unsigned, since the operand only
        // decreases), so the scenario goes through the signed oracle.
        let (res, overflow) = ssub_overflow_i32(i32::MIN, 6);
        assert_eq!(res as u32, 2_147_483_642);
        assert!(overflow);
    }
}
