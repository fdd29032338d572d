//! External-call trampolines (§4.5 "External calls", §9 FFI note).
//!
//! The original marshals external calls through `libffi`, building a
//! `ffi_cif` per call site from argument/return `ffi_type`s and invoking it
//! with an array of `void*` pointing into the activation's value slots. This
//! workspace denies `unsafe_code`, which rules out a real FFI binding (and
//! `libffi-sys` isn't part of any example's dependency stack regardless), so
//! the trampoline registry stands in for it: a process-wide table mapping
//! external symbol name to a boxed closure over `&[u64] -> u64`, in the
//! spirit of §9's "a `const fn`-built static table or a one-shot lazy
//! initializer guarded by an atomic flag" note about the dispatch table.
//! Registration happens once per process (typically from the code that owns
//! the `CodeContext`, outside this crate); resolution happens per call site
//! at activation-initialization time, matching `ffi_prep_cif`'s "rebuilt at
//! activation time because it needs the current activation record" timing.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{ExecutionError, Result};

/// A registered external function: takes the call's argument slots (already
/// read out of the activation) and returns the value to write into the
/// destination slot. Implementations that ignore their return value (void
/// externals) just return 0, which lands in the unused destination slot.
pub type Trampoline = Arc<dyn Fn(&[u64]) -> u64 + Send + Sync>;

fn registry() -> &'static RwLock<HashMap<String, Trampoline>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Trampoline>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers (or replaces) the trampoline for `symbol`. Call this once at
/// startup, before executing any `BytecodeFunction` that references the
/// symbol through a `call_external` site.
pub fn register_external(symbol: impl Into<String>, f: impl Fn(&[u64]) -> u64 + Send + Sync + 'static) {
    registry().write().expect("external call registry poisoned").insert(symbol.into(), Arc::new(f));
}

/// Looks up a previously registered trampoline, materializing the "call
/// interface" an `ExternalCallContext` needs bound for this activation.
pub fn resolve(symbol: &str) -> Result<Trampoline> {
    registry()
        .read()
        .expect("external call registry poisoned")
        .get(symbol)
        .cloned()
        .ok_or_else(|| ExecutionError::UnresolvedExternalSymbol(symbol.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_symbol_is_an_execution_error() {
        let err = resolve("definitely_not_registered_anywhere").unwrap_err();
        assert!(matches!(err, crate::Error::Execution(ExecutionError::UnresolvedExternalSymbol(_))));
    }

    #[test]
    fn registered_trampoline_resolves_and_runs() {
        register_external("ffi_test_add", |args: &[u64]| args[0].wrapping_add(args[1]));
        let f = resolve("ffi_test_add").unwrap();
        assert_eq!(f(&[4, 6]), 10);
    }
}
