//! Crate-wide error taxonomy (§6.4, §7).

/// Failures raised while analysing, allocating registers for, or translating
/// an `ir::Function` into a `BytecodeFunction`. A build error aborts the
/// current build; no partial `BytecodeFunction` is ever published.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("unsupported: {0}")]
    NotSupported(String),

    #[error("value of type {0:?} is too large for a value slot")]
    ValueTooLarge(String),

    #[error("function requires more value slots than fit in an index_t")]
    TooManySlots,

    #[error("call to unknown internal function '{0}'")]
    UnknownFunction(String),
}

/// Failures raised while executing a `BytecodeFunction` (§6.4, §7). Execution
/// errors terminate the current activation; any stores or external calls
/// already performed are not rolled back.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("function expects {expected} arguments, got {actual}")]
    ArgumentCountMismatch { expected: usize, actual: usize },

    #[error("failed to prepare call interface for external symbol '{0}'")]
    CallPrepFailed(String),

    #[error("scratch allocation of {0} bytes failed")]
    AllocationFailed(usize),

    #[error("external symbol '{0}' has no registered trampoline")]
    UnresolvedExternalSymbol(String),

    #[error("access of {len} byte(s) at offset {offset} of allocation {alloc_id} is out of bounds")]
    OutOfBounds { alloc_id: u32, offset: u32, len: u32 },

    #[error("dereferenced a null or invalid pointer")]
    NullPointer,

    #[error("division by zero")]
    DivideByZero,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
}

pub type Result<T> = std::result::Result<T, Error>;
