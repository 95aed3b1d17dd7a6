//! Store context for one binary-module invocation.

use wasmtime::StoreLimits;
use wasmtime::StoreLimitsBuilder;
use wasmtime::Trap;
use wrapcore::InvokeError;
use wrapcore::WrapError;

use crate::handle::InvokerHandle;

/// A guest-raised abort, as reported through `__wrap_abort`.
#[derive(Clone, Debug)]
pub struct Abort {
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for Abort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{}:{})", self.message, self.file, self.line, self.column)
    }
}

/// Outcome of the most recent `__wrap_subinvoke`.
#[derive(Default)]
pub(crate) enum Subinvoke {
    #[default]
    Idle,
    Succeeded(Vec<u8>),
    Failed(String),
}

/// Per-invocation state stored in the wasmtime `Store`.
///
/// Everything here lives for exactly one call: a fresh store is built per
/// invocation, so guests never observe each other's buffers.
pub struct ModuleCtx {
    pub(crate) method: Vec<u8>,
    pub(crate) args: Vec<u8>,
    pub(crate) env: Vec<u8>,
    pub(crate) invoker: InvokerHandle,
    pub(crate) result: Option<Vec<u8>>,
    pub(crate) error: Option<String>,
    pub(crate) subinvoke: Subinvoke,
    /// Failure of the last sub-invocation, kept as the source of a later abort.
    pub(crate) last_failure: Option<InvokeError>,
    pub(crate) implementations: Option<Vec<u8>>,
    pub(crate) abort: Option<Abort>,
    pub(crate) limits: StoreLimits,
}

impl ModuleCtx {
    pub(crate) fn new(method: String, args: Vec<u8>, env: Vec<u8>, invoker: InvokerHandle, memory_bytes: usize) -> Self {
        Self {
            method: method.into_bytes(),
            args,
            env,
            invoker,
            result: None,
            error: None,
            subinvoke: Subinvoke::Idle,
            last_failure: None,
            implementations: None,
            abort: None,
            limits: StoreLimitsBuilder::new()
                .memory_size(memory_bytes)
                .trap_on_grow_failure(true)
                .build(),
        }
    }

    /// Lengths passed to the guest entry point.
    pub(crate) fn entry_args(&self) -> (u32, u32, u32) {
        (self.method.len() as u32, self.args.len() as u32, self.env.len() as u32)
    }

    /// Turns the entry point's outcome into the wrapper result.
    pub(crate) fn finish(self, outcome: wasmtime::Result<u32>) -> Result<Vec<u8>, WrapError> {
        let source = self.last_failure.map(Box::new);
        match outcome {
            Ok(1) => Ok(self.result.unwrap_or_default()),
            Ok(_) => Err(WrapError::ExecutionAborted {
                message: self
                    .error
                    .unwrap_or_else(|| "module reported failure without a message".into()),
                source,
            }),
            Err(trap) => {
                let message = match (self.abort, trap.downcast_ref::<Trap>()) {
                    (Some(abort), _) => abort.to_string(),
                    (None, Some(Trap::OutOfFuel)) => "fuel exhausted".into(),
                    (None, _) => format!("{trap:#}"),
                };
                Err(WrapError::ExecutionAborted { message, source })
            }
        }
    }
}
