use crate::fault;
use crate::jit::JitState;
use crate::BridgeError;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tether_marshal::{CallbackCell, MarshalError, ScalarValue, TrampolineFactory};

/// Compiles native entry points for callback slots.
///
/// Every installed cell is retained for the life of the bridge, so the generated code
/// never refers to freed memory even after the owning struct is released. Neither the
/// code nor the cells are recycled.
pub struct Trampolines {
    jit: Arc<Mutex<JitState>>,
    cells: Mutex<Vec<Arc<CallbackCell>>>,
}

impl Trampolines {
    pub(crate) fn new(jit: Arc<Mutex<JitState>>) -> Self {
        Trampolines {
            jit,
            cells: Mutex::new(Vec::new()),
        }
    }

    /// Number of trampolines compiled so far.
    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrampolineFactory for Trampolines {
    fn install(&self, cell: &Arc<CallbackCell>) -> Result<usize, MarshalError> {
        let shape = cell.signature().abi_shape();
        let context = Arc::as_ptr(cell) as usize;
        let code = self
            .jit
            .lock()
            .compile_trampoline(&shape, dispatch_callback as usize, context)
            .map_err(|e| MarshalError::Trampoline(format!("{}: {}", cell.label(), e)))?;
        self.cells.lock().push(Arc::clone(cell));
        log::debug!("Installed trampoline for `{}` at {:p}", cell.label(), code);
        Ok(code as usize)
    }
}

/// Target of every trampoline. Never unwinds into native code.
extern "C" fn dispatch_callback(cell: *const CallbackCell, args: *const u64, ret: *mut u64) {
    // SAFETY: the trampoline passes the address of a cell retained by `Trampolines`.
    let cell = unsafe { &*cell };
    if let Err(fault) = run_callback(cell, args, ret) {
        fault::report(fault);
    }
}

fn run_callback(cell: &CallbackCell, args: *const u64, ret: *mut u64) -> Result<(), BridgeError> {
    let handler = cell.handler()?;
    let shape = cell.signature().abi_shape();

    let values: Vec<ScalarValue> = shape
        .params
        .iter()
        .enumerate()
        // SAFETY: the trampoline spilled one slot per declared parameter.
        .map(|(index, kind)| ScalarValue::from_slot(*kind, unsafe { *args.add(index) }))
        .collect();
    log::trace!("Callback `{}` called with {:?}", cell.label(), values);

    let result = panic::catch_unwind(AssertUnwindSafe(|| handler(&values))).map_err(|payload| {
        BridgeError::CallbackPanicked {
            slot: cell.label().to_string(),
            message: panic_message(payload.as_ref()),
        }
    })?;

    match (shape.ret, result) {
        (None, None) => Ok(()),
        (Some(kind), Some(value)) if value.kind() == kind => {
            // SAFETY: `ret` is the trampoline's return slot.
            unsafe { *ret = value.to_slot() };
            Ok(())
        }
        (expected, found) => Err(BridgeError::CallbackResult {
            slot: cell.label().to_string(),
            expected: expected.map_or_else(|| "void".to_string(), |k| k.to_string()),
            found: found.map_or_else(|| "nothing".to_string(), |v| v.kind().to_string()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
