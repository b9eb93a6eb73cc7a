use crate::value::ScalarValue;
use crate::MarshalError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tether_layout::FnSignature;

/// Caller-supplied logic behind a callback slot.
///
/// Receives the marshalled native arguments and returns the value handed back to the
/// native caller (`None` for `void` callbacks).
pub type CallbackHandler = Arc<dyn Fn(&[ScalarValue]) -> Option<ScalarValue> + Send + Sync>;

/// Lifecycle of a callback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Unbound,
    Bound,
    /// The owning struct was released. Terminal.
    Invalid,
}

enum CellState {
    Unbound,
    Bound(CallbackHandler),
    Invalid,
}

/// Shared state behind one function-pointer slot.
///
/// The generated native entry point refers to the cell, not to the struct memory, so
/// the cell outlives the struct and a late call through a stale pointer finds the
/// slot `Invalid` instead of freed memory.
pub struct CallbackCell {
    label: String,
    signature: Arc<FnSignature>,
    state: RwLock<CellState>,
}

impl CallbackCell {
    pub fn new(label: impl Into<String>, signature: Arc<FnSignature>) -> Arc<Self> {
        Arc::new(CallbackCell {
            label: label.into(),
            signature,
            state: RwLock::new(CellState::Unbound),
        })
    }

    /// `record.path` of the slot, for diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn signature(&self) -> &Arc<FnSignature> {
        &self.signature
    }

    pub fn state(&self) -> SlotState {
        match *self.state.read() {
            CellState::Unbound => SlotState::Unbound,
            CellState::Bound(_) => SlotState::Bound,
            CellState::Invalid => SlotState::Invalid,
        }
    }

    /// The bound handler, cloned so no lock is held while it runs.
    pub fn handler(&self) -> Result<CallbackHandler, MarshalError> {
        let state = match &*self.state.read() {
            CellState::Bound(handler) => return Ok(Arc::clone(handler)),
            CellState::Unbound => SlotState::Unbound,
            CellState::Invalid => SlotState::Invalid,
        };
        Err(MarshalError::DanglingCallback {
            slot: self.label.clone(),
            state,
        })
    }

    pub(crate) fn bind(&self, handler: CallbackHandler) -> Result<(), MarshalError> {
        let mut state = self.state.write();
        if let CellState::Invalid = *state {
            return Err(MarshalError::DanglingCallback {
                slot: self.label.clone(),
                state: SlotState::Invalid,
            });
        }
        *state = CellState::Bound(handler);
        Ok(())
    }

    pub(crate) fn unbind(&self) {
        let mut state = self.state.write();
        if let CellState::Bound(_) = *state {
            *state = CellState::Unbound;
        }
    }

    pub(crate) fn invalidate(&self) {
        *self.state.write() = CellState::Invalid;
    }
}

impl fmt::Debug for CallbackCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackCell")
            .field("label", &self.label)
            .field("signature", &self.signature.to_string())
            .field("state", &self.state())
            .finish()
    }
}

/// Produces native entry points for callback slots.
///
/// `install` returns the address of code with the cell's exact native signature that
/// dispatches into the cell. The factory must keep the cell alive for as long as that
/// code can be called.
pub trait TrampolineFactory: Send + Sync {
    fn install(&self, cell: &Arc<CallbackCell>) -> Result<usize, MarshalError>;
}
