//! Owned, layout-described buffers and the values that cross the native boundary.
//!
//! [`StructHandle`] is the only way to touch struct memory: every access is checked
//! against the [`LayoutDescriptor`](tether_layout::LayoutDescriptor) the buffer was
//! allocated from. Callback fields are backed by [`CallbackCell`]s whose lifecycle
//! (`Unbound`, `Bound`, `Invalid`) outlives the buffer itself.

use thiserror::Error;

mod handle;
mod slot;
mod value;

pub use handle::StructHandle;
pub use slot::{CallbackCell, CallbackHandler, SlotState, TrampolineFactory};
pub use value::{Arg, ScalarValue, SLOT_BYTES};

#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("Type mismatch on `{field}`: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("{}", out_of_bounds_message(.field, .index))]
    OutOfBounds { field: String, index: Option<usize> },

    #[error("Callback slot `{slot}` was invoked while {state:?}")]
    DanglingCallback { slot: String, state: SlotState },

    #[error("Failed to install trampoline: {0}")]
    Trampoline(String),

    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("Other marshalling error: {0}")]
    Other(String),
}

fn out_of_bounds_message(field: &str, index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("Index {} is out of bounds for `{}`", i, field),
        None => format!("No field `{}`", field),
    }
}
