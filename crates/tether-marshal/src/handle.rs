use crate::slot::{CallbackCell, CallbackHandler, SlotState, TrampolineFactory};
use crate::value::{ScalarValue, SLOT_BYTES};
use crate::MarshalError;
use rustc_hash::FxHashMap;
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use tether_layout::{FieldLayout, Kind, LayoutDescriptor, Pointee, ScalarKind};

struct Slot {
    cell: Arc<CallbackCell>,
    /// Absolute byte offset of the function pointer.
    offset: usize,
    /// Entry point of the cell, once installed.
    address: Option<usize>,
}

/// Callback slots are keyed by path and element index: union members share offsets.
type SlotKey = (String, Option<usize>);

/// `"points[ 1 ].cb"` and `"points[1].cb"` name the same slot.
fn slot_key(path: &str, index: Option<usize>) -> SlotKey {
    (path.split_whitespace().collect(), index)
}

/// An owned, zero-initialised region of memory laid out per a [`LayoutDescriptor`].
///
/// All access goes through field paths checked against the descriptor. Callback
/// fields are not written directly; they are managed through [`StructHandle::bind`]
/// and become invalid when the handle is released.
///
/// The handle may be moved to another thread but is not shared: native code writing
/// to it concurrently needs coordination by the caller.
pub struct StructHandle {
    ptr: NonNull<u8>,
    alloc_layout: Layout,
    layout: Arc<LayoutDescriptor>,
    slots: FxHashMap<SlotKey, Slot>,
    factory: Arc<dyn TrampolineFactory>,
}

// SAFETY: the handle exclusively owns its allocation; every other member is Send.
unsafe impl Send for StructHandle {}

impl StructHandle {
    /// Allocates zeroed memory for `layout` and prepares its callback slots.
    ///
    /// Callback fields outside unions get their trampoline written immediately so
    /// that a native call through a slot that was never bound is caught. Callback
    /// members of unions are only written when bound.
    pub fn allocate(
        layout: Arc<LayoutDescriptor>,
        factory: Arc<dyn TrampolineFactory>,
    ) -> Result<Self, MarshalError> {
        let alloc_layout = Layout::from_size_align(layout.size_bytes().max(1), layout.align_bytes())
            .map_err(|e| MarshalError::Allocation(format!("{}: {}", layout.name(), e)))?;
        // SAFETY: size is non-zero.
        let raw = unsafe { alloc::alloc_zeroed(alloc_layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(alloc_layout),
        };

        let mut handle = StructHandle {
            ptr,
            alloc_layout,
            layout: Arc::clone(&layout),
            slots: FxHashMap::default(),
            factory,
        };

        for site in layout.callback_sites() {
            let label = match site.index {
                Some(i) => format!("{}.{}[{}]", layout.name(), site.path, i),
                None => format!("{}.{}", layout.name(), site.path),
            };
            let cell = CallbackCell::new(label, Arc::clone(&site.signature));
            let address = if site.in_union {
                None
            } else {
                let address = handle.factory.install(&cell)?;
                handle.store(site.offset, ScalarValue::Ptr(address));
                Some(address)
            };
            handle.slots.insert(
                slot_key(&site.path, site.index),
                Slot {
                    cell,
                    offset: site.offset,
                    address,
                },
            );
        }

        log::debug!(
            "Allocated `{}` ({} bytes, align {}, {} callback slots) at {:p}",
            layout.name(),
            layout.size_bytes(),
            layout.align_bytes(),
            handle.slots.len(),
            handle.ptr
        );
        Ok(handle)
    }

    pub fn layout(&self) -> &Arc<LayoutDescriptor> {
        &self.layout
    }

    /// Address of the struct, as passed across the boundary.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Writes a non-array scalar, pointer or address field.
    pub fn write(&mut self, path: &str, value: ScalarValue) -> Result<(), MarshalError> {
        let (offset, field) = self.locate(path, None)?;
        check_writable(path, field, &value)?;
        self.store(offset, value);
        Ok(())
    }

    /// Writes element `index` of an array field.
    pub fn write_elem(&mut self, path: &str, index: usize, value: ScalarValue) -> Result<(), MarshalError> {
        let (offset, field) = self.locate(path, Some(index))?;
        check_writable(path, field, &value)?;
        self.store(offset, value);
        Ok(())
    }

    /// Reads a non-array field. Callback fields read as their current address.
    pub fn read(&self, path: &str) -> Result<ScalarValue, MarshalError> {
        let (offset, field) = self.locate(path, None)?;
        let kind = readable_kind(path, field)?;
        Ok(self.load(offset, kind))
    }

    /// Reads element `index` of an array field.
    pub fn read_elem(&self, path: &str, index: usize) -> Result<ScalarValue, MarshalError> {
        let (offset, field) = self.locate(path, Some(index))?;
        let kind = readable_kind(path, field)?;
        Ok(self.load(offset, kind))
    }

    /// Stores the address of `target` (or null) in a pointer field, without taking
    /// ownership. The caller keeps `target` alive while native code may use it.
    pub fn write_ref(&mut self, path: &str, target: Option<&StructHandle>) -> Result<(), MarshalError> {
        let (offset, field) = self.locate(path, None)?;
        let address = match (&field.kind, target) {
            (Kind::Pointer(_), None) => 0,
            (Kind::Pointer(Pointee::Opaque), Some(target)) => target.address(),
            (Kind::Pointer(Pointee::Record(name)), Some(target)) if name == target.layout.name() => {
                target.address()
            }
            (kind, target) => {
                return Err(MarshalError::TypeMismatch {
                    field: path.to_string(),
                    expected: kind.to_string(),
                    found: target.map_or_else(|| "null".to_string(), |t| format!("&{}", t.layout.name())),
                })
            }
        };
        self.store(offset, ScalarValue::Ptr(address));
        Ok(())
    }

    /// Binds `handler` to a non-array callback field.
    pub fn bind(&mut self, path: &str, handler: CallbackHandler) -> Result<(), MarshalError> {
        self.locate_callback(path, None)?;
        self.bind_at(slot_key(path, None), handler)
    }

    /// Binds `handler` to element `index` of a callback array.
    pub fn bind_elem(&mut self, path: &str, index: usize, handler: CallbackHandler) -> Result<(), MarshalError> {
        self.locate_callback(path, Some(index))?;
        self.bind_at(slot_key(path, Some(index)), handler)
    }

    /// Returns a bound slot to `Unbound`. Native calls through it are reported again.
    pub fn unbind(&mut self, path: &str) -> Result<(), MarshalError> {
        self.locate_callback(path, None)?;
        self.slot(path, None)?.cell.unbind();
        Ok(())
    }

    pub fn slot_state(&self, path: &str) -> Result<SlotState, MarshalError> {
        self.locate_callback(path, None)?;
        Ok(self.slot(path, None)?.cell.state())
    }

    pub fn slot_state_elem(&self, path: &str, index: usize) -> Result<SlotState, MarshalError> {
        self.locate_callback(path, Some(index))?;
        Ok(self.slot(path, Some(index))?.cell.state())
    }

    /// Frees the struct. Every callback slot becomes `Invalid`.
    pub fn release(self) {
        drop(self);
    }

    /// Binds the slot and (re)writes its entry point. A union member may have been
    /// overwritten through another member since the last bind.
    fn bind_at(&mut self, key: SlotKey, handler: CallbackHandler) -> Result<(), MarshalError> {
        let factory = Arc::clone(&self.factory);
        let slot = self.slots.get_mut(&key).ok_or_else(|| MarshalError::OutOfBounds {
            field: key.0.clone(),
            index: key.1,
        })?;
        let address = match slot.address {
            Some(address) => address,
            None => {
                let address = factory.install(&slot.cell)?;
                slot.address = Some(address);
                address
            }
        };
        slot.cell.bind(handler)?;
        log::trace!("Bound callback slot `{}`", slot.cell.label());
        let offset = slot.offset;
        self.store(offset, ScalarValue::Ptr(address));
        Ok(())
    }

    fn slot(&self, path: &str, index: Option<usize>) -> Result<&Slot, MarshalError> {
        self.slots
            .get(&slot_key(path, index))
            .ok_or_else(|| MarshalError::OutOfBounds {
                field: path.to_string(),
                index,
            })
    }

    /// Checks that `path` (and `index`) name an element of a callback field.
    fn locate_callback(&self, path: &str, index: Option<usize>) -> Result<(), MarshalError> {
        let (_, field) = self.locate(path, index)?;
        match field.kind {
            Kind::Callback(_) => Ok(()),
            _ => Err(MarshalError::TypeMismatch {
                field: path.to_string(),
                expected: field.kind.to_string(),
                found: "callback".to_string(),
            }),
        }
    }

    /// Resolves `path` (and element `index` for arrays) to an absolute offset.
    fn locate(&self, path: &str, index: Option<usize>) -> Result<(usize, &FieldLayout), MarshalError> {
        let resolved = self.layout.resolve(path).ok_or_else(|| MarshalError::OutOfBounds {
            field: path.to_string(),
            index,
        })?;
        let field = resolved.field;
        let element = match (field.count, index) {
            (None, None) => 0,
            (Some(_), Some(i)) => field.element_offset(i).ok_or_else(|| MarshalError::OutOfBounds {
                field: path.to_string(),
                index: Some(i),
            })?,
            (Some(count), None) => {
                return Err(MarshalError::TypeMismatch {
                    field: path.to_string(),
                    expected: format!("{}[{}] (element index required)", field.kind, count),
                    found: "whole array".to_string(),
                })
            }
            (None, Some(i)) => {
                return Err(MarshalError::TypeMismatch {
                    field: path.to_string(),
                    expected: field.kind.to_string(),
                    found: format!("element [{}] of a non-array field", i),
                })
            }
        };
        Ok((resolved.offset + element, field))
    }

    fn store(&mut self, offset: usize, value: ScalarValue) {
        let mut buf = [0u8; SLOT_BYTES];
        value.write_bytes(&mut buf);
        let width = value.kind().size_bytes();
        debug_assert!(offset + width <= self.layout.size_bytes());
        // SAFETY: offsets come from the descriptor this allocation was sized by.
        unsafe { ptr::copy_nonoverlapping(buf.as_ptr(), self.ptr.as_ptr().add(offset), width) };
    }

    fn load(&self, offset: usize, kind: ScalarKind) -> ScalarValue {
        let mut buf = [0u8; SLOT_BYTES];
        let width = kind.size_bytes();
        debug_assert!(offset + width <= self.layout.size_bytes());
        // SAFETY: as in `store`.
        unsafe { ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), buf.as_mut_ptr(), width) };
        ScalarValue::read_bytes(kind, &buf)
    }
}

fn check_writable(path: &str, field: &FieldLayout, value: &ScalarValue) -> Result<(), MarshalError> {
    let mismatch = |expected: String| MarshalError::TypeMismatch {
        field: path.to_string(),
        expected,
        found: value.kind().to_string(),
    };
    match &field.kind {
        Kind::Callback(_) => Err(mismatch(format!("{} (set through bind)", field.kind))),
        kind => match kind.wire_kind() {
            Some(wire) if wire == value.kind() => Ok(()),
            _ => Err(mismatch(kind.to_string())),
        },
    }
}

fn readable_kind(path: &str, field: &FieldLayout) -> Result<ScalarKind, MarshalError> {
    field.kind.wire_kind().ok_or_else(|| MarshalError::TypeMismatch {
        field: path.to_string(),
        expected: field.kind.to_string(),
        found: "scalar".to_string(),
    })
}

impl Drop for StructHandle {
    fn drop(&mut self) {
        for slot in self.slots.values() {
            slot.cell.invalidate();
        }
        log::debug!("Released `{}` at {:p}", self.layout.name(), self.ptr);
        // SAFETY: allocated in `allocate` with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.alloc_layout) };
    }
}

impl fmt::Debug for StructHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructHandle")
            .field("layout", &self.layout.name())
            .field("ptr", &self.ptr)
            .field("slots", &self.slots.len())
            .finish()
    }
}
