// Shared fixtures for marshalling tests

use parking_lot::Mutex;
use std::sync::Arc;
use tether_layout::{describe, FnSignature, Kind, LayoutDescriptor, ScalarKind, Schema};
use tether_marshal::{CallbackCell, MarshalError, TrampolineFactory};

/// Hands out fake entry addresses and remembers every cell it was given.
#[derive(Default)]
pub struct FakeFactory {
    pub cells: Mutex<Vec<Arc<CallbackCell>>>,
}

pub const FAKE_BASE: usize = 0x1000;

impl TrampolineFactory for FakeFactory {
    fn install(&self, cell: &Arc<CallbackCell>) -> Result<usize, MarshalError> {
        let mut cells = self.cells.lock();
        cells.push(Arc::clone(cell));
        Ok(FAKE_BASE + 0x10 * cells.len())
    }
}

impl FakeFactory {
    pub fn cell(&self, label: &str) -> Option<Arc<CallbackCell>> {
        self.cells.lock().iter().find(|c| c.label() == label).cloned()
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn proc1_signature() -> FnSignature {
    FnSignature::new(
        vec![Kind::Scalar(ScalarKind::I32), Kind::pointer_to(ScalarKind::I32)],
        Kind::Scalar(ScalarKind::U64),
    )
    .unwrap()
}

pub fn my_point() -> Arc<LayoutDescriptor> {
    let schema = Schema::structure("my_point")
        .field("x", Kind::Scalar(ScalarKind::U64))
        .field("x1", Kind::pointer_to(ScalarKind::U64))
        .field("y", Kind::Scalar(ScalarKind::I32))
        .array("a", Kind::Scalar(ScalarKind::I32), 15)
        .array("b", Kind::pointer_to(ScalarKind::I32), 2)
        .field("proc1", Kind::callback(proc1_signature()));
    Arc::new(describe(&schema).unwrap())
}

/// One field of every scalar kind, interleaved so that padding is exercised.
pub fn every_kind() -> Arc<LayoutDescriptor> {
    let mut schema = Schema::structure("every_kind");
    for kind in ScalarKind::ALL {
        schema = schema.field(kind.name(), Kind::Scalar(kind));
    }
    Arc::new(describe(&schema).unwrap())
}
