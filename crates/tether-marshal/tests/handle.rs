mod common;

use common::{every_kind, init_logger, my_point, proc1_signature, FakeFactory, FAKE_BASE};
use std::sync::Arc;
use tether_layout::{describe, FnSignature, Kind, ScalarKind, Schema};
use tether_marshal::{MarshalError, ScalarValue, SlotState, StructHandle};

fn sample(kind: ScalarKind) -> ScalarValue {
    match kind {
        ScalarKind::I8 => ScalarValue::I8(i8::MIN),
        ScalarKind::U8 => ScalarValue::U8(u8::MAX),
        ScalarKind::I16 => ScalarValue::I16(-12345),
        ScalarKind::U16 => ScalarValue::U16(0xbeef),
        ScalarKind::I32 => ScalarValue::I32(i32::MIN + 7),
        ScalarKind::U32 => ScalarValue::U32(0xdead_beef),
        ScalarKind::I64 => ScalarValue::I64(-0x0123_4567_89ab_cdef),
        ScalarKind::U64 => ScalarValue::U64(u64::MAX - 3),
        ScalarKind::ISize => ScalarValue::ISize(-42),
        ScalarKind::USize => ScalarValue::USize(usize::MAX),
        ScalarKind::F32 => ScalarValue::F32(f32::from_bits(0x7fa0_0001)),
        ScalarKind::F64 => ScalarValue::F64(-0.0),
        ScalarKind::Ptr => ScalarValue::Ptr(0x1000_2000),
    }
}

#[test]
fn test_allocation_is_zeroed() {
    init_logger();
    let factory = Arc::new(FakeFactory::default());
    let handle = StructHandle::allocate(every_kind(), factory).unwrap();

    for kind in ScalarKind::ALL {
        let value = handle.read(kind.name()).unwrap();
        assert_eq!(value.kind(), kind);
        assert_eq!(value.bits(), 0);
    }
}

#[test]
fn test_round_trip_every_kind_bit_exact() {
    let factory = Arc::new(FakeFactory::default());
    let mut handle = StructHandle::allocate(every_kind(), factory).unwrap();

    for kind in ScalarKind::ALL {
        handle.write(kind.name(), sample(kind)).unwrap();
    }
    // Read back after all writes so neighbouring fields cannot have clobbered each other.
    for kind in ScalarKind::ALL {
        let back = handle.read(kind.name()).unwrap();
        assert_eq!(back.bits(), sample(kind).bits(), "field {}", kind);
    }
}

#[test]
fn test_write_lands_at_descriptor_offset() {
    let factory = Arc::new(FakeFactory::default());
    let layout = my_point();
    let mut handle = StructHandle::allocate(Arc::clone(&layout), factory).unwrap();

    handle.write("x", ScalarValue::U64(42)).unwrap();
    handle.write_elem("a", 3, ScalarValue::I32(-7)).unwrap();

    let x_offset = layout.field("x").unwrap().offset;
    let a = layout.field("a").unwrap();
    unsafe {
        let base = handle.as_ptr();
        assert_eq!((base.add(x_offset) as *const u64).read_unaligned(), 42);
        let elem = base.add(a.offset + a.element_offset(3).unwrap()) as *const i32;
        assert_eq!(elem.read_unaligned(), -7);
    }
    assert_eq!(handle.read_elem("a", 3).unwrap(), ScalarValue::I32(-7));
    assert_eq!(handle.read_elem("a", 2).unwrap(), ScalarValue::I32(0));
}

#[test]
fn test_type_and_bounds_errors() {
    let factory = Arc::new(FakeFactory::default());
    let mut handle = StructHandle::allocate(my_point(), factory).unwrap();

    // Same width, wrong signedness.
    let err = handle.write("y", ScalarValue::U32(1)).unwrap_err();
    assert!(matches!(err, MarshalError::TypeMismatch { .. }));

    let err = handle.write_elem("a", 15, ScalarValue::I32(1)).unwrap_err();
    assert!(matches!(err, MarshalError::OutOfBounds { index: Some(15), .. }));

    let err = handle.write("nope", ScalarValue::I32(1)).unwrap_err();
    assert!(matches!(err, MarshalError::OutOfBounds { index: None, .. }));

    let err = handle.write("a", ScalarValue::I32(1)).unwrap_err();
    assert!(matches!(err, MarshalError::TypeMismatch { .. }));

    let err = handle.read_elem("x", 0).unwrap_err();
    assert!(matches!(err, MarshalError::TypeMismatch { .. }));

    // Callback fields only change through bind.
    let err = handle.write("proc1", ScalarValue::Ptr(0)).unwrap_err();
    assert!(matches!(err, MarshalError::TypeMismatch { .. }));
}

#[test]
fn test_pointer_fields_accept_addresses_and_refs() {
    let factory = Arc::new(FakeFactory::default());
    let mut handle = StructHandle::allocate(my_point(), factory.clone()).unwrap();
    let other = StructHandle::allocate(my_point(), factory).unwrap();

    handle.write_elem("b", 1, ScalarValue::Ptr(0xabc0)).unwrap();
    assert_eq!(handle.read_elem("b", 1).unwrap(), ScalarValue::Ptr(0xabc0));

    // `x1` points at a u64, not at a `my_point`.
    let err = handle.write_ref("x1", Some(&other)).unwrap_err();
    assert!(matches!(err, MarshalError::TypeMismatch { .. }));

    handle.write_ref("x1", None).unwrap();
    assert_eq!(handle.read("x1").unwrap(), ScalarValue::null());
}

#[test]
fn test_write_ref_checks_record_name() {
    let factory = Arc::new(FakeFactory::default());
    let node = Arc::new(
        describe(
            &Schema::structure("node")
                .field("value", Kind::Scalar(ScalarKind::I32))
                .field("next", Kind::pointer_to_record("node"))
                .field("any", Kind::opaque_pointer()),
        )
        .unwrap(),
    );
    let mut head = StructHandle::allocate(Arc::clone(&node), factory.clone()).unwrap();
    let tail = StructHandle::allocate(node, factory.clone()).unwrap();
    let stranger = StructHandle::allocate(my_point(), factory).unwrap();

    head.write_ref("next", Some(&tail)).unwrap();
    assert_eq!(head.read("next").unwrap(), ScalarValue::Ptr(tail.address()));

    let err = head.write_ref("next", Some(&stranger)).unwrap_err();
    assert!(matches!(err, MarshalError::TypeMismatch { .. }));

    head.write_ref("any", Some(&stranger)).unwrap();
    assert_eq!(head.read("any").unwrap(), ScalarValue::Ptr(stranger.address()));
}

#[test]
fn test_callback_slot_lifecycle() {
    init_logger();
    let factory = Arc::new(FakeFactory::default());
    let mut handle = StructHandle::allocate(my_point(), factory.clone()).unwrap();

    // Installed eagerly, so the field already holds an entry address.
    assert_eq!(handle.slot_state("proc1").unwrap(), SlotState::Unbound);
    assert_eq!(handle.read("proc1").unwrap(), ScalarValue::Ptr(FAKE_BASE + 0x10));
    let cell = factory.cell("my_point.proc1").unwrap();
    assert!(cell.handler().is_err());

    handle
        .bind("proc1", Arc::new(|_args: &[ScalarValue]| Some(ScalarValue::U64(1))))
        .unwrap();
    assert_eq!(handle.slot_state("proc1").unwrap(), SlotState::Bound);
    let handler = cell.handler().unwrap();
    assert_eq!(handler(&[]), Some(ScalarValue::U64(1)));

    handle.unbind("proc1").unwrap();
    assert_eq!(handle.slot_state("proc1").unwrap(), SlotState::Unbound);

    handle.release();
    assert_eq!(cell.state(), SlotState::Invalid);
    match cell.handler() {
        Err(MarshalError::DanglingCallback { slot, state }) => {
            assert_eq!(slot, "my_point.proc1");
            assert_eq!(state, SlotState::Invalid);
        }
        other => panic!("expected a dangling callback, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_bind_rejects_non_callback_field() {
    let factory = Arc::new(FakeFactory::default());
    let mut handle = StructHandle::allocate(my_point(), factory).unwrap();
    let err = handle
        .bind("x", Arc::new(|_args: &[ScalarValue]| None))
        .unwrap_err();
    assert!(matches!(err, MarshalError::TypeMismatch { .. }));
}

#[test]
fn test_union_callback_installed_on_bind() {
    let factory = Arc::new(FakeFactory::default());
    let unia = Arc::new(
        describe(
            &Schema::union("unia")
                .field("l2", Kind::Scalar(ScalarKind::U64))
                .field("proc", Kind::callback(proc1_signature())),
        )
        .unwrap(),
    );
    let mut handle = StructHandle::allocate(unia, factory.clone()).unwrap();

    // Nothing is written into a union until the callback member is chosen.
    assert!(factory.cells.lock().is_empty());
    assert_eq!(handle.read("l2").unwrap(), ScalarValue::U64(0));

    handle
        .bind("proc", Arc::new(|_args: &[ScalarValue]| Some(ScalarValue::U64(0))))
        .unwrap();
    assert_eq!(factory.cells.lock().len(), 1);
    assert_eq!(handle.read("proc").unwrap(), ScalarValue::Ptr(FAKE_BASE + 0x10));
}

#[test]
fn test_union_callback_members_keep_their_own_slots() {
    let factory = Arc::new(FakeFactory::default());
    let float_signature = FnSignature::new(
        vec![Kind::Scalar(ScalarKind::F64)],
        Kind::Scalar(ScalarKind::F64),
    )
    .unwrap();
    let both = Arc::new(
        describe(
            &Schema::union("u")
                .field("a", Kind::callback(proc1_signature()))
                .field("b", Kind::callback(float_signature.clone())),
        )
        .unwrap(),
    );
    let mut handle = StructHandle::allocate(both, factory.clone()).unwrap();

    handle
        .bind("a", Arc::new(|_args: &[ScalarValue]| Some(ScalarValue::U64(1))))
        .unwrap();
    let installed = factory.cell("u.a").unwrap();
    assert_eq!(**installed.signature(), proc1_signature());
    assert!(factory.cell("u.b").is_none());
    assert_eq!(handle.slot_state("a").unwrap(), SlotState::Bound);
    assert_eq!(handle.slot_state("b").unwrap(), SlotState::Unbound);

    handle
        .bind("b", Arc::new(|args: &[ScalarValue]| Some(args[0])))
        .unwrap();
    assert_eq!(**factory.cell("u.b").unwrap().signature(), float_signature);
    assert_eq!(handle.read("b").unwrap(), ScalarValue::Ptr(FAKE_BASE + 0x20));
}

#[test]
fn test_union_rebind_rewrites_entry_point() {
    let factory = Arc::new(FakeFactory::default());
    let unia = Arc::new(
        describe(
            &Schema::union("unia")
                .field("l2", Kind::Scalar(ScalarKind::U64))
                .field("proc", Kind::callback(proc1_signature())),
        )
        .unwrap(),
    );
    let mut handle = StructHandle::allocate(unia, factory.clone()).unwrap();
    let handler = || Arc::new(|_args: &[ScalarValue]| Some(ScalarValue::U64(0)));

    handle.bind("proc", handler()).unwrap();
    handle.write("l2", ScalarValue::U64(5)).unwrap();
    assert_eq!(handle.read("proc").unwrap(), ScalarValue::Ptr(5));

    handle.bind("proc", handler()).unwrap();
    assert_eq!(handle.read("proc").unwrap(), ScalarValue::Ptr(FAKE_BASE + 0x10));
    // The entry point is compiled once per slot.
    assert_eq!(factory.cells.lock().len(), 1);
}

#[test]
fn test_callback_arrays_get_one_slot_each() {
    let factory = Arc::new(FakeFactory::default());
    let table = Arc::new(
        describe(&Schema::structure("table").array("procs", Kind::callback(proc1_signature()), 3))
            .unwrap(),
    );
    let mut handle = StructHandle::allocate(table, factory.clone()).unwrap();
    assert_eq!(factory.cells.lock().len(), 3);

    handle
        .bind_elem("procs", 1, Arc::new(|_args: &[ScalarValue]| None))
        .unwrap();
    assert_eq!(handle.slot_state_elem("procs", 0).unwrap(), SlotState::Unbound);
    assert_eq!(handle.slot_state_elem("procs", 1).unwrap(), SlotState::Bound);
    assert!(factory.cell("table.procs[1]").is_some());

    let err = handle.slot_state_elem("procs", 3).unwrap_err();
    assert!(matches!(err, MarshalError::OutOfBounds { .. }));
}

#[test]
fn test_handle_moves_across_threads() {
    let factory = Arc::new(FakeFactory::default());
    let mut handle = StructHandle::allocate(my_point(), factory).unwrap();
    handle.write("y", ScalarValue::I32(5)).unwrap();

    let handle = std::thread::spawn(move || {
        handle.write("x", ScalarValue::U64(6)).unwrap();
        handle
    })
    .join()
    .unwrap();
    assert_eq!(handle.read("x").unwrap(), ScalarValue::U64(6));
    assert_eq!(handle.read("y").unwrap(), ScalarValue::I32(5));
}
