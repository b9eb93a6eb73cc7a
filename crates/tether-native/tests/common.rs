// Far-side fixtures: plain `extern "C"` functions standing in for a native library.
#![allow(dead_code)]

use memoffset::offset_of;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tether_layout::{describe, FnSignature, Kind, LayoutDescriptor, ScalarKind, Schema};
use tether_native::{Bridge, FunctionRef};

pub type Proc1 = unsafe extern "C" fn(i32, *mut i32) -> u64;

#[repr(C)]
pub struct MyPoint {
    pub x: u64,
    pub x1: *mut u64,
    pub y: i32,
    pub a: [i32; 15],
    pub b: [*mut i32; 2],
    pub proc1: Option<Proc1>,
}

/// Counts calls into `do_something`, to check that rejected invocations never run.
pub static DO_SOMETHING_CALLS: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static LAST_PROC1_RESULT: Cell<Option<u64>> = const { Cell::new(None) };
}

/// What `proc1` returned to the most recent `do_something` on this thread.
pub fn take_proc1_result() -> Option<u64> {
    LAST_PROC1_RESULT.with(Cell::take)
}

/// Sums its integer arguments. If `p` has a callback, calls `proc1(0x1234, &i1)` first
/// and records its result without touching `p`.
pub unsafe extern "C" fn do_something(
    p: *mut MyPoint,
    c1: i8,
    c2: u8,
    s1: i16,
    s2: u16,
    mut i1: i32,
    i2: u32,
    l1: i64,
    l2: u64,
    _f: f32,
    _d: f64,
) -> i32 {
    DO_SOMETHING_CALLS.fetch_add(1, Ordering::SeqCst);
    if !p.is_null() {
        if let Some(proc1) = (*p).proc1 {
            let rc = proc1(0x1234, &mut i1);
            LAST_PROC1_RESULT.with(|last| last.set(Some(rc)));
        }
    }
    (c1 as i64 + c2 as i64 + s1 as i64 + s2 as i64 + i1 as i64 + i2 as i64 + l1 + l2 as i64) as i32
}

pub extern "C" fn voidproc() {}

pub extern "C" fn widen_i8(v: i8) -> i64 {
    v as i64
}

pub extern "C" fn widen_u16(v: u16) -> u64 {
    v as u64
}

pub extern "C" fn f32_bits(v: f32) -> u32 {
    v.to_bits()
}

pub extern "C" fn bits_f64(v: u64) -> f64 {
    f64::from_bits(v)
}

/// `cb(a, b)` for a `cproc`-typed callback.
pub unsafe extern "C" fn apply(cb: Option<unsafe extern "C" fn(i32, i32) -> i32>, a: i32, b: i32) -> i32 {
    match cb {
        Some(cb) => cb(a, b),
        None => -1,
    }
}

/// Calls `cb` with a float and a double and hands back what it returned.
pub unsafe extern "C" fn apply_float(cb: unsafe extern "C" fn(f32, f64) -> f32, a: f32, b: f64) -> f32 {
    cb(a, b)
}

/// Field offsets of the Rust mirror, as the C compiler lays out `struct my_point`.
pub fn my_point_offsets() -> [(&'static str, usize); 6] {
    [
        ("x", offset_of!(MyPoint, x)),
        ("x1", offset_of!(MyPoint, x1)),
        ("y", offset_of!(MyPoint, y)),
        ("a", offset_of!(MyPoint, a)),
        ("b", offset_of!(MyPoint, b)),
        ("proc1", offset_of!(MyPoint, proc1)),
    ]
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn bridge() -> Bridge {
    init_logger();
    Bridge::new().unwrap()
}

pub fn scalar(kind: ScalarKind) -> Kind {
    Kind::Scalar(kind)
}

pub fn proc1_signature() -> FnSignature {
    FnSignature::new(
        vec![scalar(ScalarKind::I32), Kind::pointer_to(ScalarKind::I32)],
        scalar(ScalarKind::U64),
    )
    .unwrap()
}

pub fn cproc_signature() -> FnSignature {
    FnSignature::new(
        vec![scalar(ScalarKind::I32), scalar(ScalarKind::I32)],
        scalar(ScalarKind::I32),
    )
    .unwrap()
}

pub fn my_point() -> Arc<LayoutDescriptor> {
    let schema = Schema::structure("my_point")
        .field("x", scalar(ScalarKind::U64))
        .field("x1", Kind::pointer_to(ScalarKind::U64))
        .field("y", scalar(ScalarKind::I32))
        .array("a", scalar(ScalarKind::I32), 15)
        .array("b", Kind::pointer_to(ScalarKind::I32), 2)
        .field("proc1", Kind::callback(proc1_signature()));
    Arc::new(describe(&schema).unwrap())
}

pub fn do_something_ref() -> FunctionRef {
    let signature = FnSignature::new(
        vec![
            Kind::pointer_to_record("my_point"),
            scalar(ScalarKind::I8),
            scalar(ScalarKind::U8),
            scalar(ScalarKind::I16),
            scalar(ScalarKind::U16),
            scalar(ScalarKind::I32),
            scalar(ScalarKind::U32),
            scalar(ScalarKind::I64),
            scalar(ScalarKind::U64),
            scalar(ScalarKind::F32),
            scalar(ScalarKind::F64),
        ],
        scalar(ScalarKind::I32),
    )
    .unwrap();
    unsafe { FunctionRef::from_address(do_something as usize, signature) }
        .unwrap()
        .named("do_something")
}

pub fn apply_ref() -> FunctionRef {
    let signature = FnSignature::new(
        vec![
            Kind::callback(cproc_signature()),
            scalar(ScalarKind::I32),
            scalar(ScalarKind::I32),
        ],
        scalar(ScalarKind::I32),
    )
    .unwrap();
    unsafe { FunctionRef::from_address(apply as usize, signature) }
        .unwrap()
        .named("apply")
}

/// A one-field struct holding a `cproc`, for passing callbacks as plain arguments.
pub fn cproc_holder() -> Arc<LayoutDescriptor> {
    Arc::new(
        describe(&Schema::structure("cproc_holder").field("cb", Kind::callback(cproc_signature())))
            .unwrap(),
    )
}

pub fn unary(address: usize, param: ScalarKind, ret: ScalarKind) -> FunctionRef {
    let signature = FnSignature::new(vec![scalar(param)], scalar(ret)).unwrap();
    unsafe { FunctionRef::from_address(address, signature) }.unwrap()
}
