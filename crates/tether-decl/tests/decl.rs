use std::fs;
use std::mem::size_of;
use tether_decl::{DeclError, Declarations};
use tether_layout::{Kind, Pointee, RecordKind, ScalarKind};
use tether_native::OptLevel;

const DEMO: &str = r#"
library = "./libdemo.so"

[native]
opt_level = "speed"
verify = true

[constants]
FOO = "(1 << 2)"
BAR = "FOO + 10"

[[struct]]
name = "my_point"
fields = [
  { name = "x", type = "unsigned long long" },
  { name = "x1", type = "unsigned long long *" },
  { name = "y", type = "int" },
  { name = "a", type = "int", count = "BAR + 1" },
  { name = "b", type = "*int", count = 2 },
  { name = "proc1", type = "fn(int, *int) -> u64" },
]

[[union]]
name = "Unia"
fields = [
  { name = "c1", type = "char" },
  { name = "ll2", type = "u64" },
  { name = "proc", type = "fn(int, int *) -> int" },
]

[callbacks]
cproc = "fn(int, int) -> int"

[functions]
do_something = "fn(*my_point, char, unsigned char, short, unsigned short, int, unsigned int, i64, u64, float, double) -> int"
voidproc = "fn()"
apply = "fn(cproc, int, int) -> int"
"#;

#[test]
fn test_demo_declarations() {
    let decls = Declarations::parse(DEMO).unwrap();

    assert_eq!(decls.constant("FOO"), Some(4));
    assert_eq!(decls.constant("BAR"), Some(14));
    assert_eq!(decls.native().opt_level, OptLevel::Speed);

    let point = decls.record("my_point").unwrap();
    let a = point.field("a").unwrap();
    assert_eq!(a.count, Some(15));
    assert_eq!(a.kind, Kind::Scalar(ScalarKind::I32));
    assert_eq!(point.field("x1").unwrap().kind, Kind::pointer_to(ScalarKind::U64));
    assert!(matches!(point.field("proc1").unwrap().kind, Kind::Callback(_)));
    assert_eq!(point.callback_sites().len(), 1);

    let unia = decls.record("Unia").unwrap();
    assert_eq!(unia.kind(), RecordKind::Union);
    assert_eq!(unia.size_bytes(), 8);

    let names: Vec<_> = decls.records().map(|r| r.name().to_string()).collect();
    assert_eq!(names, vec!["my_point", "Unia"]);

    let do_something = decls.function("do_something").unwrap();
    assert_eq!(do_something.params().len(), 11);
    assert_eq!(do_something.params()[0], Kind::Pointer(Pointee::Record("my_point".into())));
    assert_eq!(*do_something.ret(), Kind::Scalar(ScalarKind::I32));
    assert_eq!(*decls.function("voidproc").unwrap().ret(), Kind::Void);

    let apply = decls.function("apply").unwrap();
    assert_eq!(apply.params()[0], Kind::Callback(decls.callback("cproc").unwrap().clone()));
}

#[test]
fn test_c_long_follows_platform() {
    let decls = Declarations::parse(
        r#"
[[struct]]
name = "longs"
fields = [{ name = "l", type = "long" }, { name = "ul", type = "unsigned long" }]
"#,
    )
    .unwrap();
    let longs = decls.record("longs").unwrap();
    assert_eq!(
        longs.field("l").unwrap().size_bytes,
        size_of::<std::ffi::c_long>()
    );
    assert_eq!(longs.size_bytes(), 2 * size_of::<std::ffi::c_long>());
}

#[test]
fn test_plain_char_follows_platform() {
    let decls = Declarations::parse(
        r#"
[[struct]]
name = "chars"
fields = [
  { name = "c", type = "char" },
  { name = "sc", type = "signed char" },
  { name = "uc", type = "unsigned char" },
]
"#,
    )
    .unwrap();
    let chars = decls.record("chars").unwrap();
    let plain = if std::ffi::c_char::MIN == 0 { ScalarKind::U8 } else { ScalarKind::I8 };
    assert_eq!(chars.field("c").unwrap().kind, Kind::Scalar(plain));
    assert_eq!(chars.field("sc").unwrap().kind, Kind::Scalar(ScalarKind::I8));
    assert_eq!(chars.field("uc").unwrap().kind, Kind::Scalar(ScalarKind::U8));
}

#[test]
fn test_enum_members_number_like_c() {
    let decls = Declarations::parse(
        r#"
[constants]
BASE = 40

[[enum]]
name = "some_values"
values = ["a_value", "another_value", "yet_another_value", { name = "xx", value = "yet_another_value + 100" }]

[[enum]]
name = "flags"
values = [{ name = "F_LOW", value = "BASE + 2" }, "F_NEXT", { name = "F_HIGH", value = "1 << 4" }]

[[struct]]
name = "tagged"
fields = [{ name = "tag", type = "enum some_values" }, { name = "slots", type = "int", count = "F_NEXT" }]

[functions]
pick = "fn(flags) -> some_values"
"#,
    )
    .unwrap();

    let values: Vec<i64> = decls
        .enumeration("some_values")
        .unwrap()
        .iter()
        .map(|(_, value)| *value)
        .collect();
    assert_eq!(values, vec![0, 1, 2, 102]);
    assert_eq!(decls.constant("xx"), Some(102));
    assert_eq!(decls.constant("F_LOW"), Some(42));
    assert_eq!(decls.constant("F_NEXT"), Some(43));
    assert_eq!(decls.constant("F_HIGH"), Some(16));
    assert_eq!(decls.enumeration("flags").unwrap()[1].0, "F_NEXT");
    assert!(decls.enumeration("missing").is_none());

    let tagged = decls.record("tagged").unwrap();
    assert_eq!(tagged.field("tag").unwrap().kind, Kind::Scalar(ScalarKind::I32));
    assert_eq!(tagged.field("slots").unwrap().count, Some(43));

    let pick = decls.function("pick").unwrap();
    assert_eq!(pick.params()[0], Kind::Scalar(ScalarKind::I32));
    assert_eq!(*pick.ret(), Kind::Scalar(ScalarKind::I32));
}

#[test]
fn test_enum_errors() {
    let err = Declarations::parse(
        r#"
[[enum]]
name = "e"
values = ["A", "A"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, DeclError::Duplicate(name) if name == "A"));

    let err = Declarations::parse(
        r#"
[constants]
A = 1

[[enum]]
name = "e"
values = ["A"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, DeclError::Duplicate(_)));

    let err = Declarations::parse(
        r#"
[[enum]]
name = "e"
values = [{ name = "A", value = "B" }, "B"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, DeclError::Cycle(_)));
}

#[test]
fn test_records_resolve_in_any_order() {
    let decls = Declarations::parse(
        r#"
[[struct]]
name = "outer"
fields = [{ name = "inner", type = "struct inner" }, { name = "next", type = "*outer" }]

[[struct]]
name = "inner"
fields = [{ name = "v", type = "double" }]
"#,
    )
    .unwrap();
    let outer = decls.record("outer").unwrap();
    assert_eq!(outer.size_bytes(), 16);
    assert!(outer.resolve("inner.v").is_some());
    assert_eq!(
        outer.field("next").unwrap().kind,
        Kind::Pointer(Pointee::Record("outer".into()))
    );
}

#[test]
fn test_declaration_errors() {
    let err = Declarations::parse(
        r#"
[[struct]]
name = "s"
fields = [{ name = "x", type = "int128" }]
"#,
    )
    .unwrap_err();
    match err {
        DeclError::UnknownType { item, name } => {
            assert_eq!(item, "s.x");
            assert_eq!(name, "int128");
        }
        other => panic!("unexpected {:?}", other),
    }

    let err = Declarations::parse(
        r#"
[[struct]]
name = "s"
fields = [{ name = "x", type = "int", count = "NOPE + 1" }]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, DeclError::UnknownConstant { .. }));

    let err = Declarations::parse(
        r#"
[[struct]]
name = "s"
fields = [{ name = "me", type = "s" }]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, DeclError::Cycle(_)));

    let err = Declarations::parse(
        r#"
[[struct]]
name = "s"
fields = [{ name = "x", type = "int", count = 0 }]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, DeclError::Schema { .. }));

    let err = Declarations::parse("[functions]\nf = \"fn(int\"\n").unwrap_err();
    assert!(matches!(err, DeclError::Syntax { .. }));

    let err = Declarations::parse("[functions]\nf = \"int\"\n").unwrap_err();
    assert!(matches!(err, DeclError::Invalid { .. }));

    let err = Declarations::parse("[[struct]]\nname = 3\n").unwrap_err();
    assert!(matches!(err, DeclError::Toml(_)));
}

#[test]
fn test_load_resolves_library_relative_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.toml");
    fs::write(&path, DEMO).unwrap();

    let decls = Declarations::load(&path).unwrap();
    assert_eq!(decls.library().unwrap(), dir.path().join("./libdemo.so"));

    let err = Declarations::load(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, DeclError::Io { .. }));
}
