use crate::error::CliError;
use std::path::Path;
use tether_decl::Declarations;
use tether_layout::{LayoutDescriptor, RecordKind};

pub fn handle_layout(file: &Path, record: Option<&str>) -> Result<(), CliError> {
    let decls = Declarations::load(file)?;
    match record {
        Some(name) => {
            let layout = decls
                .record(name)
                .ok_or_else(|| CliError::UnknownRecord(name.to_string()))?;
            print!("{}", render_layout(layout));
        }
        None => {
            for layout in decls.records() {
                println!("{}", render_layout(layout));
            }
        }
    }
    Ok(())
}

/// One header line for the record, then one row per field.
pub(crate) fn render_layout(layout: &LayoutDescriptor) -> String {
    let keyword = match layout.kind() {
        RecordKind::Struct => "struct",
        RecordKind::Union => "union",
    };
    let mut lines = vec![
        format!(
            "{} {} (size {}, align {})",
            keyword,
            layout.name(),
            layout.size_bytes(),
            layout.align_bytes()
        ),
        format!("  {:>6}  {:>5}  {:>5}  field", "offset", "size", "count"),
    ];
    lines.extend(layout.fields().iter().map(|field| {
        let count = field.count.map_or_else(|| "-".to_string(), |n| n.to_string());
        format!(
            "  {:>6}  {:>5}  {:>5}  {}: {}",
            field.offset, field.size_bytes, count, field.name, field.kind
        )
    }));
    let callbacks = layout.callback_sites();
    if !callbacks.is_empty() {
        lines.push("  callbacks:".to_string());
        lines.extend(callbacks.iter().map(|site| {
            let path = match site.index {
                Some(i) => format!("{}[{}]", site.path, i),
                None => site.path.clone(),
            };
            let note = if site.in_union { " (in union)" } else { "" };
            format!("  {:>6}  {}{}", site.offset, path, note)
        }));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_layout_lists_fields_and_callbacks() {
        let decls = Declarations::parse(
            r#"
[[struct]]
name = "holder"
fields = [
  { name = "tag", type = "u8" },
  { name = "value", type = "double" },
  { name = "hooks", type = "fn(int) -> int", count = 2 },
]
"#,
        )
        .unwrap();
        let rendered = render_layout(decls.record("holder").unwrap());
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[0], "struct holder (size 32, align 8)");
        assert!(lines[2].ends_with("tag: u8"));
        assert!(lines[3].trim_start().starts_with("8"));
        assert!(lines[4].contains("    2  hooks"));
        assert_eq!(lines[5], "  callbacks:");
        assert!(lines[6].ends_with("hooks[0]"));
        assert!(lines[7].ends_with("hooks[1]"));
    }

    #[test]
    fn test_demo_declarations_load() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/democ.toml");
        let decls = Declarations::load(&path).unwrap();
        let point = decls.record("my_point").unwrap();
        assert_eq!(point.field("a").unwrap().count, Some(15));
        assert_eq!(point.callback_sites().len(), 1);
        assert_eq!(decls.record("Unia").unwrap().size_bytes(), 8);
        assert_eq!(decls.constant("xx"), Some(102));
        assert_eq!(decls.enumeration("some_values").unwrap().len(), 4);
        assert!(render_layout(point).contains("proc1"));
    }
}
