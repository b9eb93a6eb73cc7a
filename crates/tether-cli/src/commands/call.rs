use crate::error::CliError;
use std::path::Path;
use std::sync::Arc;
use tether_decl::Declarations;
use tether_layout::{CallbackSite, FnSignature, Kind, LayoutDescriptor, Pointee, ScalarKind};
use tether_marshal::{Arg, CallbackHandler, ScalarValue, StructHandle};
use tether_native::{Bridge, NativeLibrary};

/// A command-line argument after parsing against its parameter kind.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CliArg {
    Value(ScalarValue),
    /// `@name`: a fresh zeroed record of that name.
    Record(String),
}

pub fn handle_call(file: &Path, function: &str, library: Option<&Path>, args: &[String]) -> Result<(), CliError> {
    let decls = Declarations::load(file)?;
    let signature = decls
        .function(function)
        .ok_or_else(|| CliError::UnknownFunction(function.to_string()))?
        .clone();
    let parsed = parse_args(&signature, args)?;

    let library_path = library.or(decls.library()).ok_or(CliError::MissingLibrary)?;
    let library = NativeLibrary::open(library_path)?;
    let target = library.resolve(function, signature)?;
    let bridge = Bridge::with_config(decls.native().clone())?;

    let mut handles = Vec::new();
    for arg in &parsed {
        if let CliArg::Record(name) = arg {
            let layout = decls
                .record(name)
                .ok_or_else(|| CliError::UnknownRecord(name.clone()))?;
            let mut handle = bridge.allocate(Arc::clone(layout))?;
            bind_tracing_callbacks(&mut handle)?;
            handles.push(handle);
        }
    }

    let result = {
        let mut records = handles.iter();
        let call_args: Vec<Arg<'_>> = parsed
            .iter()
            .map(|arg| match arg {
                CliArg::Value(value) => Arg::Value(*value),
                CliArg::Record(_) => Arg::Struct(records.next()),
            })
            .collect();
        bridge.invoke(&target, &call_args)?
    };

    match result {
        Some(value) => println!("{} returned {}", function, value),
        None => println!("{} returned", function),
    }
    for handle in &handles {
        print!("{}", dump_record(handle)?);
    }
    Ok(())
}

/// Parses one argument per declared parameter.
pub(crate) fn parse_args(signature: &FnSignature, args: &[String]) -> Result<Vec<CliArg>, CliError> {
    let params = signature.params();
    if params.len() != args.len() {
        return Err(CliError::BadArgument {
            index: args.len().min(params.len()),
            value: args.join(" "),
            expected: format!("argument list of length {}", params.len()),
        });
    }
    params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (kind, text))| {
            parse_arg(kind, text.trim()).ok_or_else(|| CliError::BadArgument {
                index,
                value: text.clone(),
                expected: kind.to_string(),
            })
        })
        .collect()
}

fn parse_arg(kind: &Kind, text: &str) -> Option<CliArg> {
    match kind {
        Kind::Pointer(pointee) => {
            if let Some(name) = text.strip_prefix('@') {
                return match pointee {
                    Pointee::Record(expected) if expected != name => None,
                    Pointee::Scalar(_) => None,
                    _ => Some(CliArg::Record(name.to_string())),
                };
            }
            parse_scalar(ScalarKind::Ptr, text).map(CliArg::Value)
        }
        Kind::Callback(_) => parse_scalar(ScalarKind::Ptr, text).map(CliArg::Value),
        Kind::Scalar(scalar) => parse_scalar(*scalar, text).map(CliArg::Value),
        Kind::Record(_) | Kind::Void => None,
    }
}

/// Parses `text` as a value of exactly `kind`, rejecting anything out of range.
pub(crate) fn parse_scalar(kind: ScalarKind, text: &str) -> Option<ScalarValue> {
    if kind.is_float() {
        return match kind {
            ScalarKind::F32 => text.parse().ok().map(ScalarValue::F32),
            _ => text.parse().ok().map(ScalarValue::F64),
        };
    }
    if kind == ScalarKind::Ptr && text == "null" {
        return Some(ScalarValue::null());
    }
    let value = parse_integer(text)?;
    let scalar = match kind {
        ScalarKind::I8 => ScalarValue::I8(value.try_into().ok()?),
        ScalarKind::U8 => ScalarValue::U8(value.try_into().ok()?),
        ScalarKind::I16 => ScalarValue::I16(value.try_into().ok()?),
        ScalarKind::U16 => ScalarValue::U16(value.try_into().ok()?),
        ScalarKind::I32 => ScalarValue::I32(value.try_into().ok()?),
        ScalarKind::U32 => ScalarValue::U32(value.try_into().ok()?),
        ScalarKind::I64 => ScalarValue::I64(value.try_into().ok()?),
        ScalarKind::U64 => ScalarValue::U64(value.try_into().ok()?),
        ScalarKind::ISize => ScalarValue::ISize(value.try_into().ok()?),
        ScalarKind::USize => ScalarValue::USize(value.try_into().ok()?),
        ScalarKind::Ptr => ScalarValue::Ptr(value.try_into().ok()?),
        ScalarKind::F32 | ScalarKind::F64 => return None,
    };
    Some(scalar)
}

/// Decimal, `0x` hex (either sign) or a single-character literal such as `'a'`.
fn parse_integer(text: &str) -> Option<i128> {
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        let mut chars = inner.chars();
        let c = chars.next()?;
        return chars.next().is_none().then_some(c as i128);
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Binds every callback slot outside a union to a handler that logs its arguments
/// and returns zero.
fn bind_tracing_callbacks(handle: &mut StructHandle) -> Result<(), CliError> {
    let sites = handle.layout().callback_sites();
    for site in sites {
        if site.in_union {
            log::debug!("Leaving union callback `{}` unbound", site.path);
            continue;
        }
        let handler = tracing_handler(handle.layout().name(), &site);
        match site.index {
            Some(i) => handle.bind_elem(&site.path, i, handler)?,
            None => handle.bind(&site.path, handler)?,
        }
    }
    Ok(())
}

fn tracing_handler(record: &str, site: &CallbackSite) -> CallbackHandler {
    let label = match site.index {
        Some(i) => format!("{}.{}[{}]", record, site.path, i),
        None => format!("{}.{}", record, site.path),
    };
    let ret = site.signature.ret().wire_kind();
    Arc::new(move |args: &[ScalarValue]| {
        let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
        log::info!("callback {}({})", label, rendered.join(", "));
        ret.map(ScalarValue::zero)
    })
}

/// Renders every scalar field of `handle`, nested records flattened into dotted paths.
pub(crate) fn dump_record(handle: &StructHandle) -> Result<String, CliError> {
    let mut lines = Vec::new();
    dump_fields(handle, handle.layout(), "", &mut lines)?;
    let mut out = format!("{} {{\n", handle.layout().name());
    for line in lines {
        out.push_str("  ");
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str("}\n");
    Ok(out)
}

fn dump_fields(
    handle: &StructHandle,
    layout: &LayoutDescriptor,
    prefix: &str,
    lines: &mut Vec<String>,
) -> Result<(), CliError> {
    for field in layout.fields() {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };
        match (&field.kind, field.count) {
            (Kind::Record(inner), None) => dump_fields(handle, inner, &path, lines)?,
            (Kind::Record(inner), Some(count)) => {
                for i in 0..count {
                    dump_fields(handle, inner, &format!("{}[{}]", path, i), lines)?;
                }
            }
            (_, None) => lines.push(format!("{} = {}", path, handle.read(&path)?)),
            (_, Some(count)) => {
                let values = (0..count)
                    .map(|i| handle.read_elem(&path, i).map(|v| v.to_string()))
                    .collect::<Result<Vec<_>, _>>()?;
                lines.push(format!("{} = [{}]", path, values.join(", ")));
            }
        }
    }
    Ok(())
}
