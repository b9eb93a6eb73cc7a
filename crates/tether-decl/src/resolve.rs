use crate::raw::{RawCount, RawEnum, RawEnumValue, RawFile, RawRecord};
use crate::syntax::{parse_expr, parse_type, Expr, TypeExpr};
use crate::DeclError;
use rustc_hash::{FxHashMap, FxHashSet};
use std::ffi::{c_char, c_long, c_ulong};
use std::mem;
use std::sync::Arc;
use tether_layout::{describe, Field, FnSignature, Kind, LayoutDescriptor, Pointee, RecordKind, ScalarKind, Schema};

/// Scalar names understood in type strings: Rust spellings plus common C ones.
pub(crate) fn scalar_named(name: &str) -> Option<ScalarKind> {
    let kind = match name {
        "char" => plain_char(),
        "i8" | "signed char" | "int8_t" => ScalarKind::I8,
        "u8" | "unsigned char" | "uint8_t" => ScalarKind::U8,
        "i16" | "short" | "signed short" | "int16_t" => ScalarKind::I16,
        "u16" | "unsigned short" | "uint16_t" => ScalarKind::U16,
        "i32" | "int" | "signed" | "signed int" | "int32_t" => ScalarKind::I32,
        "u32" | "unsigned" | "unsigned int" | "uint32_t" => ScalarKind::U32,
        "i64" | "long long" | "signed long long" | "int64_t" => ScalarKind::I64,
        "u64" | "unsigned long long" | "uint64_t" => ScalarKind::U64,
        "long" | "signed long" => sized_signed(mem::size_of::<c_long>()),
        "unsigned long" => sized_unsigned(mem::size_of::<c_ulong>()),
        "isize" | "ssize_t" | "ptrdiff_t" | "intptr_t" => ScalarKind::ISize,
        "usize" | "size_t" | "uintptr_t" => ScalarKind::USize,
        "f32" | "float" => ScalarKind::F32,
        "f64" | "double" => ScalarKind::F64,
        "ptr" => ScalarKind::Ptr,
        _ => return None,
    };
    Some(kind)
}

/// Plain `char` has the host's signedness (unsigned on ARM Linux, for one).
fn plain_char() -> ScalarKind {
    if c_char::MIN == 0 {
        ScalarKind::U8
    } else {
        ScalarKind::I8
    }
}

fn sized_signed(bytes: usize) -> ScalarKind {
    if bytes == 8 {
        ScalarKind::I64
    } else {
        ScalarKind::I32
    }
}

fn sized_unsigned(bytes: usize) -> ScalarKind {
    if bytes == 8 {
        ScalarKind::U64
    } else {
        ScalarKind::U32
    }
}

/// `struct foo`, `union foo` and `enum foo` name the declaration `foo`.
fn strip_tag(name: &str) -> &str {
    name.strip_prefix("struct ")
        .or_else(|| name.strip_prefix("union "))
        .or_else(|| name.strip_prefix("enum "))
        .unwrap_or(name)
}

/// Resolves names in a [`RawFile`] on demand, so declarations may appear in any order.
pub(crate) struct Resolver<'a> {
    raw: &'a RawFile,
    records_by_name: FxHashMap<&'a str, (&'a RawRecord, RecordKind)>,
    enums_by_name: FxHashSet<&'a str>,
    /// Enum member name to its enum and position.
    members_by_name: FxHashMap<&'a str, (&'a RawEnum, usize)>,
    constants: FxHashMap<String, i64>,
    records: FxHashMap<String, Arc<LayoutDescriptor>>,
    callbacks: FxHashMap<String, Arc<FnSignature>>,
    in_progress: FxHashSet<String>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(raw: &'a RawFile) -> Result<Self, DeclError> {
        let mut records_by_name = FxHashMap::default();
        let tagged = raw
            .structs
            .iter()
            .map(|r| (r, RecordKind::Struct))
            .chain(raw.unions.iter().map(|r| (r, RecordKind::Union)));
        for (record, kind) in tagged {
            if records_by_name.insert(record.name.as_str(), (record, kind)).is_some() {
                return Err(DeclError::Duplicate(record.name.clone()));
            }
            if raw.callbacks.contains_key(&record.name) {
                return Err(DeclError::Duplicate(record.name.clone()));
            }
        }

        let mut enums_by_name = FxHashSet::default();
        let mut members_by_name = FxHashMap::default();
        for raw_enum in &raw.enums {
            let name = raw_enum.name.as_str();
            if !enums_by_name.insert(name)
                || records_by_name.contains_key(name)
                || raw.callbacks.contains_key(name)
            {
                return Err(DeclError::Duplicate(raw_enum.name.clone()));
            }
            for (position, member) in raw_enum.values.iter().enumerate() {
                let member_name = member.name();
                if members_by_name.insert(member_name, (raw_enum, position)).is_some()
                    || raw.constants.contains_key(member_name)
                {
                    return Err(DeclError::Duplicate(member_name.to_string()));
                }
            }
        }

        Ok(Resolver {
            raw,
            records_by_name,
            enums_by_name,
            members_by_name,
            constants: FxHashMap::default(),
            records: FxHashMap::default(),
            callbacks: FxHashMap::default(),
            in_progress: FxHashSet::default(),
        })
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        FxHashMap<String, i64>,
        FxHashMap<String, Arc<LayoutDescriptor>>,
        FxHashMap<String, Arc<FnSignature>>,
    ) {
        (self.constants, self.records, self.callbacks)
    }

    /// Guards against a name depending on itself.
    fn enter(&mut self, key: String) -> Result<(), DeclError> {
        if !self.in_progress.insert(key.clone()) {
            return Err(DeclError::Cycle(key));
        }
        Ok(())
    }

    fn leave(&mut self, key: &str) {
        self.in_progress.remove(key);
    }

    pub(crate) fn constant(&mut self, name: &str) -> Result<Option<i64>, DeclError> {
        if let Some(value) = self.constants.get(name) {
            return Ok(Some(*value));
        }
        let file = self.raw;
        let Some(raw) = file.constants.get(name) else {
            let member = self.members_by_name.get(name).copied();
            return match member {
                Some((raw_enum, position)) => self.enum_member(raw_enum, position).map(Some),
                None => Ok(None),
            };
        };
        let value = match raw {
            RawCount::Literal(value) => *value,
            RawCount::Expr(src) => {
                let key = format!("constant {}", name);
                self.enter(key.clone())?;
                let value = self.eval_str(&key, src);
                self.leave(&key);
                value?
            }
        };
        self.constants.insert(name.to_string(), value);
        Ok(Some(value))
    }

    /// Members without an explicit value follow the previous one, starting at zero.
    fn enum_member(&mut self, raw_enum: &RawEnum, position: usize) -> Result<i64, DeclError> {
        let member = &raw_enum.values[position];
        let key = format!("constant {}", member.name());
        self.enter(key.clone())?;
        let value = match member {
            RawEnumValue::Explicit { value: RawCount::Literal(value), .. } => Ok(*value),
            RawEnumValue::Explicit { value: RawCount::Expr(src), .. } => self.eval_str(&key, src),
            RawEnumValue::Next(_) if position == 0 => Ok(0),
            RawEnumValue::Next(name) => {
                let previous = raw_enum.values[position - 1].name();
                match self.constant(previous) {
                    Ok(Some(value)) => value.checked_add(1).ok_or_else(|| DeclError::Invalid {
                        item: format!("{}.{}", raw_enum.name, name),
                        message: format!("overflow after `{}`", previous),
                    }),
                    Ok(None) => Err(DeclError::UnknownConstant {
                        item: format!("{}.{}", raw_enum.name, name),
                        name: previous.to_string(),
                    }),
                    Err(e) => Err(e),
                }
            }
        };
        self.leave(&key);
        let value = value?;
        self.constants.insert(member.name().to_string(), value);
        Ok(value)
    }

    fn eval_str(&mut self, item: &str, src: &str) -> Result<i64, DeclError> {
        let expr = parse_expr(src).map_err(|message| DeclError::Syntax {
            item: item.to_string(),
            message,
        })?;
        self.eval(item, &expr)
    }

    fn eval(&mut self, item: &str, expr: &Expr) -> Result<i64, DeclError> {
        let overflow = || DeclError::Invalid {
            item: item.to_string(),
            message: "arithmetic overflow".to_string(),
        };
        match expr {
            Expr::Int(value) => Ok(*value),
            Expr::Const(name) => self.constant(name)?.ok_or_else(|| DeclError::UnknownConstant {
                item: item.to_string(),
                name: name.clone(),
            }),
            Expr::Add(lhs, rhs) => {
                let (lhs, rhs) = (self.eval(item, lhs)?, self.eval(item, rhs)?);
                lhs.checked_add(rhs).ok_or_else(overflow)
            }
            Expr::Sub(lhs, rhs) => {
                let (lhs, rhs) = (self.eval(item, lhs)?, self.eval(item, rhs)?);
                lhs.checked_sub(rhs).ok_or_else(overflow)
            }
            Expr::Shl(lhs, rhs) => {
                let (lhs, rhs) = (self.eval(item, lhs)?, self.eval(item, rhs)?);
                u32::try_from(rhs)
                    .ok()
                    .and_then(|shift| lhs.checked_shl(shift))
                    .ok_or_else(overflow)
            }
        }
    }

    fn count(&mut self, item: &str, count: &RawCount) -> Result<usize, DeclError> {
        let value = match count {
            RawCount::Literal(value) => *value,
            RawCount::Expr(src) => self.eval_str(item, src)?,
        };
        usize::try_from(value).map_err(|_| DeclError::Invalid {
            item: item.to_string(),
            message: format!("array length {} is negative", value),
        })
    }

    pub(crate) fn record(&mut self, name: &str) -> Result<Option<Arc<LayoutDescriptor>>, DeclError> {
        if let Some(layout) = self.records.get(name) {
            return Ok(Some(Arc::clone(layout)));
        }
        let Some(&(raw, kind)) = self.records_by_name.get(name) else {
            return Ok(None);
        };

        let key = format!("record {}", name);
        self.enter(key.clone())?;
        let layout = self.build_record(raw, kind);
        self.leave(&key);
        let layout = Arc::new(layout?);

        log::debug!(
            "Declared `{}`: {} bytes, align {}",
            name,
            layout.size_bytes(),
            layout.align_bytes()
        );
        self.records.insert(name.to_string(), Arc::clone(&layout));
        Ok(Some(layout))
    }

    fn build_record(&mut self, raw: &RawRecord, kind: RecordKind) -> Result<LayoutDescriptor, DeclError> {
        let mut schema = Schema::new(raw.name.clone(), kind);
        for field in &raw.fields {
            let item = format!("{}.{}", raw.name, field.name);
            let ty = self.kind_str(&item, &field.ty)?;
            let count = match &field.count {
                Some(count) => Some(self.count(&item, count)?),
                None => None,
            };
            schema.push(Field {
                name: field.name.clone(),
                kind: ty,
                count,
            });
        }
        describe(&schema).map_err(|source| DeclError::Schema {
            item: raw.name.clone(),
            source,
        })
    }

    pub(crate) fn callback(&mut self, name: &str) -> Result<Option<Arc<FnSignature>>, DeclError> {
        if let Some(signature) = self.callbacks.get(name) {
            return Ok(Some(Arc::clone(signature)));
        }
        let file = self.raw;
        let Some(src) = file.callbacks.get(name) else {
            return Ok(None);
        };

        let key = format!("callback {}", name);
        self.enter(key.clone())?;
        let signature = self.signature_str(&key, src);
        self.leave(&key);
        let signature = Arc::new(signature?);
        self.callbacks.insert(name.to_string(), Arc::clone(&signature));
        Ok(Some(signature))
    }

    /// Parses a `fn(...) -> ...` string into a signature.
    pub(crate) fn signature_str(&mut self, item: &str, src: &str) -> Result<FnSignature, DeclError> {
        match self.kind_str(item, src)? {
            Kind::Callback(signature) => Ok(Arc::unwrap_or_clone(signature)),
            other => Err(DeclError::Invalid {
                item: item.to_string(),
                message: format!("expected a function type, found `{}`", other),
            }),
        }
    }

    fn kind_str(&mut self, item: &str, src: &str) -> Result<Kind, DeclError> {
        let ty = parse_type(src).map_err(|message| DeclError::Syntax {
            item: item.to_string(),
            message,
        })?;
        self.kind(item, &ty)
    }

    fn kind(&mut self, item: &str, ty: &TypeExpr) -> Result<Kind, DeclError> {
        match ty {
            TypeExpr::Named(name) => {
                let name = strip_tag(name);
                if name == "void" {
                    return Ok(Kind::Void);
                }
                if let Some(kind) = scalar_named(name) {
                    return Ok(Kind::Scalar(kind));
                }
                if self.enums_by_name.contains(name) {
                    return Ok(Kind::Scalar(ScalarKind::I32));
                }
                if let Some(signature) = self.callback(name)? {
                    return Ok(Kind::Callback(signature));
                }
                if let Some(layout) = self.record(name)? {
                    return Ok(Kind::Record(layout));
                }
                Err(DeclError::UnknownType {
                    item: item.to_string(),
                    name: name.to_string(),
                })
            }
            TypeExpr::Pointer(inner) => Ok(Kind::Pointer(self.pointee(item, inner)?)),
            TypeExpr::Fn { params, ret } => {
                let params = params
                    .iter()
                    .map(|param| self.kind(item, param))
                    .collect::<Result<Vec<_>, _>>()?;
                let ret = self.kind(item, ret)?;
                let signature = FnSignature::new(params, ret).map_err(|source| DeclError::Schema {
                    item: item.to_string(),
                    source,
                })?;
                Ok(Kind::callback(signature))
            }
        }
    }

    /// Pointees never need a layout, so records may point at themselves.
    fn pointee(&mut self, item: &str, ty: &TypeExpr) -> Result<Pointee, DeclError> {
        match ty {
            TypeExpr::Named(name) => {
                let name = strip_tag(name);
                if name == "void" {
                    Ok(Pointee::Opaque)
                } else if let Some(kind) = scalar_named(name) {
                    Ok(Pointee::Scalar(kind))
                } else if self.enums_by_name.contains(name) {
                    Ok(Pointee::Scalar(ScalarKind::I32))
                } else if self.records_by_name.contains_key(name) {
                    Ok(Pointee::Record(name.to_string()))
                } else if self.raw.callbacks.contains_key(name) {
                    Ok(Pointee::Opaque)
                } else {
                    Err(DeclError::UnknownType {
                        item: item.to_string(),
                        name: name.to_string(),
                    })
                }
            }
            // Pointers to pointers or to code are opaque to the boundary.
            TypeExpr::Pointer(_) | TypeExpr::Fn { .. } => Ok(Pointee::Opaque),
        }
    }
}
