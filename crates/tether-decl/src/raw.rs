use serde::Deserialize;
use std::collections::BTreeMap;
use tether_native::BridgeConfig;

/// A declaration file as written on disk, before any name is resolved.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawFile {
    /// Library the declared functions live in
    #[serde(default)]
    pub library: Option<String>,

    /// Code generation settings for the bridge
    #[serde(default)]
    pub native: Option<BridgeConfig>,

    #[serde(default)]
    pub constants: BTreeMap<String, RawCount>,

    #[serde(default, rename = "struct")]
    pub structs: Vec<RawRecord>,

    #[serde(default, rename = "union")]
    pub unions: Vec<RawRecord>,

    #[serde(default, rename = "enum")]
    pub enums: Vec<RawEnum>,

    /// Named function-pointer types
    #[serde(default)]
    pub callbacks: BTreeMap<String, String>,

    /// Function name to signature
    #[serde(default)]
    pub functions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawRecord {
    pub name: String,
    pub fields: Vec<RawField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub count: Option<RawCount>,
}

/// An integer, or an expression over constants such as `"BAR + 1"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawCount {
    Literal(i64),
    Expr(String),
}

/// A C enum: its type name is an `int` and its members are constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawEnum {
    pub name: String,
    pub values: Vec<RawEnumValue>,
}

/// `"a_value"` continues the numbering; `{ name = "xx", value = "a_value + 100" }` sets it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawEnumValue {
    Next(String),
    Explicit { name: String, value: RawCount },
}

impl RawEnumValue {
    pub fn name(&self) -> &str {
        match self {
            RawEnumValue::Next(name) => name,
            RawEnumValue::Explicit { name, .. } => name,
        }
    }
}
