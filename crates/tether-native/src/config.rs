use serde::Deserialize;

/// Cranelift optimisation level for generated thunks and trampolines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    #[default]
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    pub(crate) fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Code generation settings for a [`crate::Bridge`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub opt_level: OptLevel,
    /// Run the Cranelift IR verifier on every generated function.
    pub verify: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            opt_level: OptLevel::None,
            verify: cfg!(debug_assertions),
        }
    }
}
