//! Compatibility layer for projects created with older compiler versions.
//!
//! Applied to raw block data before IR construction when compatibility mode
//! is active; the optimizer never sees it. Older exports used a handful of
//! abbreviated opcode spellings that are rewritten to their current names
//! here.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static LEGACY_OPCODE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("OP_SUB", "OP_SUBTRACT"),
        ("OP_MUL", "OP_MULTIPLY"),
        ("OP_DIV", "OP_DIVIDE"),
        ("CAST_NUM", "CAST_NUMBER"),
        ("CAST_NUM_OR_NAN", "CAST_NUMBER_OR_NAN"),
    ]
    .into_iter()
    .collect()
});

/// Explicit compatibility-mode switch. Carried as a value, not a process
/// flag, so pipelines with different settings can coexist.
#[derive(Debug, Clone, Default)]
pub struct OldCompilerCompatibility {
    compatibility_mode: bool,
}

impl OldCompilerCompatibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_compatibility_mode(&mut self) {
        self.compatibility_mode = true;
    }

    pub fn disable_compatibility_mode(&mut self) {
        self.compatibility_mode = false;
    }

    pub fn is_compatibility_mode_enabled(&self) -> bool {
        self.compatibility_mode
    }

    /// Rewrite old-format block data to the current format. The identity
    /// when compatibility mode is off.
    pub fn transform_block_data(&self, mut data: serde_json::Value) -> serde_json::Value {
        if !self.compatibility_mode {
            return data;
        }
        rewrite_opcodes(&mut data);
        data
    }
}

fn rewrite_opcodes(data: &mut serde_json::Value) {
    match data {
        serde_json::Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if key == "opcode" {
                    if let Some(opcode) = value.as_str() {
                        if let Some(&current) = LEGACY_OPCODE_ALIASES.get(opcode) {
                            *value = serde_json::Value::String(current.to_string());
                            continue;
                        }
                    }
                }
                rewrite_opcodes(value);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                rewrite_opcodes(item);
            }
        }
        _ => {}
    }
}
