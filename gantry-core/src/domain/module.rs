//! Module domain types

use serde::{Deserialize, Serialize};

/// Reusable parameterized shell-script template
///
/// The body contains `{{NAME}}` placeholders for each declared parameter.
/// Modules are owned and edited externally; the engine only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub name: String,
    /// Shell-script body with `{{NAME}}` placeholders
    pub body: String,
    /// Declared parameter names, keys unique
    pub params: Vec<String>,
}
