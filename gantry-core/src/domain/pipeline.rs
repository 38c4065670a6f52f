//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pipeline definition
///
/// A named automation path: where the code lives, where it runs, and the
/// ordered steps to execute. Owned by the management layer; the engine treats
/// it as a read-only snapshot for the duration of one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Immutable slug identifier (e.g. "my-app")
    pub id: String,
    pub name: String,
    /// Repository coordinate as "owner/name"
    pub repo: String,
    pub branch: String,
    /// Working directory for local execution; a leading `~` is expanded
    pub workdir: String,
    /// Shared secret for webhook signature verification
    pub webhook_secret: Option<String>,
    pub target: ExecTarget,
    /// Ordered steps, fixed at trigger time
    pub steps: Vec<Step>,
}

/// Where a pipeline's composed script runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecTarget {
    Local,
    Remote { host: String, user: String },
}

/// One pipeline entry: a module reference plus concrete parameter values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub module_id: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}
