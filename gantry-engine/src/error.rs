//! Engine error taxonomy
//!
//! Errors raised before a process is spawned (validation, missing modules,
//! busy pipelines) abort the deployment without starting anything; later
//! failures are captured in the deployment log instead of propagating.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A substituted value failed its kind's allow-list pattern
    #[error("validation failed for {field}: '{value}' is not allowed")]
    Validation { field: &'static str, value: String },

    /// A substituted value contains shell metacharacters
    #[error("potential injection detected in parameter '{param}'")]
    InjectionSuspected { param: String },

    /// A step references a module that does not exist
    #[error("module '{module}' not found for step {step}")]
    TemplateNotFound { step: usize, module: String },

    /// The pipeline already has a deployment in flight
    #[error("pipeline '{pipeline}' already has a deployment in progress")]
    Busy { pipeline: String },

    /// The OS failed to start the child process
    #[error("failed to start pipeline process: {0}")]
    Spawn(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
