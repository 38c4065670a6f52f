//! Service layer
//!
//! Business logic between the HTTP handlers and the repositories/engine.

pub mod signature;
pub mod trigger;
