//! Gantry Core
//!
//! Core types shared by the Gantry execution engine and server.
//!
//! This crate contains:
//! - Domain types: Core business entities (Pipeline, Module, Deployment, etc.)
//! - DTOs: Data transfer objects for the HTTP boundary

pub mod domain;
pub mod dto;
