//! Domain layer - Core types with no I/O
//!
//! This layer contains:
//! - Entities: Plugin references, registry entries, code units
//! - Traits: Abstractions for the host and infrastructure (Host, HttpClient, CodeLoader, ...)

pub mod entities;
pub mod traits;
