//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: Resolution, dependency installation, lifecycle and the extension manager
//! - Errors: The extension manager's error taxonomy

pub mod errors;
pub mod services;
