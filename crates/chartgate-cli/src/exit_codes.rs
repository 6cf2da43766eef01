//! Exit codes for CLI operations
//!
//! Helm only distinguishes success from failure for plugins, so every
//! failure maps to the general error code.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - any failure
pub const ERROR: i32 = 1;
