//! Avatar uploads.
pub mod services;
