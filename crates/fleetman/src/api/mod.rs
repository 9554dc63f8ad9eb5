//! API route handlers

pub mod batch;
pub mod devices;
pub mod error;
pub mod scenarios;
pub mod system;

pub use error::AppError;
