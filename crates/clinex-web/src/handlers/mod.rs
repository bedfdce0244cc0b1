//! HTTP handlers for all routes.

pub mod extract;
pub mod index;
pub mod system;
