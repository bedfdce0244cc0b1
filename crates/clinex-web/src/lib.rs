//! clinex-web: HTTP surface for clinical entity extraction.
//! Provides:
//!   - POST /extract and /extract_grouped for entity extraction
//!   - GET /health liveness probe
//!   - GET / demo page and /static assets

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
