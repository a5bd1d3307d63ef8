//! Gateway log correlation: attribute anonymous API/browser errors to agents.
//!
//! The shared gateway log carries lane scheduling events and run lifecycle
//! events without cross-source correlation identifiers. This crate tracks
//! per-agent activity windows from lane activation/deactivation, attributes
//! anonymous run errors to the most plausible agent, classifies repeated
//! failures, and caches the result for a short TTL to bound I/O under
//! frequent polling.

pub mod correlator;

pub use correlator::{
    GatewayErrorKind, GatewayErrorRecord, GatewayLogCorrelator, GATEWAY_CACHE_TTL_MS,
};
