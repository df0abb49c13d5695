//! Observability subsystem.
//!
//! # Responsibilities
//! - Initialize structured logging (tracing)
//! - Register gateway metrics and the optional Prometheus endpoint
//!
//! Operators observe liveness through the periodic log summaries and the
//! published status snapshot; there is no health endpoint here.

pub mod logging;
pub mod metrics;
