//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → broadcast to every supervisor and worker loop
//!         → supervisors exit instead of restarting
//!         → connections finish their current teardown
//! ```
//!
//! Workers would otherwise run until process death; they additionally
//! honor this coordinator so that embedders and tests can stop the
//! gateway in-process.

pub mod shutdown;

pub use shutdown::Shutdown;
