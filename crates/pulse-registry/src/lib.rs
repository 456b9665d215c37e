//! Session registry.
//!
//! Single owner of session and participant state: a constrained state
//! machine, market-driven pause/resume, recovery from the durable store,
//! and deep-snapshot getters — no caller ever holds a live reference
//! into registry state.

pub mod error;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::{RegistryConfig, SessionRegistry};
