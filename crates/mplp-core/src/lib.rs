//! # MPLP Core
//!
//! Shared primitives for the MPLP orchestrator.
//!
//! ## Components
//!
//! - [`EventBus`] - Synchronous, per-instance publish/subscribe bus
//! - [`BaseRegistry`] - Id-keyed registry safe for concurrent register/lookup

pub mod error;
pub mod event_bus;
pub mod registry;

pub use error::RegistryError;
pub use event_bus::{BusEvent, EventBus, EventStats, ListenerId};
pub use registry::{BaseRegistry, Registerable};
