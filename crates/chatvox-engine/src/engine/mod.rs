//! Synthesis engines: circuit breakers and the fallback registry.

mod circuit;
mod registry;

pub use circuit::{CircuitBreaker, CircuitState, Permit};
pub use registry::{AudioResult, EngineRegistry, EngineStatus};
