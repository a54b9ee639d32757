//! Trace-context propagation on top of the OpenTelemetry API: the Zipkin B3
//! propagator and assembly of the configured propagator chain.

pub mod b3;
pub mod error;
pub mod propagator;

pub use b3::{B3ContextExt, B3Propagator};
pub use error::PropagationError;
pub use propagator::from_names;
