use thiserror::Error;

/// Errors raised while assembling propagators from configuration.
#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("unknown propagator '{0}'; expected tracecontext, b3, or b3multi")]
    UnknownPropagator(String),

    #[error("at least one propagator must be configured")]
    Empty,
}
