use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry_sdk::propagation::TraceContextPropagator;

use crate::b3::B3Propagator;
use crate::error::PropagationError;

/// Build the propagator chain from configuration names: `tracecontext`,
/// `b3` (single header injection) and `b3multi` (multi header injection).
///
/// Injection writes every format. On extraction the earlier name takes
/// precedence when a carrier holds several formats: the composite lets later
/// members overwrite what earlier ones extracted, so members are added in
/// reverse.
pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<TextMapCompositePropagator, PropagationError> {
    if names.is_empty() {
        return Err(PropagationError::Empty);
    }

    let mut propagators = names
        .iter()
        .map(|name| by_name(name.as_ref().trim()))
        .collect::<Result<Vec<_>, _>>()?;
    propagators.reverse();

    tracing::debug!(
        propagators = ?names.iter().map(|name| name.as_ref()).collect::<Vec<&str>>(),
        "assembled propagator chain"
    );
    Ok(TextMapCompositePropagator::new(propagators))
}

fn by_name(name: &str) -> Result<Box<dyn TextMapPropagator + Send + Sync>, PropagationError> {
    match name {
        "tracecontext" => Ok(Box::new(TraceContextPropagator::new())),
        "b3" => Ok(Box::new(B3Propagator::injecting_single_header())),
        "b3multi" => Ok(Box::new(B3Propagator::injecting_multi_headers())),
        other => Err(PropagationError::UnknownPropagator(other.to_string())),
    }
}
