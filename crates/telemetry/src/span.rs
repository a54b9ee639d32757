use opentelemetry::trace::{SpanBuilder, SpanContext, SpanKind, TraceContextExt, Tracer};
use opentelemetry::Context;
use propagation_context::B3ContextExt;

/// Start a SERVER span under `parent`.
///
/// With `join_remote`, a sampled B3 parent is joined instead of continued:
/// the server span reuses the client's span id and hangs off the client's
/// own parent, so client and server report one span (Zipkin shared spans).
/// A client without a parent leaves the joined span as the trace root.
pub fn start_server_span<T: Tracer>(
    tracer: &T,
    builder: SpanBuilder,
    parent: &Context,
    join_remote: bool,
) -> T::Span {
    let builder = builder.with_kind(SpanKind::Server);

    let parent_span = parent.span();
    let remote = parent_span.span_context();
    if !(join_remote && remote.is_sampled() && parent.has_b3_remote_parent()) {
        return builder.start_with_context(tracer, parent);
    }

    let builder = builder.with_span_id(remote.span_id());
    match parent.b3_parent_span_id() {
        Some(client_parent) => {
            let joined = Context::new().with_remote_span_context(SpanContext::new(
                remote.trace_id(),
                client_parent,
                remote.trace_flags(),
                true,
                remote.trace_state().clone(),
            ));
            builder.start_with_context(tracer, &joined)
        }
        None => builder
            .with_trace_id(remote.trace_id())
            .start_with_context(tracer, &Context::new()),
    }
}
