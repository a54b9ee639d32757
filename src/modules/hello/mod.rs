use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::HOST, uri::Authority},
    routing::get,
    Router,
};
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{Span as _, Tracer as _, TracerProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_http::HeaderExtractor;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use opentelemetry_semantic_conventions::attribute::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, SERVER_ADDRESS, SERVER_PORT, URL_PATH,
    URL_SCHEME,
};
use propagation_kernel::{settings::Settings, InitCtx, Module};
use propagation_telemetry::start_server_span;

/// Instrumentation scope of the server spans.
pub const TRACER_SCOPE: &str = "propagation.http.server";

const ANSWER: &str = "Hello World!";
const DEFAULT_HTTP_PORT: u16 = 80;

#[derive(Clone)]
struct HelloState {
    tracer: SdkTracer,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
    join_server_spans: bool,
    port: u16,
}

/// Answers `GET /` inside a SERVER span that continues the caller's trace.
pub struct HelloModule {
    state: HelloState,
}

impl HelloModule {
    pub fn new(
        provider: &SdkTracerProvider,
        propagator: Arc<dyn TextMapPropagator + Send + Sync>,
        settings: &Settings,
    ) -> Self {
        Self {
            state: HelloState {
                tracer: provider.tracer(TRACER_SCOPE),
                propagator,
                join_server_spans: settings.telemetry.join_server_spans,
                port: settings.server.port,
            },
        }
    }
}

#[async_trait]
impl Module for HelloModule {
    fn name(&self) -> &'static str {
        "hello"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            join_server_spans = self.state.join_server_spans,
            "hello module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Option<Router> {
        Some(
            Router::new()
                .route("/", get(hello))
                .with_state(self.state.clone()),
        )
    }

    fn base_path(&self) -> String {
        "/".to_string()
    }
}

async fn hello(State(state): State<HelloState>, request: Request) -> &'static str {
    let headers = request.headers();
    let parent = state
        .propagator
        .extract_with_context(&opentelemetry::Context::new(), &HeaderExtractor(headers));

    // Host header, falling back to where this server listens.
    let (address, port) = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Authority>().ok())
        .map(|authority| {
            (
                authority.host().to_string(),
                authority.port_u16().unwrap_or(DEFAULT_HTTP_PORT),
            )
        })
        .unwrap_or_else(|| ("localhost".to_string(), state.port));

    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let builder = state
        .tracer
        .span_builder(format!("{method} {path}"))
        .with_attributes([
            KeyValue::new("component", "http"),
            KeyValue::new(HTTP_REQUEST_METHOD, method),
            KeyValue::new(URL_SCHEME, "http"),
            KeyValue::new(SERVER_ADDRESS, address),
            KeyValue::new(SERVER_PORT, i64::from(port)),
            KeyValue::new(URL_PATH, path),
        ]);
    let mut span = start_server_span(&state.tracer, builder, &parent, state.join_server_spans);

    span.add_event("Start Processing", Vec::new());

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());
    tracing::info!(
        client = client.as_deref().unwrap_or("unknown"),
        trace_id = %span.span_context().trace_id(),
        span_id = %span.span_context().span_id(),
        "served request"
    );

    span.add_event("Finish Processing", vec![KeyValue::new("answer", ANSWER)]);
    span.set_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, 200_i64));
    span.end();

    ANSWER
}
