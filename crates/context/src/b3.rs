//! Zipkin B3 propagation, see <https://github.com/openzipkin/b3-propagation>.
//!
//! Extraction understands both the single `b3` header and the multi header
//! format, trying the single header first. Injection writes one of the two
//! formats depending on how the propagator was constructed.
//!
//! Besides the remote span context, extraction records the B3 debug flag and
//! the client's parent span id on the [`Context`]. Both are read back through
//! [`B3ContextExt`] and are only reported while the B3 span context is the
//! active one.

use opentelemetry::propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use opentelemetry::Context;

pub const TRACE_ID_HEADER: &str = "x-b3-traceid";
pub const SPAN_ID_HEADER: &str = "x-b3-spanid";
pub const PARENT_SPAN_ID_HEADER: &str = "x-b3-parentspanid";
pub const SAMPLED_HEADER: &str = "x-b3-sampled";
pub const DEBUG_HEADER: &str = "x-b3-flags";
pub const SINGLE_HEADER: &str = "b3";

const MULTI_HEADER_DEBUG: &str = "1";
const SINGLE_HEADER_DEBUG: &str = "d";

const MULTI_HEADER_FIELDS: [&str; 4] = [
    TRACE_ID_HEADER,
    SPAN_ID_HEADER,
    SAMPLED_HEADER,
    DEBUG_HEADER,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    SingleHeader,
    MultipleHeaders,
}

/// What B3 carried beyond the span context itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct B3Headers {
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    debug: bool,
}

/// B3 propagator.
#[derive(Clone, Debug)]
pub struct B3Propagator {
    inject_encoding: Encoding,
    fields: Vec<String>,
}

impl B3Propagator {
    /// Propagator that injects `x-b3-*` headers.
    pub fn injecting_multi_headers() -> Self {
        Self {
            inject_encoding: Encoding::MultipleHeaders,
            fields: MULTI_HEADER_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Propagator that injects the single `b3` header.
    pub fn injecting_single_header() -> Self {
        Self {
            inject_encoding: Encoding::SingleHeader,
            fields: vec![SINGLE_HEADER.to_string()],
        }
    }

    fn extract_single_header(cx: &Context, extractor: &dyn Extractor) -> Option<Context> {
        let value = extractor.get(SINGLE_HEADER)?.trim();
        let parts: Vec<&str> = value.split('-').collect();

        // A lone sampling decision ("b3: 0") carries no trace to continue.
        if !(2..=4).contains(&parts.len()) {
            return None;
        }

        let trace_id = trace_id_from_hex(parts[0])?;
        let span_id = span_id_from_hex(parts[1])?;
        let sampling = parts.get(2).copied();
        let debug = sampling == Some(SINGLE_HEADER_DEBUG);
        let sampled = debug || sampling.is_some_and(is_sampled_value);
        let parent = match parts.get(3) {
            Some(hex) => Some(span_id_from_hex(hex)?),
            None => None,
        };

        Some(with_b3_parent(cx, trace_id, span_id, sampled, debug, parent))
    }

    fn extract_multi_headers(cx: &Context, extractor: &dyn Extractor) -> Option<Context> {
        let trace_id = trace_id_from_hex(extractor.get(TRACE_ID_HEADER)?.trim())?;
        let span_id = span_id_from_hex(extractor.get(SPAN_ID_HEADER)?.trim())?;

        let debug = extractor
            .get(DEBUG_HEADER)
            .is_some_and(|flags| flags.trim() == MULTI_HEADER_DEBUG);
        let sampled = debug
            || extractor
                .get(SAMPLED_HEADER)
                .is_some_and(|sampled| is_sampled_value(sampled.trim()));
        let parent = extractor
            .get(PARENT_SPAN_ID_HEADER)
            .and_then(|hex| span_id_from_hex(hex.trim()));

        Some(with_b3_parent(cx, trace_id, span_id, sampled, debug, parent))
    }
}

impl Default for B3Propagator {
    fn default() -> Self {
        Self::injecting_multi_headers()
    }
}

impl TextMapPropagator for B3Propagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return;
        }
        let debug = cx.b3_debug();

        match self.inject_encoding {
            Encoding::SingleHeader => {
                let sampling = if debug {
                    SINGLE_HEADER_DEBUG
                } else if span_context.is_sampled() {
                    "1"
                } else {
                    "0"
                };
                injector.set(
                    SINGLE_HEADER,
                    format!(
                        "{}-{}-{}",
                        span_context.trace_id(),
                        span_context.span_id(),
                        sampling
                    ),
                );
            }
            Encoding::MultipleHeaders => {
                injector.set(TRACE_ID_HEADER, span_context.trace_id().to_string());
                injector.set(SPAN_ID_HEADER, span_context.span_id().to_string());
                if debug {
                    // Debug implies sampled; the sampled header must not be sent alongside.
                    injector.set(DEBUG_HEADER, MULTI_HEADER_DEBUG.to_string());
                } else {
                    let sampled = if span_context.is_sampled() { "1" } else { "0" };
                    injector.set(SAMPLED_HEADER, sampled.to_string());
                }
            }
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        Self::extract_single_header(cx, extractor)
            .or_else(|| Self::extract_multi_headers(cx, extractor))
            .unwrap_or_else(|| cx.clone())
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(self.fields.as_slice())
    }
}

/// B3 details of an extracted [`Context`].
pub trait B3ContextExt {
    /// The remote parent was extracted from B3 headers and is still the
    /// active span context.
    fn has_b3_remote_parent(&self) -> bool;

    /// The caller asked for debug tracing (`x-b3-flags: 1` or `b3: ...-d`).
    fn b3_debug(&self) -> bool;

    /// The client span's own parent, as sent in `x-b3-parentspanid`.
    fn b3_parent_span_id(&self) -> Option<SpanId>;
}

impl B3ContextExt for Context {
    fn has_b3_remote_parent(&self) -> bool {
        active_b3_headers(self).is_some()
    }

    fn b3_debug(&self) -> bool {
        active_b3_headers(self).is_some_and(|headers| headers.debug)
    }

    fn b3_parent_span_id(&self) -> Option<SpanId> {
        active_b3_headers(self).and_then(|headers| headers.parent_span_id)
    }
}

fn active_b3_headers(cx: &Context) -> Option<B3Headers> {
    let headers = cx.get::<B3Headers>().copied()?;
    let span = cx.span();
    let span_context = span.span_context();
    (span_context.is_remote() && span_context.span_id() == headers.span_id).then_some(headers)
}

fn with_b3_parent(
    cx: &Context,
    trace_id: TraceId,
    span_id: SpanId,
    sampled: bool,
    debug: bool,
    parent_span_id: Option<SpanId>,
) -> Context {
    let flags = if sampled {
        TraceFlags::SAMPLED
    } else {
        TraceFlags::default()
    };
    let span_context = SpanContext::new(trace_id, span_id, flags, true, TraceState::default());
    cx.with_remote_span_context(span_context).with_value(B3Headers {
        span_id,
        parent_span_id,
        debug,
    })
}

/// 32 hex characters, or 16 for 64-bit ids which are left-padded with zeros.
fn trace_id_from_hex(hex: &str) -> Option<TraceId> {
    if !matches!(hex.len(), 16 | 32) || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    TraceId::from_hex(hex)
        .ok()
        .filter(|id| *id != TraceId::INVALID)
}

fn span_id_from_hex(hex: &str) -> Option<SpanId> {
    if hex.len() != 16 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    SpanId::from_hex(hex).ok().filter(|id| *id != SpanId::INVALID)
}

fn is_sampled_value(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use http::{HeaderMap, HeaderName, HeaderValue};
    use opentelemetry_http::HeaderExtractor;

    const TRACE_ID: &str = "463ac35c9f6413ad48485a3953bb6124";
    const SPAN_ID: &str = "a2fb4a1d1a96d312";
    const PARENT_ID: &str = "0020000000000001";

    fn carrier(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn extract(pairs: &[(&str, &str)]) -> Context {
        B3Propagator::injecting_multi_headers()
            .extract_with_context(&Context::new(), &carrier(pairs))
    }

    fn remote(cx: &Context) -> SpanContext {
        cx.span().span_context().clone()
    }

    #[test]
    fn multi_headers_are_extracted() {
        let cx = extract(&[
            ("x-b3-traceid", TRACE_ID),
            ("x-b3-spanid", SPAN_ID),
            ("x-b3-parentspanid", PARENT_ID),
            ("x-b3-sampled", "1"),
        ]);

        let sc = remote(&cx);
        assert_eq!(sc.trace_id().to_string(), TRACE_ID);
        assert_eq!(sc.span_id().to_string(), SPAN_ID);
        assert!(sc.is_sampled());
        assert!(sc.is_remote());
        assert!(cx.has_b3_remote_parent());
        assert!(!cx.b3_debug());
        assert_eq!(cx.b3_parent_span_id().unwrap().to_string(), PARENT_ID);
    }

    #[test]
    fn re_cased_header_names_are_understood() {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("X-b3-traceid", TRACE_ID),
            ("X-B3-SpanId", SPAN_ID),
            ("X-b3-sampled", "true"),
        ] {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static(value),
            );
        }

        let cx = B3Propagator::default()
            .extract_with_context(&Context::new(), &HeaderExtractor(&headers));
        assert!(remote(&cx).is_sampled());
        assert_eq!(remote(&cx).span_id().to_string(), SPAN_ID);
    }

    #[test]
    fn non_utf8_header_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-b3-traceid",
            HeaderValue::from_bytes(b"\xff").unwrap(),
        );
        headers.insert("x-b3-spanid", HeaderValue::from_static(SPAN_ID));

        let extractor = HeaderExtractor(&headers);
        assert!(extractor.get("x-b3-traceid").is_none());

        let cx = B3Propagator::default().extract_with_context(&Context::new(), &extractor);
        assert!(!remote(&cx).is_valid());
        assert!(!cx.has_b3_remote_parent());
    }

    #[test]
    fn missing_sampled_header_means_not_sampled() {
        let cx = extract(&[("x-b3-traceid", TRACE_ID), ("x-b3-spanid", SPAN_ID)]);
        assert!(remote(&cx).is_valid());
        assert!(!remote(&cx).is_sampled());
    }

    #[test]
    fn debug_flag_forces_sampling() {
        let cx = extract(&[
            ("x-b3-traceid", TRACE_ID),
            ("x-b3-spanid", SPAN_ID),
            ("x-b3-sampled", "0"),
            ("x-b3-flags", "1"),
        ]);
        assert!(cx.b3_debug());
        assert!(remote(&cx).is_sampled());
    }

    #[test]
    fn sixty_four_bit_trace_id_is_padded() {
        let cx = extract(&[("x-b3-traceid", "48485a3953bb6124"), ("x-b3-spanid", SPAN_ID)]);
        assert_eq!(
            remote(&cx).trace_id().to_string(),
            "000000000000000048485a3953bb6124"
        );
    }

    #[test]
    fn invalid_multi_headers_extract_nothing() {
        assert!(!remote(&extract(&[("x-b3-traceid", TRACE_ID)])).is_valid());
        assert!(!remote(&extract(&[("x-b3-traceid", "xyz"), ("x-b3-spanid", SPAN_ID)])).is_valid());
        assert!(!remote(&extract(&[
            ("x-b3-traceid", "+63ac35c9f6413ad48485a3953bb6124"),
            ("x-b3-spanid", SPAN_ID)
        ]))
        .is_valid());
        assert!(!remote(&extract(&[
            ("x-b3-traceid", TRACE_ID),
            ("x-b3-spanid", "0000000000000000")
        ]))
        .is_valid());
    }

    #[test]
    fn invalid_parent_span_id_is_ignored() {
        let cx = extract(&[
            ("x-b3-traceid", TRACE_ID),
            ("x-b3-spanid", SPAN_ID),
            ("x-b3-parentspanid", "nope"),
        ]);
        assert!(remote(&cx).is_valid());
        assert!(cx.b3_parent_span_id().is_none());
    }

    #[test]
    fn single_header_is_extracted() {
        let value = format!("{TRACE_ID}-{SPAN_ID}-1-{PARENT_ID}");
        let cx = extract(&[("b3", value.as_str())]);
        let sc = remote(&cx);
        assert_eq!(sc.trace_id().to_string(), TRACE_ID);
        assert!(sc.is_sampled());
        assert_eq!(cx.b3_parent_span_id().unwrap().to_string(), PARENT_ID);
    }

    #[test]
    fn single_header_debug_and_deferred_sampling() {
        let debug = format!("{TRACE_ID}-{SPAN_ID}-d");
        let cx = extract(&[("b3", debug.as_str())]);
        assert!(cx.b3_debug());
        assert!(remote(&cx).is_sampled());

        let deferred = format!("{TRACE_ID}-{SPAN_ID}");
        let cx = extract(&[("b3", deferred.as_str())]);
        assert!(!remote(&cx).is_sampled());
    }

    #[test]
    fn single_header_takes_precedence_over_multi_headers() {
        let single = format!("{TRACE_ID}-{SPAN_ID}-1");
        let cx = extract(&[
            ("b3", single.as_str()),
            ("x-b3-traceid", "0af7651916cd43dd8448eb211c80319c"),
            ("x-b3-spanid", "b7ad6b7169203331"),
        ]);
        assert_eq!(remote(&cx).span_id().to_string(), SPAN_ID);
    }

    #[test]
    fn malformed_single_header_falls_back_to_multi_headers() {
        let cx = extract(&[
            ("b3", "0"),
            ("x-b3-traceid", TRACE_ID),
            ("x-b3-spanid", SPAN_ID),
        ]);
        assert_eq!(remote(&cx).span_id().to_string(), SPAN_ID);

        let too_many = format!("{TRACE_ID}-{SPAN_ID}-1-{PARENT_ID}-extra");
        assert!(!remote(&extract(&[("b3", too_many.as_str())])).is_valid());
    }

    #[test]
    fn b3_details_follow_the_active_span_context() {
        let cx = extract(&[
            ("x-b3-traceid", TRACE_ID),
            ("x-b3-spanid", SPAN_ID),
            ("x-b3-parentspanid", PARENT_ID),
            ("x-b3-flags", "1"),
        ]);
        let replaced = cx.with_remote_span_context(SpanContext::new(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
            SpanId::from_hex("b7ad6b7169203331").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ));

        assert!(!replaced.has_b3_remote_parent());
        assert!(!replaced.b3_debug());
        assert!(replaced.b3_parent_span_id().is_none());
    }

    #[test]
    fn multi_header_injection() {
        let source = extract(&[
            ("x-b3-traceid", TRACE_ID),
            ("x-b3-spanid", SPAN_ID),
            ("x-b3-sampled", "1"),
        ]);
        let mut out: HashMap<String, String> = HashMap::new();
        B3Propagator::injecting_multi_headers().inject_context(&source, &mut out);

        assert_eq!(out.get(TRACE_ID_HEADER).map(String::as_str), Some(TRACE_ID));
        assert_eq!(out.get(SPAN_ID_HEADER).map(String::as_str), Some(SPAN_ID));
        assert_eq!(out.get(SAMPLED_HEADER).map(String::as_str), Some("1"));
        assert!(!out.contains_key(DEBUG_HEADER));
    }

    #[test]
    fn debug_injection_replaces_sampled_header() {
        let source = extract(&[
            ("x-b3-traceid", TRACE_ID),
            ("x-b3-spanid", SPAN_ID),
            ("x-b3-flags", "1"),
        ]);

        let mut multi: HashMap<String, String> = HashMap::new();
        B3Propagator::injecting_multi_headers().inject_context(&source, &mut multi);
        assert_eq!(multi.get(DEBUG_HEADER).map(String::as_str), Some("1"));
        assert!(!multi.contains_key(SAMPLED_HEADER));

        let mut single: HashMap<String, String> = HashMap::new();
        B3Propagator::injecting_single_header().inject_context(&source, &mut single);
        assert_eq!(
            single.get(SINGLE_HEADER).cloned(),
            Some(format!("{TRACE_ID}-{SPAN_ID}-d"))
        );
    }

    #[test]
    fn nothing_is_injected_without_a_span_context() {
        let mut out: HashMap<String, String> = HashMap::new();
        B3Propagator::injecting_single_header().inject_context(&Context::new(), &mut out);
        B3Propagator::injecting_multi_headers().inject_context(&Context::new(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn fields_follow_injection_format() {
        let single_propagator = B3Propagator::injecting_single_header();
        let single: Vec<&str> = single_propagator.fields().collect();
        assert_eq!(single, vec!["b3"]);
        assert_eq!(B3Propagator::injecting_multi_headers().fields().count(), 4);
    }
}
