//! # W3C Trace Context Propagator
//!
//! The `traceparent` header carries the trace id, the id of the calling span
//! and the trace flags:
//!
//! ```text
//! traceparent: 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01
//! ```
//!
//! `tracestate` is not read or written.
use std::sync::OnceLock;
use telepipe::{
    otel_debug,
    propagation::{Extractor, FieldIter, Injector, PropagationError, TextMapPropagator},
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId},
    Context,
};

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;
const TRACEPARENT_HEADER: &str = "traceparent";

static TRACE_CONTEXT_HEADER_FIELDS: OnceLock<[String; 1]> = OnceLock::new();

fn trace_context_header_fields() -> &'static [String; 1] {
    TRACE_CONTEXT_HEADER_FIELDS.get_or_init(|| [TRACEPARENT_HEADER.to_owned()])
}

/// Propagates the active span in [W3C TraceContext] format.
///
/// Injection writes `traceparent` only when the context holds a valid span.
/// Extraction of a malformed header yields the input context unchanged; the
/// reason is reported as a debug level internal log.
///
/// [W3C TraceContext]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    fn extract_span_context(
        &self,
        extractor: &dyn Extractor,
    ) -> Result<SpanContext, PropagationError> {
        let decode = |reason| PropagationError::decode(TRACEPARENT_HEADER, reason);

        let header_value = extractor
            .get(TRACEPARENT_HEADER)
            .ok_or_else(|| decode("header missing"))?
            .trim();
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        if parts.len() < 4 {
            return Err(decode("expected four dash separated fields"));
        }

        // Later versions may append fields; only the first four are read.
        if !is_lower_hex(parts[0], 2) {
            return Err(decode("invalid version"));
        }
        let version = u8::from_str_radix(parts[0], 16).map_err(|_| decode("invalid version"))?;
        if version > MAX_VERSION {
            return Err(decode("unsupported version"));
        }
        if version == SUPPORTED_VERSION && parts.len() != 4 {
            return Err(decode("version 00 allows exactly four fields"));
        }

        if !is_lower_hex(parts[1], 32) {
            return Err(decode("invalid trace id"));
        }
        let trace_id = TraceId::from_hex(parts[1]).map_err(|_| decode("invalid trace id"))?;

        if !is_lower_hex(parts[2], 16) {
            return Err(decode("invalid parent id"));
        }
        let span_id = SpanId::from_hex(parts[2]).map_err(|_| decode("invalid parent id"))?;

        if !is_lower_hex(parts[3], 2) {
            return Err(decode("invalid trace flags"));
        }
        let opts = u8::from_str_radix(parts[3], 16).map_err(|_| decode("invalid trace flags"))?;
        if version == SUPPORTED_VERSION && opts > 2 {
            return Err(decode("unknown trace flags for version 00"));
        }
        // Only the sampled bit is defined.
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        let span_context = SpanContext::new(trace_id, span_id, trace_flags, true);
        if !span_context.is_valid() {
            return Err(decode("all zero trace id or parent id"));
        }

        Ok(span_context)
    }
}

/// `from_str_radix` alone would also take a sign or uppercase digits.
fn is_lower_hex(field: &str, len: usize) -> bool {
    field.len() == len && field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl TextMapPropagator for TraceContextPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let Some(span) = cx.span() else {
            return;
        };
        let span_context = span.span_context();
        if span_context.is_valid() {
            let header_value = format!(
                "{:02x}-{}-{}-{:02x}",
                SUPPORTED_VERSION,
                span_context.trace_id(),
                span_context.span_id(),
                span_context.trace_flags() & TraceFlags::SAMPLED
            );
            injector.set(TRACEPARENT_HEADER, header_value);
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        match self.extract_span_context(extractor) {
            Ok(span_context) => cx.with_remote_span_context(span_context),
            Err(err) => {
                if extractor.get(TRACEPARENT_HEADER).is_some() {
                    otel_debug!(
                        name: "TraceContextPropagator.ExtractFailed",
                        error = format!("{err}")
                    );
                }
                cx.clone()
            }
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(trace_context_header_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::sync::Arc;
    use telepipe::trace::ContextSpan;

    const TRACE_ID: u128 = 0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736;
    const SPAN_ID: u64 = 0x00f0_67aa_0ba9_02b7;

    fn extract(header: &str) -> Context {
        let mut extractor = HashMap::new();
        extractor.insert(TRACEPARENT_HEADER.to_string(), header.to_string());
        TraceContextPropagator::new().extract(&extractor)
    }

    #[rustfmt::skip]
    #[rstest]
    #[case("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00", TraceFlags::NOT_SAMPLED)]
    #[case("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", TraceFlags::SAMPLED)]
    #[case("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", TraceFlags::SAMPLED)]
    #[case("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09", TraceFlags::SAMPLED)]
    #[case("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-08", TraceFlags::NOT_SAMPLED)]
    #[case("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09-XYZxsf09", TraceFlags::SAMPLED)]
    #[case("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-", TraceFlags::SAMPLED)]
    #[case("  00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01  ", TraceFlags::SAMPLED)]
    fn extract_valid(#[case] header: &str, #[case] flags: TraceFlags) {
        let cx = extract(header);
        let span = cx.span().expect("remote span is set");
        assert_eq!(
            span.span_context(),
            &SpanContext::new(TraceId::from(TRACE_ID), SpanId::from(SPAN_ID), flags, true)
        );
    }

    #[rustfmt::skip]
    #[rstest]
    #[case("0000-00000000000000000000000000000000-0000000000000000-01")] // wrong version length
    #[case("00-ab00000000000000000000000000000000-cd00000000000000-01")] // wrong trace id length
    #[case("00-ab000000000000000000000000000000-cd0000000000000000-01")] // wrong span id length
    #[case("00-ab000000000000000000000000000000-cd00000000000000-0100")] // wrong flags length
    #[case("qw-00000000000000000000000000000000-0000000000000000-01")]   // bogus version
    #[case("00-qw000000000000000000000000000000-cd00000000000000-01")]   // bogus trace id
    #[case("00-ab000000000000000000000000000000-qw00000000000000-01")]   // bogus span id
    #[case("00-ab000000000000000000000000000000-cd00000000000000-qw")]   // bogus flags
    #[case("ff-ab000000000000000000000000000000-cd00000000000000-01")]   // forbidden version
    #[case("00-AB000000000000000000000000000000-cd00000000000000-01")]   // upper case trace id
    #[case("00-ab000000000000000000000000000000-CD00000000000000-01")]   // upper case span id
    #[case("00-ab000000000000000000000000000000-cd00000000000000-A1")]   // upper case flags
    #[case("00-00000000000000000000000000000000-0000000000000000-01")]   // zero ids
    #[case("00-ab000000000000000000000000000000-cd00000000000000-09")]   // unused flag bits
    #[case("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7")]      // missing flags
    #[case("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-")]     // empty flags
    #[case("")]
    #[case("00-+bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")]   // signed trace id
    #[case("00-4bf92f3577b34da6a3ce929d0e0e4736-+0f067aa0ba902b7-01")]   // signed span id
    #[case("+0-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")]   // signed version
    #[case("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-+1")]   // signed flags
    fn extract_rejects_invalid(#[case] header: &str) {
        assert!(extract(header).span().is_none(), "{header}");
    }

    #[test]
    fn extract_keeps_base_context_on_failure() {
        #[derive(Debug, PartialEq)]
        struct Tenant(&'static str);

        let base = Context::new().with_value(Tenant("acme"));
        let mut extractor = HashMap::new();
        extractor.insert(TRACEPARENT_HEADER.to_string(), "garbage".to_string());

        let cx = TraceContextPropagator::new().extract_with_context(&base, &extractor);
        assert_eq!(cx.get::<Tenant>(), Some(&Tenant("acme")));
        assert!(cx.span().is_none());
    }

    #[rstest]
    #[case(TraceFlags::SAMPLED, "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")]
    #[case(TraceFlags::NOT_SAMPLED, "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00")]
    #[case(TraceFlags::new(0xff), "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")]
    fn inject(#[case] flags: TraceFlags, #[case] expected: &str) {
        let span_context =
            SpanContext::new(TraceId::from(TRACE_ID), SpanId::from(SPAN_ID), flags, false);
        let cx = Context::new().with_span(Arc::new(ContextSpan::new(span_context)));

        let mut injector: HashMap<String, String> = HashMap::new();
        TraceContextPropagator::new().inject_context(&cx, &mut injector);

        assert_eq!(injector.get(TRACEPARENT_HEADER).map(String::as_str), Some(expected));
    }

    #[test]
    fn inject_without_span_writes_nothing() {
        let mut injector: HashMap<String, String> = HashMap::new();
        TraceContextPropagator::new().inject_context(&Context::new(), &mut injector);
        assert!(injector.is_empty());

        let cx = Context::new().with_remote_span_context(SpanContext::NONE);
        TraceContextPropagator::new().inject_context(&cx, &mut injector);
        assert!(injector.is_empty());
    }

    #[test]
    fn inject_extract_inject_round_trips() {
        let propagator = TraceContextPropagator::new();
        let span_context = SpanContext::new(
            TraceId::from(TRACE_ID),
            SpanId::from(SPAN_ID),
            TraceFlags::SAMPLED,
            false,
        );
        let cx = Context::new().with_span(Arc::new(ContextSpan::new(span_context)));

        let mut first: HashMap<String, String> = HashMap::new();
        propagator.inject_context(&cx, &mut first);

        let extracted = propagator.extract(&first);
        let mut second: HashMap<String, String> = HashMap::new();
        propagator.inject_context(&extracted, &mut second);

        assert_eq!(first, second);
        let remote = extracted.span().expect("extracted span");
        assert!(remote.span_context().is_remote());
    }

    #[test]
    fn fields() {
        let propagator = TraceContextPropagator::new();
        assert_eq!(propagator.fields().collect::<Vec<_>>(), vec![TRACEPARENT_HEADER]);
    }
}
