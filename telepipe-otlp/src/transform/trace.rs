use crate::transform::common::{instrumentation_scope, key_values, to_nanos, ResourceAttributesWithSchema};
use opentelemetry_proto::tonic::trace::v1::{
    span, status, ResourceSpans, ScopeSpans, Span, Status,
};
use telepipe::trace::{SpanId, SpanKind, Status as SpanStatus};
use telepipe::InstrumentationScope;
use telepipe_sdk::trace::SpanData;

fn span_kind(kind: &SpanKind) -> span::SpanKind {
    match kind {
        SpanKind::Client => span::SpanKind::Client,
        SpanKind::Consumer => span::SpanKind::Consumer,
        SpanKind::Internal => span::SpanKind::Internal,
        SpanKind::Producer => span::SpanKind::Producer,
        SpanKind::Server => span::SpanKind::Server,
    }
}

fn span_status(status: &SpanStatus) -> Status {
    let (code, message) = match status {
        SpanStatus::Unset => (status::StatusCode::Unset, String::new()),
        SpanStatus::Ok => (status::StatusCode::Ok, String::new()),
        SpanStatus::Error { description } => (status::StatusCode::Error, description.to_string()),
    };
    Status {
        code: code as i32,
        message,
    }
}

pub(crate) fn span_to_proto(span: SpanData) -> Span {
    Span {
        trace_id: span.span_context.trace_id().to_bytes().to_vec(),
        span_id: span.span_context.span_id().to_bytes().to_vec(),
        parent_span_id: span
            .parent_span_id
            .filter(|id| *id != SpanId::INVALID)
            .map(|id| id.to_bytes().to_vec())
            .unwrap_or_default(),
        flags: u32::from(span.span_context.trace_flags().to_u8()),
        name: span.name.into_owned(),
        kind: span_kind(&span.span_kind) as i32,
        start_time_unix_nano: to_nanos(span.start_time),
        end_time_unix_nano: to_nanos(span.end_time),
        attributes: key_values(&span.attributes),
        events: span
            .events
            .iter()
            .map(|event| span::Event {
                time_unix_nano: to_nanos(event.timestamp),
                name: event.name.to_string(),
                attributes: key_values(&event.attributes),
                ..Default::default()
            })
            .collect(),
        status: Some(span_status(&span.status)),
        ..Default::default()
    }
}

/// Groups spans by instrumentation scope, keeping the order in which scopes
/// first appear in the batch.
pub(crate) fn group_spans_by_resource_and_scope(
    spans: Vec<SpanData>,
    resource: &ResourceAttributesWithSchema,
) -> Vec<ResourceSpans> {
    let mut scopes: Vec<(InstrumentationScope, Vec<Span>)> = Vec::new();
    for span in spans {
        let scope = span.instrumentation_scope.clone();
        let converted = span_to_proto(span);
        match scopes.iter_mut().find(|(existing, _)| *existing == scope) {
            Some((_, spans)) => spans.push(converted),
            None => scopes.push((scope, vec![converted])),
        }
    }
    if scopes.is_empty() {
        return Vec::new();
    }

    vec![ResourceSpans {
        resource: Some(resource.to_proto()),
        scope_spans: scopes
            .into_iter()
            .map(|(scope, spans)| ScopeSpans {
                schema_url: scope.schema_url().unwrap_or_default().to_string(),
                scope: Some(instrumentation_scope(&scope)),
                spans,
            })
            .collect(),
        schema_url: resource.schema_url(),
    }]
}
