use crate::transform::common::{any_value, instrumentation_scope, key_values, to_nanos, ResourceAttributesWithSchema};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use telepipe::InstrumentationScope;
use telepipe_sdk::logs::{LogData, SdkLogRecord};

pub(crate) fn log_record_to_proto(record: &SdkLogRecord) -> LogRecord {
    let (trace_id, span_id, flags) = match &record.trace_context {
        Some(cx) => (
            cx.trace_id.to_bytes().to_vec(),
            cx.span_id.to_bytes().to_vec(),
            u32::from(cx.trace_flags.to_u8()),
        ),
        None => (Vec::new(), Vec::new(), 0),
    };
    let mut attributes = key_values(&record.attributes);
    if let Some(target) = &record.target {
        attributes.extend(key_values(&[telepipe::KeyValue::new(
            "target",
            target.to_string(),
        )]));
    }

    LogRecord {
        time_unix_nano: record.timestamp.map(to_nanos).unwrap_or_default(),
        observed_time_unix_nano: record.observed_timestamp.map(to_nanos).unwrap_or_default(),
        severity_number: record
            .severity_number
            .map(|severity| i32::from(severity.number()))
            .unwrap_or_default(),
        severity_text: record.severity_text.unwrap_or_default().to_string(),
        body: record.body.as_ref().map(any_value),
        attributes,
        flags,
        trace_id,
        span_id,
        event_name: record.event_name.unwrap_or_default().to_string(),
        ..Default::default()
    }
}

/// Groups records by instrumentation scope, keeping the order in which
/// scopes first appear in the batch.
pub(crate) fn group_logs_by_resource_and_scope(
    logs: Vec<LogData>,
    resource: &ResourceAttributesWithSchema,
) -> Vec<ResourceLogs> {
    let mut scopes: Vec<(InstrumentationScope, Vec<LogRecord>)> = Vec::new();
    for log in logs {
        let converted = log_record_to_proto(&log.record);
        match scopes
            .iter_mut()
            .find(|(existing, _)| *existing == log.instrumentation_scope)
        {
            Some((_, records)) => records.push(converted),
            None => scopes.push((log.instrumentation_scope, vec![converted])),
        }
    }
    if scopes.is_empty() {
        return Vec::new();
    }

    vec![ResourceLogs {
        resource: Some(resource.to_proto()),
        scope_logs: scopes
            .into_iter()
            .map(|(scope, log_records)| ScopeLogs {
                schema_url: scope.schema_url().unwrap_or_default().to_string(),
                scope: Some(instrumentation_scope(&scope)),
                log_records,
            })
            .collect(),
        schema_url: resource.schema_url(),
    }]
}
