use crate::logs::{LogData, SdkLogRecord, SdkLoggerProvider, Severity, TraceContext};
use std::time::SystemTime;
use telepipe::trace::TraceContextExt;
use telepipe::{Context, InstrumentationScope};

/// Emits log records for one instrumentation scope.
///
/// Obtained from [`SdkLoggerProvider::logger`].
#[derive(Debug, Clone)]
pub struct SdkLogger {
    scope: InstrumentationScope,
    provider: SdkLoggerProvider,
}

impl SdkLogger {
    pub(crate) fn new(scope: InstrumentationScope, provider: SdkLoggerProvider) -> Self {
        SdkLogger { scope, provider }
    }

    /// The scope this logger was created with.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Creates an empty record to fill and [`emit`](Self::emit).
    pub fn create_log_record(&self) -> SdkLogRecord {
        SdkLogRecord::new()
    }

    /// Hands the record to every processor of the provider.
    ///
    /// Unless already set, the record is correlated with the span active in
    /// the current context and stamped with the observed time.
    pub fn emit(&self, mut record: SdkLogRecord) {
        if self.provider.is_shutdown() {
            return;
        }
        let processors = self.provider.log_processors();
        if processors.is_empty() {
            return;
        }

        if record.trace_context.is_none() {
            Context::map_current(|cx| {
                if let Some(span) = cx.span().filter(|_| cx.has_active_span()) {
                    record.trace_context = Some(TraceContext::from(span.span_context()));
                }
            });
        }
        if record.observed_timestamp.is_none() {
            record.observed_timestamp = Some(SystemTime::now());
        }

        let data = LogData {
            record,
            instrumentation_scope: self.scope.clone(),
        };
        match processors {
            [only] => only.emit(data),
            _ => {
                for processor in processors {
                    processor.emit(data.clone());
                }
            }
        }
    }

    /// Whether any processor would accept a record of this severity.
    pub fn event_enabled(&self, severity: Severity, target: &str) -> bool {
        !self.provider.is_shutdown()
            && self
                .provider
                .log_processors()
                .iter()
                .any(|processor| processor.event_enabled(severity, target))
    }
}
