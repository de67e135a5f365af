//! Resource detectors backed by environment variables.
use crate::resource::{Resource, ResourceDetector, SERVICE_NAME};
use std::env;
use telepipe::{Key, KeyValue, Value};

const OTEL_RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
const DEFAULT_SERVICE_NAME: &str = "unknown_service";

/// Reads `OTEL_RESOURCE_ATTRIBUTES`, a comma separated list of `key=value`
/// pairs. Entries without `=` are skipped.
#[derive(Debug, Default)]
pub struct EnvResourceDetector {
    _private: (),
}

impl EnvResourceDetector {
    /// Create a `EnvResourceDetector` instance.
    pub fn new() -> Self {
        EnvResourceDetector::default()
    }
}

impl ResourceDetector for EnvResourceDetector {
    fn detect(&self) -> Resource {
        match env::var(OTEL_RESOURCE_ATTRIBUTES) {
            Ok(s) if !s.is_empty() => parse_resource_attributes(&s),
            _ => Resource::empty(),
        }
    }
}

fn parse_resource_attributes(s: &str) -> Resource {
    Resource::builder_empty()
        .with_attributes(s.split_terminator(',').filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            Some(KeyValue::new(key.trim().to_owned(), value.trim().to_owned()))
        }))
        .build()
}

/// Provides `service.name`: `OTEL_SERVICE_NAME` first, then a `service.name`
/// entry in `OTEL_RESOURCE_ATTRIBUTES`, then `unknown_service`.
#[derive(Debug)]
pub struct SdkProvidedResourceDetector;

impl ResourceDetector for SdkProvidedResourceDetector {
    fn detect(&self) -> Resource {
        let service_name = env::var(OTEL_SERVICE_NAME)
            .ok()
            .filter(|s| !s.is_empty())
            .map(Value::from)
            .or_else(|| {
                EnvResourceDetector::new()
                    .detect()
                    .get(&Key::from_static_str(SERVICE_NAME))
            })
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.into());

        Resource::builder_empty()
            .with_attribute(KeyValue::new(SERVICE_NAME, service_name))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_from_env() {
        temp_env::with_vars(
            [
                (
                    OTEL_RESOURCE_ATTRIBUTES,
                    Some("key=value, k = v , a= x, a=z,broken,base64=SGVsbG8sIFdvcmxkIQ=="),
                ),
                ("IRRELEVANT", Some("20200810")),
            ],
            || {
                let resource = EnvResourceDetector::new().detect();
                assert_eq!(
                    resource,
                    Resource::builder_empty()
                        .with_attributes([
                            KeyValue::new("key", "value"),
                            KeyValue::new("k", "v"),
                            KeyValue::new("a", "z"),
                            KeyValue::new("base64", "SGVsbG8sIFdvcmxkIQ=="),
                        ])
                        .build()
                );
            },
        );

        temp_env::with_var_unset(OTEL_RESOURCE_ATTRIBUTES, || {
            assert!(EnvResourceDetector::new().detect().is_empty());
        });
    }

    #[test]
    fn service_name_fallbacks() {
        let service_name = || {
            SdkProvidedResourceDetector
                .detect()
                .get(&Key::from_static_str(SERVICE_NAME))
        };

        temp_env::with_vars_unset([OTEL_SERVICE_NAME, OTEL_RESOURCE_ATTRIBUTES], || {
            assert_eq!(service_name(), Some(Value::from("unknown_service")));
        });

        temp_env::with_vars(
            [
                (OTEL_SERVICE_NAME, None),
                (OTEL_RESOURCE_ATTRIBUTES, Some("service.name=from-attributes")),
            ],
            || assert_eq!(service_name(), Some(Value::from("from-attributes"))),
        );

        temp_env::with_vars(
            [
                (OTEL_SERVICE_NAME, Some("from-service-name")),
                (OTEL_RESOURCE_ATTRIBUTES, Some("service.name=from-attributes")),
            ],
            || assert_eq!(service_name(), Some(Value::from("from-service-name"))),
        );
    }
}
