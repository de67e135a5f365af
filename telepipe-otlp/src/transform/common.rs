use opentelemetry_proto::tonic::common::v1::{
    any_value, AnyValue, ArrayValue, InstrumentationScope as ProtoScope, KeyValue as ProtoKeyValue,
};
use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;
use std::time::{SystemTime, UNIX_EPOCH};
use telepipe::{Array, InstrumentationScope, KeyValue, Value};
use telepipe_sdk::Resource;

pub(crate) fn to_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

pub(crate) fn any_value(value: &Value) -> AnyValue {
    let value = match value {
        Value::Bool(v) => any_value::Value::BoolValue(*v),
        Value::I64(v) => any_value::Value::IntValue(*v),
        Value::F64(v) => any_value::Value::DoubleValue(*v),
        Value::String(v) => any_value::Value::StringValue(v.to_string()),
        Value::Array(array) => any_value::Value::ArrayValue(ArrayValue {
            values: match array {
                Array::Bool(vals) => vals.iter().map(|v| any_value(&Value::Bool(*v))).collect(),
                Array::I64(vals) => vals.iter().map(|v| any_value(&Value::I64(*v))).collect(),
                Array::F64(vals) => vals.iter().map(|v| any_value(&Value::F64(*v))).collect(),
                Array::String(vals) => vals
                    .iter()
                    .map(|v| any_value(&Value::String(v.clone())))
                    .collect(),
            },
        }),
    };
    AnyValue { value: Some(value) }
}

pub(crate) fn key_values<'a>(attributes: impl IntoIterator<Item = &'a KeyValue>) -> Vec<ProtoKeyValue> {
    attributes
        .into_iter()
        .map(|kv| ProtoKeyValue {
            key: kv.key.as_str().to_string(),
            value: Some(any_value(&kv.value)),
            ..Default::default()
        })
        .collect()
}

pub(crate) fn instrumentation_scope(scope: &InstrumentationScope) -> ProtoScope {
    ProtoScope {
        name: scope.name().to_string(),
        version: scope.version().unwrap_or_default().to_string(),
        attributes: key_values(scope.attributes()),
        ..Default::default()
    }
}

/// The resource in wire form, computed once when the provider hands it to
/// the exporter.
#[derive(Clone, Debug, Default)]
pub(crate) struct ResourceAttributesWithSchema {
    pub(crate) attributes: Vec<ProtoKeyValue>,
    pub(crate) schema_url: Option<String>,
}

impl ResourceAttributesWithSchema {
    pub(crate) fn to_proto(&self) -> ProtoResource {
        ProtoResource {
            attributes: self.attributes.clone(),
            ..Default::default()
        }
    }

    pub(crate) fn schema_url(&self) -> String {
        self.schema_url.clone().unwrap_or_default()
    }
}

impl From<&Resource> for ResourceAttributesWithSchema {
    fn from(resource: &Resource) -> Self {
        let mut attributes: Vec<_> = resource
            .iter()
            .map(|(key, value)| ProtoKeyValue {
                key: key.as_str().to_string(),
                value: Some(any_value(value)),
                ..Default::default()
            })
            .collect();
        attributes.sort_by(|a, b| a.key.cmp(&b.key));
        ResourceAttributesWithSchema {
            attributes,
            schema_url: resource.schema_url().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn values() {
        assert_eq!(
            any_value(&Value::from("GET")).value,
            Some(any_value::Value::StringValue("GET".into()))
        );
        assert_eq!(
            any_value(&Value::I64(200)).value,
            Some(any_value::Value::IntValue(200))
        );
        let array = any_value(&Value::Array(Array::String(vec![Arc::from("a"), Arc::from("b")])));
        match array.value {
            Some(any_value::Value::ArrayValue(array)) => assert_eq!(array.values.len(), 2),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn resource_sorted_with_schema() {
        let resource = Resource::builder_empty()
            .with_service_name("checkout")
            .with_attribute(KeyValue::new("host.name", "web-1"))
            .with_schema_url("https://opentelemetry.io/schemas/1.26.0")
            .build();
        let converted = ResourceAttributesWithSchema::from(&resource);
        let keys: Vec<_> = converted.attributes.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["host.name", "service.name"]);
        assert_eq!(converted.schema_url(), "https://opentelemetry.io/schemas/1.26.0");
        assert_eq!(converted.to_proto().attributes.len(), 2);
    }

    #[test]
    fn nanos_before_epoch_is_zero() {
        assert_eq!(to_nanos(UNIX_EPOCH + Duration::from_millis(1500)), 1_500_000_000);
        assert_eq!(to_nanos(UNIX_EPOCH - Duration::from_secs(1)), 0);
    }
}
