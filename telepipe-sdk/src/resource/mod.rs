//! Representations of the entity producing telemetry.
//!
//! A [`Resource`] is an immutable set of attributes (service name, version,
//! host name, ...) attached to every span, metric and log record. It is
//! assembled once at startup from [`ResourceDetector`]s and static
//! attributes; when two sources set the same key, the one applied last wins.
//!
//! # Detectors
//!
//! - [`SdkProvidedResourceDetector`] - `service.name` from `OTEL_SERVICE_NAME`.
//! - [`TelemetryResourceDetector`] - `telemetry.sdk.*` attributes.
//! - [`EnvResourceDetector`] - attributes from `OTEL_RESOURCE_ATTRIBUTES`.
//! - [`HostResourceDetector`] - `host.name` from the operating system.
mod env;
mod host;

pub use env::{EnvResourceDetector, SdkProvidedResourceDetector};
pub use host::HostResourceDetector;

use std::borrow::Cow;
use std::collections::{hash_map, HashMap};
use std::sync::Arc;
use telepipe::{Key, KeyValue, Value};

/// Logical name of the service.
pub const SERVICE_NAME: &str = "service.name";
/// Version string of the service.
pub const SERVICE_VERSION: &str = "service.version";
/// Name of the host the process runs on.
pub const HOST_NAME: &str = "host.name";
const TELEMETRY_SDK_NAME: &str = "telemetry.sdk.name";
const TELEMETRY_SDK_LANGUAGE: &str = "telemetry.sdk.language";
const TELEMETRY_SDK_VERSION: &str = "telemetry.sdk.version";

#[derive(Debug, Clone, PartialEq)]
struct ResourceInner {
    attrs: HashMap<Key, Value>,
    schema_url: Option<Cow<'static, str>>,
}

/// An immutable representation of the entity producing telemetry as
/// attributes.
///
/// Cloning is cheap; clones share the same attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

impl Default for Resource {
    /// The default resource: SDK provided, telemetry and environment
    /// detectors, in that order.
    fn default() -> Self {
        Resource::builder().build()
    }
}

impl Resource {
    /// Creates a [`ResourceBuilder`] pre-populated with the default detectors
    /// ([`SdkProvidedResourceDetector`], [`TelemetryResourceDetector`],
    /// [`EnvResourceDetector`]).
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder {
            resource: Self::from_detectors(&[
                Box::new(SdkProvidedResourceDetector),
                Box::new(TelemetryResourceDetector),
                Box::new(EnvResourceDetector::new()),
            ]),
        }
    }

    /// Creates a [`ResourceBuilder`] with no attributes.
    pub fn builder_empty() -> ResourceBuilder {
        ResourceBuilder {
            resource: Resource::empty(),
        }
    }

    /// A resource without attributes.
    pub fn empty() -> Self {
        Resource::new(Vec::new())
    }

    fn new<T: IntoIterator<Item = KeyValue>>(kvs: T) -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: kvs.into_iter().map(|kv| (kv.key, kv.value)).collect(),
                schema_url: None,
            }),
        }
    }

    fn from_detectors(detectors: &[Box<dyn ResourceDetector>]) -> Self {
        detectors
            .iter()
            .fold(Resource::empty(), |acc, detector| acc.merge(&detector.detect()))
    }

    /// Returns a new resource holding the union of both attribute sets.
    ///
    /// Keys present in both take the value from `other`. The schema url is
    /// kept when only one side has one or both agree; conflicting urls are
    /// dropped.
    pub fn merge(&self, other: &Resource) -> Self {
        if self.is_empty() && self.inner.schema_url.is_none() {
            return other.clone();
        }
        if other.is_empty() && other.inner.schema_url.is_none() {
            return self.clone();
        }

        let mut attrs = self.inner.attrs.clone();
        attrs.extend(
            other
                .inner
                .attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let schema_url = match (&self.inner.schema_url, &other.inner.schema_url) {
            (Some(a), Some(b)) if a == b => Some(a.clone()),
            (Some(_), Some(_)) => None,
            (None, url) | (url, None) => url.clone(),
        };

        Resource {
            inner: Arc::new(ResourceInner { attrs, schema_url }),
        }
    }

    /// Schema url of the resource, if any.
    pub fn schema_url(&self) -> Option<&str> {
        self.inner.schema_url.as_deref()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.inner.attrs.len()
    }

    /// Returns `true` if the resource has no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.attrs.is_empty()
    }

    /// Iterates over the attributes in any order.
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.inner.attrs.iter())
    }

    /// Retrieves the value for `key`.
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.inner.attrs.get(key).cloned()
    }
}

/// An iterator over the entries of a [`Resource`].
#[derive(Debug)]
pub struct Iter<'a>(hash_map::Iter<'a, Key, Value>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Key, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl<'a> IntoIterator for &'a Resource {
    type Item = (&'a Key, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Detects resource attributes from the runtime or environment.
///
/// Detection never fails; a detector that cannot find anything returns an
/// empty resource.
pub trait ResourceDetector {
    /// Detect resource attributes.
    fn detect(&self) -> Resource;
}

/// Attributes describing this SDK.
#[derive(Debug)]
pub struct TelemetryResourceDetector;

impl ResourceDetector for TelemetryResourceDetector {
    fn detect(&self) -> Resource {
        Resource::new([
            KeyValue::new(TELEMETRY_SDK_NAME, "telepipe"),
            KeyValue::new(TELEMETRY_SDK_LANGUAGE, "rust"),
            KeyValue::new(TELEMETRY_SDK_VERSION, env!("CARGO_PKG_VERSION")),
        ])
    }
}

/// Builder for [`Resource`]. Every `with_*` call is merged over what was
/// added before it.
#[derive(Debug)]
pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    /// Adds a single detector.
    pub fn with_detector(self, detector: Box<dyn ResourceDetector>) -> Self {
        self.with_detectors(&[detector])
    }

    /// Adds detectors, applied in order.
    pub fn with_detectors(mut self, detectors: &[Box<dyn ResourceDetector>]) -> Self {
        self.resource = self.resource.merge(&Resource::from_detectors(detectors));
        self
    }

    /// Adds a single attribute.
    pub fn with_attribute(self, kv: KeyValue) -> Self {
        self.with_attributes([kv])
    }

    /// Adds attributes.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, kvs: T) -> Self {
        self.resource = self.resource.merge(&Resource::new(kvs));
        self
    }

    /// Sets `service.name`.
    pub fn with_service_name(self, name: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue::new(SERVICE_NAME, name.into()))
    }

    /// Sets `service.version`.
    pub fn with_service_version(self, version: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue::new(SERVICE_VERSION, version.into()))
    }

    /// Sets the schema url.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        let schema_url = schema_url.into();
        let inner = Arc::make_mut(&mut self.resource.inner);
        inner.schema_url = if schema_url.is_empty() {
            None
        } else {
            Some(schema_url)
        };
        self
    }

    /// Create a [`Resource`] with the options provided to the builder.
    pub fn build(self) -> Resource {
        self.resource
    }
}

/// The resource of an HTTP service: a static part naming the service merged
/// with what can be detected about the host.
///
/// If the host name cannot be determined, `host.name` is left out.
pub fn create_resource(
    service_name: impl Into<Value>,
    service_version: impl Into<Value>,
) -> Resource {
    Resource::builder()
        .with_detector(Box::new(HostResourceDetector::default()))
        .with_service_name(service_name)
        .with_service_version(service_version)
        .build()
}
