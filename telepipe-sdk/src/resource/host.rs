use crate::resource::{Resource, ResourceDetector, HOST_NAME};
use telepipe::{otel_debug, KeyValue};

/// Detects `host.name` through the operating system.
///
/// When the lookup is unavailable the detector returns an empty resource,
/// so the attribute is simply absent.
#[derive(Debug, Default)]
pub struct HostResourceDetector {
    _private: (),
}

impl ResourceDetector for HostResourceDetector {
    fn detect(&self) -> Resource {
        match sysinfo::System::host_name().filter(|name| !name.is_empty()) {
            Some(host_name) => Resource::builder_empty()
                .with_attribute(KeyValue::new(HOST_NAME, host_name))
                .build(),
            None => {
                otel_debug!(name: "HostResourceDetector.HostNameUnavailable");
                Resource::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telepipe::{Key, Value};

    #[test]
    fn host_name_is_only_attribute() {
        let resource = HostResourceDetector::default().detect();
        assert!(resource.len() <= 1);
        if let Some(Value::String(name)) = resource.get(&Key::from_static_str(HOST_NAME)) {
            assert!(!name.is_empty());
        }
    }
}
