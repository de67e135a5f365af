use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::iter;
use std::sync::OnceLock;
use telepipe::{
    baggage::BaggageExt,
    otel_warn,
    propagation::{Extractor, FieldIter, Injector, TextMapPropagator},
    Context, KeyValue,
};

const BAGGAGE_HEADER: &str = "baggage";
const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b';').add(b',').add(b'=');

static BAGGAGE_FIELDS: OnceLock<[String; 1]> = OnceLock::new();

fn baggage_fields() -> &'static [String; 1] {
    BAGGAGE_FIELDS.get_or_init(|| [BAGGAGE_HEADER.to_owned()])
}

/// Propagates name-value pairs in [W3C Baggage] format.
///
/// Entry properties (`;prop`) are accepted on extraction but not kept.
///
/// ```
/// use telepipe::{baggage::BaggageExt, propagation::TextMapPropagator, KeyValue};
/// use telepipe_sdk::propagation::BaggagePropagator;
/// use std::collections::HashMap;
///
/// let mut headers = HashMap::new();
/// headers.insert("baggage".to_string(), "user_id=1".to_string());
///
/// let propagator = BaggagePropagator::new();
/// let cx = propagator.extract(&headers);
/// assert_eq!(cx.baggage().get("user_id"), Some("1"));
///
/// let cx = cx.with_baggage([KeyValue::new("server_id", "42")]);
/// propagator.inject_context(&cx, &mut headers);
/// assert!(headers["baggage"].contains("server_id=42"));
/// ```
///
/// [W3C Baggage]: https://w3c.github.io/baggage
#[derive(Debug, Default)]
pub struct BaggagePropagator {
    _private: (),
}

impl BaggagePropagator {
    /// Construct a new baggage propagator.
    pub fn new() -> Self {
        BaggagePropagator { _private: () }
    }
}

impl TextMapPropagator for BaggagePropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let baggage = cx.baggage();
        if baggage.is_empty() {
            return;
        }
        let mut entries = baggage
            .iter()
            .map(|(name, value)| {
                utf8_percent_encode(name.as_str().trim(), FRAGMENT)
                    .chain(iter::once("="))
                    .chain(utf8_percent_encode(value.trim(), FRAGMENT))
                    .collect::<String>()
            })
            .collect::<Vec<String>>();
        // stable output regardless of map order
        entries.sort_unstable();
        injector.set(BAGGAGE_HEADER, entries.join(","));
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let Some(header_value) = extractor.get(BAGGAGE_HEADER) else {
            return cx.clone();
        };

        let baggage = header_value.split(',').filter_map(|member| {
            // properties after the first `;` are ignored
            let name_and_value = member.split(';').next().unwrap_or_default();
            let Some((name, value)) = name_and_value.split_once('=') else {
                otel_warn!(
                    name: "BaggagePropagator.Extract.InvalidKeyValueFormat",
                    message = "Invalid baggage key-value format",
                    baggage_header = header_value,
                );
                return None;
            };
            match (
                percent_decode_str(name).decode_utf8(),
                percent_decode_str(value).decode_utf8(),
            ) {
                (Ok(name), Ok(value)) => Some(KeyValue::new(
                    name.trim().to_owned(),
                    value.trim().to_owned(),
                )),
                _ => {
                    otel_warn!(
                        name: "BaggagePropagator.Extract.InvalidUTF8",
                        message = "Invalid UTF8 string in key values",
                        baggage_header = header_value,
                    );
                    None
                }
            }
        });
        cx.with_baggage(baggage)
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(baggage_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;
    use telepipe::baggage::Baggage;

    #[rustfmt::skip]
    #[rstest]
    #[case("key1=val1,key2=val2", &[("key1", "val1"), ("key2", "val2")])]
    #[case("key1 =   val1,  key2 =val2   ", &[("key1", "val1"), ("key2", "val2")])]
    #[case("key1=val1,key2=val2%2Cval3", &[("key1", "val1"), ("key2", "val2,val3")])]
    #[case("key1=val1,key2=val2,a,val3", &[("key1", "val1"), ("key2", "val2")])]
    #[case("key1=,key2=val2", &[("key1", ""), ("key2", "val2")])]
    #[case("key1=val1;prop=1,key2=val2;prop2", &[("key1", "val1"), ("key2", "val2")])]
    fn extract_valid(#[case] header: &str, #[case] expected: &[(&str, &str)]) {
        let mut extractor = HashMap::new();
        extractor.insert(BAGGAGE_HEADER.to_string(), header.to_string());

        let cx = BaggagePropagator::new().extract(&extractor);
        let baggage = cx.baggage();
        assert_eq!(baggage.len(), expected.len(), "{header}");
        for (name, value) in expected {
            assert_eq!(baggage.get(name), Some(*value), "{header}");
        }
    }

    #[test]
    fn extract_missing_header_keeps_context() {
        let base = Context::new().with_baggage([KeyValue::new("tenant", "acme")]);
        let cx = BaggagePropagator::new().extract_with_context(&base, &HashMap::new());
        assert_eq!(cx.baggage().get("tenant"), Some("acme"));
    }

    #[rstest]
    #[case(&[("key1", "val1"), ("key2", "val2")], "key1=val1,key2=val2")]
    #[case(&[("key1", "val1,val2"), ("key2", "val3=4")], "key1=val1%2Cval2,key2=val3%3D4")]
    #[case(&[("key1", "\"quoted\"")], "key1=%22quoted%22")]
    fn inject(#[case] entries: &[(&str, &str)], #[case] expected: &str) {
        let baggage = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Baggage>();
        let cx = Context::new().with_value(baggage);

        let mut injector: HashMap<String, String> = HashMap::new();
        BaggagePropagator::new().inject_context(&cx, &mut injector);

        assert_eq!(injector.get(BAGGAGE_HEADER).map(String::as_str), Some(expected));
    }

    #[test]
    fn inject_empty_writes_nothing() {
        let mut injector: HashMap<String, String> = HashMap::new();
        BaggagePropagator::new().inject_context(&Context::new(), &mut injector);
        assert!(injector.is_empty());
    }
}
