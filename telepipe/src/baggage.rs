//! Request-scoped key-value pairs that travel with the trace.
//!
//! Baggage is stored in a [`Context`] and propagated with the `baggage`
//! header. Entries are limited to 64 pairs and 8192 bytes in total; inserts
//! beyond those limits are ignored.
use crate::{Context, Key, KeyValue};
use std::collections::{hash_map, HashMap};
use std::sync::{Arc, OnceLock};

static DEFAULT_BAGGAGE: OnceLock<Baggage> = OnceLock::new();

const MAX_KEY_VALUE_PAIRS: usize = 64;
const MAX_LEN_OF_ALL_PAIRS: usize = 8192;

// Separators are not allowed in keys (RFC 7230 token).
const INVALID_ASCII_KEY_CHARS: [u8; 17] = [
    b'(', b')', b',', b'/', b':', b';', b'<', b'=', b'>', b'?', b'@', b'[', b'\\', b']', b'{',
    b'}', b'"',
];

/// A set of name/value pairs describing user-defined properties.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Baggage {
    inner: HashMap<Key, Arc<str>>,
    kv_content_len: usize,
}

impl Baggage {
    /// Creates an empty `Baggage`.
    pub fn new() -> Self {
        Baggage::default()
    }

    /// Returns the value associated with a given name.
    pub fn get<K: AsRef<str>>(&self, key: K) -> Option<&str> {
        self.inner.get(key.as_ref()).map(|value| &**value)
    }

    /// Inserts a name/value pair, returning the previous value for the name.
    ///
    /// Invalid keys and entries that would exceed the size limits are
    /// dropped.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<Arc<str>>
    where
        K: Into<Key>,
        V: Into<Arc<str>>,
    {
        let (key, value) = (key.into(), value.into());
        if !Self::is_key_valid(key.as_str().as_bytes()) {
            return None;
        }
        let entry_len = key.as_str().len() + value.len();
        let pairs = self.inner.len();
        match self.inner.entry(key) {
            hash_map::Entry::Occupied(mut occupied) => {
                let prev_len = occupied.key().as_str().len() + occupied.get().len();
                let new_len = self.kv_content_len + entry_len - prev_len;
                if new_len > MAX_LEN_OF_ALL_PAIRS {
                    return None;
                }
                self.kv_content_len = new_len;
                Some(occupied.insert(value))
            }
            hash_map::Entry::Vacant(vacant) => {
                if self.kv_content_len + entry_len > MAX_LEN_OF_ALL_PAIRS
                    || pairs == MAX_KEY_VALUE_PAIRS
                {
                    return None;
                }
                self.kv_content_len += entry_len;
                vacant.insert(value);
                None
            }
        }
    }

    /// Removes a name from the baggage, returning the value if present.
    pub fn remove<K: AsRef<str>>(&mut self, key: K) -> Option<Arc<str>> {
        let removed = self.inner.remove(key.as_ref());
        if let Some(value) = &removed {
            self.kv_content_len -= key.as_ref().len() + value.len();
        }
        removed
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the baggage contains no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Gets an iterator over the baggage items, in any order.
    pub fn iter(&self) -> hash_map::Iter<'_, Key, Arc<str>> {
        self.inner.iter()
    }

    fn is_key_valid(key: &[u8]) -> bool {
        !key.is_empty()
            && key
                .iter()
                .all(|b| b.is_ascii_graphic() && !INVALID_ASCII_KEY_CHARS.contains(b))
    }
}

impl FromIterator<KeyValue> for Baggage {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        let mut baggage = Baggage::default();
        for kv in iter {
            baggage.insert(kv.key, kv.value.as_str().into_owned());
        }
        baggage
    }
}

impl FromIterator<(String, String)> for Baggage {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut baggage = Baggage::default();
        for (key, value) in iter {
            baggage.insert(key, value);
        }
        baggage
    }
}

/// Methods for sorting and retrieving baggage data in a context.
pub trait BaggageExt {
    /// Returns a clone of the given context with the included name/value pairs.
    fn with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValue>>(&self, baggage: T) -> Self;

    /// Returns a clone of the current context with the included name/value pairs.
    fn current_with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValue>>(baggage: T) -> Self;

    /// Returns a clone of the given context with no baggage.
    fn with_cleared_baggage(&self) -> Self;

    /// Returns a reference to this context's baggage, or the default empty
    /// baggage if none has been set.
    fn baggage(&self) -> &Baggage;
}

impl BaggageExt for Context {
    fn with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValue>>(&self, baggage: T) -> Self {
        let mut merged = self.baggage().clone();
        for kv in baggage.into_iter().map(Into::into) {
            merged.insert(kv.key, kv.value.as_str().into_owned());
        }
        self.with_value(merged)
    }

    fn current_with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValue>>(kvs: T) -> Self {
        Context::map_current(|cx| cx.with_baggage(kvs))
    }

    fn with_cleared_baggage(&self) -> Self {
        self.with_value(Baggage::new())
    }

    fn baggage(&self) -> &Baggage {
        self.get::<Baggage>()
            .unwrap_or_else(|| DEFAULT_BAGGAGE.get_or_init(Baggage::default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_replace() {
        let mut baggage = Baggage::new();
        assert_eq!(baggage.insert("user.id", "42"), None);
        assert_eq!(baggage.insert("user.id", "43").as_deref(), Some("42"));
        assert_eq!(baggage.get("user.id"), Some("43"));
        assert_eq!(baggage.len(), 1);
    }

    #[test]
    fn invalid_keys_are_ignored() {
        let mut baggage = Baggage::new();
        baggage.insert("", "empty");
        baggage.insert("a=b", "separator");
        baggage.insert("with space", "space");
        assert!(baggage.is_empty());
    }

    #[test]
    fn pair_count_limit() {
        let baggage: Baggage = (0..MAX_KEY_VALUE_PAIRS + 10)
            .map(|i| (format!("key{i}"), "v".to_string()))
            .collect();
        assert_eq!(baggage.len(), MAX_KEY_VALUE_PAIRS);
    }

    #[test]
    fn full_baggage_updates_existing_keys() {
        let mut baggage: Baggage = (0..MAX_KEY_VALUE_PAIRS)
            .map(|i| (format!("key{i}"), "v".to_string()))
            .collect();

        assert!(baggage.insert("key0", "updated").is_some());
        assert_eq!(baggage.get("key0"), Some("updated"));
        assert!(baggage.insert("extra", "v").is_none());
        assert!(baggage.get("extra").is_none());
        assert_eq!(baggage.len(), MAX_KEY_VALUE_PAIRS);
    }

    #[test]
    fn total_length_limit() {
        let mut baggage = Baggage::new();
        let big = "x".repeat(MAX_LEN_OF_ALL_PAIRS / 2);
        baggage.insert("a", big.clone());
        baggage.insert("b", big.clone());
        assert_eq!(baggage.len(), 1);

        baggage.remove("a");
        baggage.insert("b", big);
        assert_eq!(baggage.len(), 1);
        assert!(baggage.get("b").is_some());
    }

    #[test]
    fn context_baggage_merges() {
        let cx = Context::new().with_baggage([KeyValue::new("tenant", "acme")]);
        let cx = cx.with_baggage([KeyValue::new("region", "eu")]);
        assert_eq!(cx.baggage().get("tenant"), Some("acme"));
        assert_eq!(cx.baggage().get("region"), Some("eu"));
        assert!(cx.with_cleared_baggage().baggage().is_empty());
        assert!(Context::new().baggage().is_empty());
    }
}
