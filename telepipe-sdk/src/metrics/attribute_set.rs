use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use telepipe::{Key, KeyValue};

/// A unique set of attributes identifying one stream of an instrument.
///
/// Keys are sorted and unique, later duplicates win, so equal sets hash
/// equally regardless of the order the caller passed them in.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub(crate) struct AttributeSet(Vec<KeyValue>, u64);

impl From<&[KeyValue]> for AttributeSet {
    fn from(values: &[KeyValue]) -> Self {
        AttributeSet::new(values.to_vec())
    }
}

impl AttributeSet {
    fn new(mut values: Vec<KeyValue>) -> Self {
        // stable sort keeps the caller's order between equal keys, so the
        // last occurrence is the one to keep
        values.sort_by(|a, b| a.key.cmp(&b.key));
        let mut deduped: Vec<KeyValue> = Vec::with_capacity(values.len());
        for kv in values {
            match deduped.last_mut() {
                Some(last) if last.key == kv.key => *last = kv,
                _ => deduped.push(kv),
            }
        }

        let hash = calculate_hash(&deduped);
        AttributeSet(deduped, hash)
    }

    /// Builds the set from `values`, keeping only keys in `allowed` when a
    /// filter is given.
    pub(crate) fn filtered(values: &[KeyValue], allowed: Option<&HashSet<Key>>) -> Self {
        match allowed {
            Some(allowed) => AttributeSet::new(
                values
                    .iter()
                    .filter(|kv| allowed.contains(&kv.key))
                    .cloned()
                    .collect(),
            ),
            None => AttributeSet::from(values),
        }
    }

    pub(crate) fn as_slice(&self) -> &[KeyValue] {
        &self.0
    }

    pub(crate) fn into_inner(self) -> Vec<KeyValue> {
        self.0
    }
}

fn calculate_hash(values: &[KeyValue]) -> u64 {
    let mut hasher = DefaultHasher::new();
    values.iter().for_each(|kv| kv.hash(&mut hasher));
    hasher.finish()
}

impl Hash for AttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.1)
    }
}
