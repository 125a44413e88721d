use std::collections::HashMap;

/// One value in a FETCH item map.
///
/// Lists, quoted strings and numbers arrive as text; `{N}` literal blocks
/// keep their exact bytes, which need not be valid UTF-8.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FetchValue {
    /// A parenthesised list, quoted string or bare number, as text.
    Text(String),
    /// The verbatim octets of a `{N}` literal block, line terminators included.
    Literal(Vec<u8>),
}

impl FetchValue {
    /// The textual form, if this value is not a literal block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FetchValue::Text(s) => Some(s),
            FetchValue::Literal(_) => None,
        }
    }

    /// The raw octets of a literal block.
    pub fn as_literal(&self) -> Option<&[u8]> {
        match self {
            FetchValue::Text(_) => None,
            FetchValue::Literal(bytes) => Some(bytes),
        }
    }
}

/// The items fetched for a single message.
///
/// Most items are keyed by their canonical token (`FLAGS`, `UID`,
/// `BODYSTRUCTURE`, ...). Literal-valued items are keyed by the whole prefix
/// line up to and including the item token, so that several literals in one
/// FETCH stay distinguishable; [`FetchEntry::literal`] looks those up by the
/// token alone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchEntry {
    /// Message sequence number from the `* <n> FETCH` prefix.
    pub index: u64,
    pub(crate) items: HashMap<String, FetchValue>,
}

impl FetchEntry {
    pub(crate) fn new(index: u64) -> FetchEntry {
        FetchEntry {
            index,
            items: HashMap::new(),
        }
    }

    /// The value stored under the exact item key.
    pub fn value(&self, item: &str) -> Option<&FetchValue> {
        self.items.get(item)
    }

    /// The textual value of an item, e.g. `FLAGS` or `BODYSTRUCTURE`.
    pub fn text(&self, item: &str) -> Option<&str> {
        self.items.get(item).and_then(FetchValue::as_text)
    }

    /// The numeric value of an item, e.g. `RFC822.SIZE` or `UID`.
    pub fn number(&self, item: &str) -> Option<u64> {
        self.text(item).and_then(|v| v.parse().ok())
    }

    /// The literal block whose key contains the given item token, e.g.
    /// `BODY[1.2]` or `RFC822.HEADER`.
    pub fn literal(&self, item_token: &str) -> Option<&[u8]> {
        self.items.iter().find_map(|(key, value)| {
            if contains_ignore_case(key, item_token) {
                value.as_literal()
            } else {
                None
            }
        })
    }

    /// Iterate over all `(key, value)` items of this message.
    pub fn items(&self) -> impl Iterator<Item = (&str, &FetchValue)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn insert(&mut self, key: String, value: FetchValue) {
        self.items.insert(key, value);
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}
