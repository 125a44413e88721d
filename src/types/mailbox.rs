use std::collections::HashMap;
use std::fmt;

use super::ResponseHeader;

/// State of a mailbox, as returned by
/// [`SELECT`](https://tools.ietf.org/html/rfc3501#section-6.3.1) and
/// [`EXAMINE`](https://tools.ietf.org/html/rfc3501#section-6.3.2).
///
/// The untagged data lines of the response are kept as an item map keyed by
/// the response-item name (`FLAGS`, `UIDVALIDITY`, `EXISTS`, ...); the typed
/// accessors below read the common items out of it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mailbox {
    pub header: ResponseHeader,
    /// The selected mailbox, as named on the command line (quotes stripped).
    pub name: String,
    /// The bracketed access qualifier of the tagged reply: `READ-ONLY` or
    /// `READ-WRITE`. Empty if the server sent neither.
    pub access: String,
    /// Response-item name to value.
    pub items: HashMap<String, String>,
}

impl Mailbox {
    /// The mailbox was selected read-only.
    pub fn is_read_only(&self) -> bool {
        self.access.eq_ignore_ascii_case("READ-ONLY")
    }

    /// The number of messages in the mailbox, from the untagged `EXISTS` line.
    pub fn exists(&self) -> Option<u64> {
        self.number("EXISTS")
    }

    /// The number of messages with `\Recent` set.
    pub fn recent(&self) -> Option<u64> {
        self.number("RECENT")
    }

    /// Sequence number of the first unseen message.
    pub fn unseen(&self) -> Option<u64> {
        self.number("UNSEEN")
    }

    /// The unique identifier validity value.
    pub fn uid_validity(&self) -> Option<u64> {
        self.number("UIDVALIDITY")
    }

    /// The next unique identifier value.
    pub fn uid_next(&self) -> Option<u64> {
        self.number("UIDNEXT")
    }

    /// The highest mod-sequence, when the server supports
    /// [CONDSTORE](https://tools.ietf.org/html/rfc4551#section-3.1.1).
    pub fn highest_mod_seq(&self) -> Option<u64> {
        self.number("HIGHESTMODSEQ")
    }

    /// The parenthesised flag list defined in the mailbox.
    pub fn flags(&self) -> Option<&str> {
        self.items.get("FLAGS").map(String::as_str)
    }

    /// The parenthesised list of flags the client can change permanently.
    pub fn permanent_flags(&self) -> Option<&str> {
        self.items.get("PERMANENTFLAGS").map(String::as_str)
    }

    /// Capabilities announced inline during selection, if any.
    pub fn capability(&self) -> Option<&str> {
        self.items.get("CAPABILITY").map(String::as_str)
    }

    fn number(&self, item: &str) -> Option<u64> {
        self.items.get(item).and_then(|v| v.parse().ok())
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] exists: {:?}, recent: {:?}, unseen: {:?}, uid_validity: {:?}, uid_next: {:?}",
            self.name,
            self.access,
            self.exists(),
            self.recent(),
            self.unseen(),
            self.uid_validity(),
            self.uid_next(),
        )
    }
}
