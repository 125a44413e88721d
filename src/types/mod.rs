//! Typed command responses produced by [`parse_response`](crate::parse::parse_response).
//!
//! Every response carries a [`ResponseHeader`] with the completion status,
//! the server's message for `NO`/`BAD` replies, and whether an untagged
//! `BYE` was seen during the exchange. The [`Response`] sum type adds the
//! command-specific payload on top.

use std::collections::HashMap;

use crate::command::Command;

mod fetch;
pub use self::fetch::{FetchEntry, FetchValue};

mod mailbox;
pub use self::mailbox::Mailbox;

mod name;
pub use self::name::Name;

/// Completion status of a tagged command, from section
/// [7.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.1).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    /// The command completed successfully.
    Ok,
    /// The command failed for an operational reason.
    No,
    /// The server rejected the command as invalid.
    Bad,
}

/// Fields common to every parsed response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseHeader {
    /// The command this response answers.
    pub command: Command,
    /// Completion status of the tagged reply.
    pub status: Status,
    /// The full status line for `NO`/`BAD` replies, or the `BYE` line when one
    /// was seen. `None` on a plain `OK`.
    pub message: Option<String>,
    /// Whether the server sent an untagged `BYE` during the exchange. Once
    /// set this stays set for the response value; the caller decides whether
    /// to treat the session as closed.
    pub bye_seen: bool,
}

impl ResponseHeader {
    /// True if the tagged reply was `OK`.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Message indices or UIDs reported by `SEARCH`, in server order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchResult {
    pub header: ResponseHeader,
    /// Indices (or UIDs for `UID SEARCH`), in the order the server sent them.
    pub ids: Vec<u64>,
}

/// The mailboxes matched by a `LIST` or `LSUB` command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MailboxList {
    pub header: ResponseHeader,
    pub entries: Vec<Name>,
}

/// The per-item counters returned by `STATUS`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MailboxStatus {
    pub header: ResponseHeader,
    /// The mailbox the counters describe.
    pub mailbox: String,
    /// Item name (`MESSAGES`, `UIDNEXT`, ...) to value, as sent.
    pub items: HashMap<String, String>,
}

impl MailboxStatus {
    /// Numeric value of a status item, if present and numeric.
    pub fn get(&self, item: &str) -> Option<u64> {
        self.items.get(item).and_then(|v| v.parse().ok())
    }
}

/// Mailbox changes reported while expunging.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExpungeResult {
    pub header: ResponseHeader,
    /// Values of untagged `EXISTS` lines, in order.
    pub exists: Vec<u64>,
    /// Message sequence numbers from untagged `EXPUNGE` lines, in order.
    pub expunged: Vec<u64>,
}

/// One `* <n> FETCH (FLAGS ...)` line echoed back by `STORE`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreUpdate {
    /// Message sequence number.
    pub index: u64,
    /// The parenthesised flag list now set on the message.
    pub flags: String,
}

/// The flag updates confirmed by a `STORE` command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreResult {
    pub header: ResponseHeader,
    pub updates: Vec<StoreUpdate>,
}

/// The capability listing from a `CAPABILITY` command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CapabilityList {
    pub header: ResponseHeader,
    /// Space-separated capability atoms, as sent by the server.
    pub capabilities: String,
}

impl CapabilityList {
    /// Whether the server advertised the given capability.
    pub fn has(&self, capability: &str) -> bool {
        self.capabilities
            .split_whitespace()
            .any(|c| c.eq_ignore_ascii_case(capability))
    }
}

/// Untagged lines captured verbatim, for `NOOP`, `IDLE` and `LOGOUT`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawLines {
    pub header: ResponseHeader,
    /// Every untagged line of the response, in order, without line terminators.
    pub lines: Vec<String>,
}

/// The per-message item maps produced by `FETCH` or `UID FETCH`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchResult {
    pub header: ResponseHeader,
    pub messages: Vec<FetchEntry>,
}

/// A parsed command response.
///
/// The variant is determined by the command the response answers; commands
/// with no payload of their own (`CREATE`, `CHECK`, `COPY`, ...) parse to
/// [`Response::Simple`]. Pattern matching on the variant replaces the
/// downcasts a class hierarchy would need.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// `SELECT` or `EXAMINE`.
    Select(Mailbox),
    /// `SEARCH` or `UID SEARCH`.
    Search(SearchResult),
    /// `LIST` or `LSUB`.
    List(MailboxList),
    /// `STATUS`.
    Status(MailboxStatus),
    /// `EXPUNGE`.
    Expunge(ExpungeResult),
    /// `STORE` or `UID STORE`.
    Store(StoreResult),
    /// `CAPABILITY`.
    Capability(CapabilityList),
    /// `NOOP` or `IDLE`.
    Untagged(RawLines),
    /// `FETCH` or `UID FETCH`.
    Fetch(FetchResult),
    /// `LOGOUT`.
    Logout(RawLines),
    /// Any command without a dedicated parse routine.
    Simple(ResponseHeader),
}

impl Response {
    /// The header shared by every response kind.
    pub fn header(&self) -> &ResponseHeader {
        match self {
            Response::Select(r) => &r.header,
            Response::Search(r) => &r.header,
            Response::List(r) => &r.header,
            Response::Status(r) => &r.header,
            Response::Expunge(r) => &r.header,
            Response::Store(r) => &r.header,
            Response::Capability(r) => &r.header,
            Response::Untagged(r) => &r.header,
            Response::Fetch(r) => &r.header,
            Response::Logout(r) => &r.header,
            Response::Simple(h) => h,
        }
    }

    /// Completion status of the tagged reply.
    pub fn status(&self) -> Status {
        self.header().status
    }

    /// Whether an untagged `BYE` arrived during this exchange.
    pub fn bye_seen(&self) -> bool {
        self.header().bye_seen
    }

    /// The server's message for `NO`/`BAD`/`BYE` replies.
    pub fn message(&self) -> Option<&str> {
        self.header().message.as_deref()
    }
}
