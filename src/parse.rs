//! Parsing of raw command-response blobs into [`Response`] values.
//!
//! The parser expects syntactically correct responses from the server and
//! does not try to recover from malformed ones: the first line that fits
//! neither the dispatched command's payload grammar nor a recognised status
//! form aborts with a [`ParseError`] carrying that line verbatim.
//!
//! Commands may be sent in any mix of case and servers mirror that case
//! back, so every protocol-token comparison here is case-insensitive.

use std::str;

use log::warn;

use crate::command::Command;
use crate::error::{Error, ParseError, Result};
use crate::types::*;

/// Parse the raw response `blob` collected for `command_line`.
///
/// `command_line` is the full tagged line that was sent (e.g.
/// `A0001 SELECT INBOX`); the verb decides which parse routine runs, with
/// `UID <verb>` dispatching as `<verb>`. Verbs without a dedicated routine
/// get plain status parsing.
///
/// ```
/// use imapkit::parse::parse_response;
/// use imapkit::types::Response;
///
/// let blob = b"* SEARCH 2 84 882\r\nA0002 OK SEARCH completed\r\n";
/// match parse_response("A0002 SEARCH TEXT \"rust\"", blob).unwrap() {
///     Response::Search(r) => assert_eq!(r.ids, vec![2, 84, 882]),
///     other => panic!("unexpected response: {:?}", other),
/// }
/// ```
pub fn parse_response(command_line: &str, blob: &[u8]) -> Result<Response> {
    let tag = command_line
        .split(' ')
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Parse(ParseError::Unexpected(command_line.to_string())))?;
    let command = Command::of_line(command_line)
        .ok_or_else(|| Error::Parse(ParseError::Unexpected(command_line.to_string())))?;

    let response = match command {
        Command::Select | Command::Examine => parse_select(command, command_line, tag, blob)?,
        Command::Search => parse_search(command, tag, blob)?,
        Command::List | Command::Lsub => parse_list(command, tag, blob)?,
        Command::Status => parse_status(command, tag, blob)?,
        Command::Expunge => parse_expunge(command, tag, blob)?,
        Command::Store => parse_store(command, tag, blob)?,
        Command::Capability => parse_capability(command, tag, blob)?,
        Command::Noop | Command::Idle => parse_noop(command, tag, blob)?,
        Command::Fetch => parse_fetch(command, tag, blob)?,
        Command::Logout => parse_logout(command, tag, blob)?,
        _ => parse_default(command, tag, blob)?,
    };
    Ok(response)
}

// ---------------------------------------------------------------------------
// Status-line recognition, shared by every routine.
// ---------------------------------------------------------------------------

/// Accumulates the status-line side of a response while a routine consumes
/// the payload lines. `bye_seen` is monotonic: once an untagged `BYE` has
/// been absorbed it stays set.
#[derive(Default)]
struct StatusTracker {
    status: Option<Status>,
    message: Option<String>,
    bye_seen: bool,
}

impl StatusTracker {
    /// Classify a line that was not consumed as command payload.
    ///
    /// Untagged `NO`/`BAD` lines are logged and skipped; anything that is
    /// neither a tagged status nor `BYE`/`NO`/`BAD` fails the parse.
    fn absorb(&mut self, tag: &str, line: &str) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }
        if let Some(status) = tagged_status(line, tag) {
            self.status = Some(status);
            if status != Status::Ok {
                self.message = Some(line.to_string());
            }
        } else if untagged_word(line, "BYE") {
            self.bye_seen = true;
            self.message = Some(line.to_string());
        } else if untagged_word(line, "NO") || untagged_word(line, "BAD") {
            warn!("untagged error response: {}", line);
        } else {
            return Err(Error::Parse(ParseError::Unexpected(line.to_string())));
        }
        Ok(())
    }

    fn is_ok(&self) -> bool {
        self.status == Some(Status::Ok)
    }

    /// A response must end with a tagged status; a blob without one is a
    /// framing failure, never a silently unset status.
    fn finish(self, command: Command) -> Result<ResponseHeader> {
        match self.status {
            Some(status) => Ok(ResponseHeader {
                command,
                status,
                message: self.message,
                bye_seen: self.bye_seen,
            }),
            None => Err(Error::Parse(ParseError::MissingStatus)),
        }
    }
}

/// `<tag> OK|NO|BAD ...`, case-insensitive, word-bounded.
fn tagged_status(line: &str, tag: &str) -> Option<Status> {
    if !starts_with_ignore_case(line, tag) {
        return None;
    }
    let rest = &line[tag.len()..];
    if !rest.starts_with(' ') {
        return None;
    }
    let rest = &rest[1..];
    for &(word, status) in &[
        ("OK", Status::Ok),
        ("NO", Status::No),
        ("BAD", Status::Bad),
    ] {
        if starts_with_ignore_case(rest, word)
            && rest.as_bytes().get(word.len()).map_or(true, |&b| b == b' ')
        {
            return Some(status);
        }
    }
    None
}

/// `* <word> ...`, case-insensitive, word-bounded.
fn untagged_word(line: &str, word: &str) -> bool {
    if !line.starts_with("* ") {
        return false;
    }
    let rest = &line[2..];
    starts_with_ignore_case(rest, word)
        && rest.as_bytes().get(word.len()).map_or(true, |&b| b == b' ')
}

// ---------------------------------------------------------------------------
// String helpers. All token matching in this crate goes through these so the
// case-insensitivity rules cannot drift between routines.
// ---------------------------------------------------------------------------

pub(crate) fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    let line = line.as_bytes();
    let prefix = prefix.as_bytes();
    line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Position of `token` in `line` as a whole word (not embedded in a longer
/// atom, so `FLAGS` does not match inside `PERMANENTFLAGS`).
fn token_position(line: &str, token: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let token = token.as_bytes();
    if token.is_empty() || bytes.len() < token.len() {
        return None;
    }
    for i in 0..=bytes.len() - token.len() {
        if bytes[i..i + token.len()].eq_ignore_ascii_case(token) {
            let before = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
            let after = i + token.len() == bytes.len()
                || !bytes[i + token.len()].is_ascii_alphanumeric();
            if before && after {
                return Some(i);
            }
        }
    }
    None
}

/// The contents between the first `first` and the following `last`.
fn string_between(line: &str, first: char, last: char) -> Option<&str> {
    let start = line.find(first)? + first.len_utf8();
    let end = start + line[start..].find(last)?;
    Some(&line[start..end])
}

/// The first balanced parenthesised list on the line, parens included.
fn balanced_list(line: &str) -> Option<&str> {
    let start = line.find('(')?;
    let mut depth = 0usize;
    for (i, b) in line.bytes().enumerate().skip(start) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&line[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// The number that opens an untagged line, e.g. `172` in `* 172 EXISTS`.
fn untagged_number(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("* ")?.trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or_else(|| rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

/// The digit run following `token`, e.g. `4392` in `UIDNEXT 4392]`.
fn number_after_token<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let pos = token_position(line, token)?;
    let rest = line[pos + token.len()..].trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or_else(|| rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

/// Everything after `token` and one separating space.
fn text_after_token<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let pos = token_position(line, token)?;
    Some(line[pos + token.len()..].trim_start())
}

// ---------------------------------------------------------------------------
// Transport-level helpers. The transport needs just enough of the grammar to
// frame a response: the tagged terminator and `{N}` literal announcements.
// ---------------------------------------------------------------------------

/// Whether a raw line (terminator included) is the tagged `OK`/`NO`/`BAD`
/// line that completes the response for `tag`.
pub(crate) fn is_tagged_status_line(line: &[u8], tag: &str) -> bool {
    let tag = tag.as_bytes();
    if line.len() <= tag.len()
        || !line[..tag.len()].eq_ignore_ascii_case(tag)
        || line[tag.len()] != b' '
    {
        return false;
    }
    let rest = &line[tag.len() + 1..];
    for word in &[&b"OK"[..], b"NO", b"BAD"] {
        if rest.len() >= word.len() && rest[..word.len()].eq_ignore_ascii_case(word) {
            match rest.get(word.len()) {
                None | Some(b' ') | Some(b'\r') | Some(b'\n') => return true,
                _ => {}
            }
        }
    }
    false
}

/// The octet count of a `{N}` literal announced on the tail of a raw line,
/// if the line announces one.
pub(crate) fn literal_octets(line: &[u8]) -> Option<usize> {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    let line = &line[..end];
    if !line.ends_with(b"}") {
        return None;
    }
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..line.len() - 1];
    if digits.is_empty() || !digits.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    str::from_utf8(digits).ok()?.parse().ok()
}

// ---------------------------------------------------------------------------
// Blob cursor. Responses are processed line by line, except that FETCH
// literals interrupt line framing and are consumed byte-exact.
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    blob: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(blob: &'a [u8]) -> Cursor<'a> {
        Cursor { blob, pos: 0 }
    }

    /// The next line, with the trailing CR LF stripped.
    fn next_line(&mut self) -> Option<Result<&'a str>> {
        if self.pos >= self.blob.len() {
            return None;
        }
        let start = self.pos;
        let (mut end, next) = match self.blob[start..].iter().position(|&b| b == b'\n') {
            Some(i) => (start + i, start + i + 1),
            None => (self.blob.len(), self.blob.len()),
        };
        self.pos = next;
        if end > start && self.blob[end - 1] == b'\r' {
            end -= 1;
        }
        let raw = &self.blob[start..end];
        Some(
            str::from_utf8(raw)
                .map_err(|e| Error::Parse(ParseError::DataNotUtf8(raw.to_vec(), e))),
        )
    }

    /// Exactly `n` raw octets, starting right after the most recent line.
    fn read_literal(&mut self, n: usize, context: &str) -> Result<&'a [u8]> {
        if self.pos + n > self.blob.len() {
            return Err(Error::Parse(ParseError::TruncatedLiteral(
                context.to_string(),
            )));
        }
        let octets = &self.blob[self.pos..self.pos + n];
        self.pos += n;
        Ok(octets)
    }
}

// ---------------------------------------------------------------------------
// Per-command routines.
// ---------------------------------------------------------------------------

/// SELECT and EXAMINE. The mailbox name comes from the command line; the
/// untagged data lines fill the item map and the tagged `OK` line carries the
/// bracketed access qualifier.
fn parse_select(
    command: Command,
    command_line: &str,
    tag: &str,
    blob: &[u8],
) -> Result<Response> {
    let name = command_line
        .split_whitespace()
        .last()
        .unwrap_or("")
        .trim_matches('"')
        .to_string();

    let mut tracker = StatusTracker::default();
    let mut access = String::new();
    let mut items = std::collections::HashMap::new();

    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        let line = line?;
        // Response codes arrive as `* OK [UIDNEXT 4392] ...`; work on the
        // bracketed part for those.
        let content = if starts_with_ignore_case(line, "* OK [") {
            string_between(line, '[', ']').unwrap_or(line)
        } else {
            line
        };

        if token_position(content, "FLAGS").is_some() {
            let list = balanced_list(content)
                .ok_or_else(|| Error::Parse(ParseError::UnclosedList(line.to_string())))?;
            items.insert("FLAGS".to_string(), list.to_string());
        } else if token_position(content, "PERMANENTFLAGS").is_some() {
            let list = balanced_list(content)
                .ok_or_else(|| Error::Parse(ParseError::UnclosedList(line.to_string())))?;
            items.insert("PERMANENTFLAGS".to_string(), list.to_string());
        } else if let Some(n) = number_after_token(content, "UIDVALIDITY") {
            items.insert("UIDVALIDITY".to_string(), n.to_string());
        } else if let Some(n) = number_after_token(content, "UIDNEXT") {
            items.insert("UIDNEXT".to_string(), n.to_string());
        } else if let Some(n) = number_after_token(content, "HIGHESTMODSEQ") {
            items.insert("HIGHESTMODSEQ".to_string(), n.to_string());
        } else if let Some(caps) = text_after_token(content, "CAPABILITY") {
            items.insert("CAPABILITY".to_string(), caps.to_string());
        } else if let Some(n) = number_after_token(content, "UNSEEN") {
            items.insert("UNSEEN".to_string(), n.to_string());
        } else if token_position(content, "EXISTS").is_some() {
            if let Some(n) = untagged_number(line) {
                items.insert("EXISTS".to_string(), n.to_string());
            }
        } else if token_position(content, "RECENT").is_some() {
            if let Some(n) = untagged_number(line) {
                items.insert("RECENT".to_string(), n.to_string());
            }
        } else {
            tracker.absorb(tag, line)?;
            if tracker.is_ok() && access.is_empty() {
                if let Some(qualifier) = string_between(line, '[', ']') {
                    access = qualifier.to_string();
                }
            }
        }
    }

    Ok(Response::Select(Mailbox {
        header: tracker.finish(command)?,
        name,
        access,
        items,
    }))
}

/// SEARCH. Indices accumulate across `* SEARCH` lines in server order.
fn parse_search(command: Command, tag: &str, blob: &[u8]) -> Result<Response> {
    let mut tracker = StatusTracker::default();
    let mut ids = Vec::new();

    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        let line = line?;
        if untagged_word(line, "SEARCH") {
            for word in line["* SEARCH".len()..].split_whitespace() {
                let id = word
                    .parse()
                    .map_err(|_| Error::Parse(ParseError::Unexpected(line.to_string())))?;
                ids.push(id);
            }
        } else {
            tracker.absorb(tag, line)?;
        }
    }

    Ok(Response::Search(SearchResult {
        header: tracker.finish(command)?,
        ids,
    }))
}

/// LIST and LSUB. One entry per untagged line: attribute list, hierarchy
/// delimiter, mailbox name (quoted names keep their quotes).
fn parse_list(command: Command, tag: &str, blob: &[u8]) -> Result<Response> {
    let mut tracker = StatusTracker::default();
    let mut entries = Vec::new();

    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        let line = line?;
        if untagged_word(line, "LIST") || untagged_word(line, "LSUB") {
            let attributes = balanced_list(line)
                .ok_or_else(|| Error::Parse(ParseError::UnclosedList(line.to_string())))?;
            let after = &line[line.find(attributes).unwrap_or(0) + attributes.len()..];
            let after = after.trim_start();
            let delimiter = if after.starts_with('"') {
                after[1..].chars().next().filter(|&c| c != '"')
            } else {
                // RFC 3501 allows NIL for flat namespaces
                None
            };
            let name = if line.ends_with('"') {
                match line[..line.len() - 1].rfind('"') {
                    Some(open) => line[open..].to_string(),
                    None => line.to_string(),
                }
            } else {
                line.rsplit(' ').next().unwrap_or("").to_string()
            };
            entries.push(Name::new(attributes.to_string(), delimiter, name));
        } else {
            tracker.absorb(tag, line)?;
        }
    }

    Ok(Response::List(MailboxList {
        header: tracker.finish(command)?,
        entries,
    }))
}

/// STATUS. `* STATUS <mailbox> (KEY VAL KEY VAL ...)`.
fn parse_status(command: Command, tag: &str, blob: &[u8]) -> Result<Response> {
    let mut tracker = StatusTracker::default();
    let mut mailbox = String::new();
    let mut items = std::collections::HashMap::new();

    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        let line = line?;
        if untagged_word(line, "STATUS") {
            let rest = line["* STATUS".len()..].trim_start();
            let after = if rest.starts_with('"') {
                match rest[1..].find('"') {
                    Some(end) => {
                        mailbox = rest[1..=end].to_string();
                        &rest[end + 2..]
                    }
                    None => rest,
                }
            } else {
                match rest.find(' ') {
                    Some(i) => {
                        mailbox = rest[..i].to_string();
                        &rest[i..]
                    }
                    None => rest,
                }
            };
            let list = balanced_list(after)
                .ok_or_else(|| Error::Parse(ParseError::UnclosedList(line.to_string())))?;
            let mut words = list[1..list.len() - 1].split_whitespace();
            while let (Some(item), Some(value)) = (words.next(), words.next()) {
                items.insert(item.to_string(), value.to_string());
            }
        } else {
            tracker.absorb(tag, line)?;
        }
    }

    Ok(Response::Status(MailboxStatus {
        header: tracker.finish(command)?,
        mailbox,
        items,
    }))
}

/// EXPUNGE. Untagged `EXISTS` and `EXPUNGE` lines carry the number before
/// the keyword.
fn parse_expunge(command: Command, tag: &str, blob: &[u8]) -> Result<Response> {
    let mut tracker = StatusTracker::default();
    let mut exists = Vec::new();
    let mut expunged = Vec::new();

    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        let line = line?;
        let number = untagged_number(line).and_then(|n| n.parse().ok());
        match number {
            Some(n) if token_position(line, "EXISTS").is_some() => exists.push(n),
            Some(n) if token_position(line, "EXPUNGE").is_some() => expunged.push(n),
            _ => tracker.absorb(tag, line)?,
        }
    }

    Ok(Response::Expunge(ExpungeResult {
        header: tracker.finish(command)?,
        exists,
        expunged,
    }))
}

/// STORE. Every untagged `FETCH` line echoes the message index and its new
/// flag list.
fn parse_store(command: Command, tag: &str, blob: &[u8]) -> Result<Response> {
    let mut tracker = StatusTracker::default();
    let mut updates = Vec::new();

    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        let line = line?;
        if line.starts_with("* ") && token_position(line, "FETCH").is_some() {
            let index = untagged_number(line)
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| Error::Parse(ParseError::Unexpected(line.to_string())))?;
            let flags_at = token_position(line, "FLAGS")
                .ok_or_else(|| Error::Parse(ParseError::Unexpected(line.to_string())))?;
            let flags = balanced_list(&line[flags_at..])
                .ok_or_else(|| Error::Parse(ParseError::UnclosedList(line.to_string())))?;
            updates.push(StoreUpdate {
                index,
                flags: flags.to_string(),
            });
        } else {
            tracker.absorb(tag, line)?;
        }
    }

    Ok(Response::Store(StoreResult {
        header: tracker.finish(command)?,
        updates,
    }))
}

/// CAPABILITY. The remainder after `* CAPABILITY `, concatenated should the
/// server split it over several lines.
fn parse_capability(command: Command, tag: &str, blob: &[u8]) -> Result<Response> {
    let mut tracker = StatusTracker::default();
    let mut capabilities = String::new();

    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        let line = line?;
        if untagged_word(line, "CAPABILITY") {
            let caps = line["* CAPABILITY".len()..].trim_start();
            if !capabilities.is_empty() {
                capabilities.push(' ');
            }
            capabilities.push_str(caps);
        } else {
            tracker.absorb(tag, line)?;
        }
    }

    Ok(Response::Capability(CapabilityList {
        header: tracker.finish(command)?,
        capabilities,
    }))
}

/// NOOP and IDLE. Untagged lines are kept verbatim; interpreting them is
/// the caller's business.
fn parse_noop(command: Command, tag: &str, blob: &[u8]) -> Result<Response> {
    let mut tracker = StatusTracker::default();
    let mut lines = Vec::new();

    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        let line = line?;
        if line.starts_with("* ") {
            lines.push(line.to_string());
        } else {
            tracker.absorb(tag, line)?;
        }
    }

    Ok(Response::Untagged(RawLines {
        header: tracker.finish(command)?,
        lines,
    }))
}

/// LOGOUT. The untagged `BYE` is captured and flagged; the tagged reply
/// completes as usual.
fn parse_logout(command: Command, tag: &str, blob: &[u8]) -> Result<Response> {
    let mut tracker = StatusTracker::default();
    let mut lines = Vec::new();

    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        let line = line?;
        if untagged_word(line, "BYE") {
            tracker.bye_seen = true;
            tracker.message = Some(line.to_string());
            lines.push(line.to_string());
        } else {
            tracker.absorb(tag, line)?;
        }
    }

    Ok(Response::Logout(RawLines {
        header: tracker.finish(command)?,
        lines,
    }))
}

/// Plain status parsing for commands without payload.
fn parse_default(command: Command, tag: &str, blob: &[u8]) -> Result<Response> {
    let mut tracker = StatusTracker::default();
    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        tracker.absorb(tag, line?)?;
    }
    Ok(Response::Simple(tracker.finish(command)?))
}

// ---------------------------------------------------------------------------
// FETCH. The only routine where lines join up: a `{N}` literal interrupts
// line framing, so the item loop tracks a column cursor within the current
// physical line and pulls literal octets straight from the blob.
// ---------------------------------------------------------------------------

fn parse_fetch(command: Command, tag: &str, blob: &[u8]) -> Result<Response> {
    let mut tracker = StatusTracker::default();
    let mut messages = Vec::new();

    let mut cursor = Cursor::new(blob);
    while let Some(line) = cursor.next_line() {
        let line = line?;
        if line.starts_with("* ") && token_position(line, "FETCH").is_some() && line.contains('(')
        {
            messages.push(parse_fetch_entry(line, &mut cursor)?);
        } else {
            tracker.absorb(tag, line)?;
        }
    }

    Ok(Response::Fetch(FetchResult {
        header: tracker.finish(command)?,
        messages,
    }))
}

fn parse_fetch_entry<'a>(first_line: &'a str, cursor: &mut Cursor<'a>) -> Result<FetchEntry> {
    let index = untagged_number(first_line)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| Error::Parse(ParseError::Unexpected(first_line.to_string())))?;
    let mut entry = FetchEntry::new(index);

    let mut line = first_line;
    let mut col = line.find('(').map(|i| i + 1).unwrap_or_else(|| line.len());

    loop {
        while line[col..].starts_with(' ') {
            col += 1;
        }
        if col >= line.len() {
            // residual line exhausted, keep going on the next one
            line = match cursor.next_line() {
                Some(l) => l?,
                None => {
                    return Err(Error::Parse(ParseError::UnclosedList(
                        first_line.to_string(),
                    )))
                }
            };
            col = 0;
            continue;
        }
        let rest = &line[col..];
        if rest.starts_with(')') {
            break;
        }

        if starts_with_ignore_case(rest, "BODYSTRUCTURE ") {
            col = take_list(&mut entry, "BODYSTRUCTURE", line, col + 14)?;
        } else if starts_with_ignore_case(rest, "ENVELOPE ") {
            col = take_list(&mut entry, "ENVELOPE", line, col + 9)?;
        } else if starts_with_ignore_case(rest, "FLAGS ") {
            col = take_list(&mut entry, "FLAGS", line, col + 6)?;
        } else if starts_with_ignore_case(rest, "BODY ") {
            col = take_list(&mut entry, "BODY", line, col + 5)?;
        } else if starts_with_ignore_case(rest, "INTERNALDATE ") {
            col = take_quoted(&mut entry, "INTERNALDATE", line, col + 13)?;
        } else if starts_with_ignore_case(rest, "RFC822.SIZE ") {
            col = take_number(&mut entry, "RFC822.SIZE", line, col + 12)?;
        } else if starts_with_ignore_case(rest, "UID ") {
            col = take_number(&mut entry, "UID", line, col + 4)?;
        } else if starts_with_ignore_case(rest, "RFC822.HEADER ") {
            line = take_literal(&mut entry, line, col + "RFC822.HEADER".len(), cursor)?;
            col = 0;
        } else if starts_with_ignore_case(rest, "BODY[") {
            let close = rest
                .find(']')
                .ok_or_else(|| Error::Parse(ParseError::Unexpected(line.to_string())))?;
            line = take_literal(&mut entry, line, col + close + 1, cursor)?;
            col = 0;
        } else if starts_with_ignore_case(rest, "RFC822 ") {
            line = take_literal(&mut entry, line, col + "RFC822".len(), cursor)?;
            col = 0;
        } else {
            return Err(Error::Parse(ParseError::UnknownFetchItem(line.to_string())));
        }
    }

    Ok(entry)
}

/// Balanced-paren extraction; the list is recorded as one string including
/// the surrounding parens.
fn take_list(entry: &mut FetchEntry, key: &str, line: &str, after: usize) -> Result<usize> {
    let slice = &line[after..];
    let list = balanced_list(slice)
        .ok_or_else(|| Error::Parse(ParseError::UnclosedList(line.to_string())))?;
    let open = slice.find('(').unwrap_or(0);
    entry.insert(key.to_string(), FetchValue::Text(list.to_string()));
    Ok(after + open + list.len())
}

/// The characters between the next two quote marks, requoted.
fn take_quoted(entry: &mut FetchEntry, key: &str, line: &str, after: usize) -> Result<usize> {
    let slice = &line[after..];
    let open = slice
        .find('"')
        .ok_or_else(|| Error::Parse(ParseError::Unexpected(line.to_string())))?;
    let inner_len = slice[open + 1..]
        .find('"')
        .ok_or_else(|| Error::Parse(ParseError::Unexpected(line.to_string())))?;
    let inner = &slice[open + 1..open + 1 + inner_len];
    entry.insert(
        key.to_string(),
        FetchValue::Text(format!("\"{}\"", inner)),
    );
    Ok(after + open + inner_len + 2)
}

/// The run of decimal digits following the item token.
fn take_number(entry: &mut FetchEntry, key: &str, line: &str, after: usize) -> Result<usize> {
    let slice = &line[after..];
    let skipped = slice.len() - slice.trim_start().len();
    let digits_len = slice[skipped..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or_else(|| slice.len() - skipped);
    if digits_len == 0 {
        return Err(Error::Parse(ParseError::Unexpected(line.to_string())));
    }
    let digits = &slice[skipped..skipped + digits_len];
    entry.insert(key.to_string(), FetchValue::Text(digits.to_string()));
    Ok(after + skipped + digits_len)
}

/// A `{N}` literal block. The map key is the whole prefix line up to and
/// including the item token, so several literal-valued items in one FETCH
/// stay distinguishable. Returns the residual line that follows the literal.
fn take_literal<'a>(
    entry: &mut FetchEntry,
    line: &'a str,
    token_end: usize,
    cursor: &mut Cursor<'a>,
) -> Result<&'a str> {
    let label = &line[..token_end];
    let count = string_between(&line[token_end..], '{', '}')
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| Error::Parse(ParseError::Unexpected(line.to_string())))?;
    let octets = cursor.read_literal(count, label)?;
    entry.insert(label.to_string(), FetchValue::Literal(octets.to_vec()));
    match cursor.next_line() {
        Some(l) => l,
        None => Err(Error::Parse(ParseError::UnclosedList(line.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(command_line: &str, blob: &[u8]) -> Response {
        parse_response(command_line, blob).unwrap()
    }

    #[test]
    fn select_full_state() {
        let blob = b"* 172 EXISTS\r\n\
            * 1 RECENT\r\n\
            * OK [UNSEEN 12]\r\n\
            * OK [UIDVALIDITY 3857529045]\r\n\
            * OK [UIDNEXT 4392]\r\n\
            * FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n\
            A0001 OK [READ-WRITE] SELECT completed\r\n";
        let mailbox = match parse("A0001 SELECT INBOX", blob) {
            Response::Select(m) => m,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(mailbox.header.status, Status::Ok);
        assert_eq!(mailbox.name, "INBOX");
        assert_eq!(mailbox.access, "READ-WRITE");
        assert!(!mailbox.is_read_only());
        assert_eq!(mailbox.exists(), Some(172));
        assert_eq!(mailbox.recent(), Some(1));
        assert_eq!(mailbox.unseen(), Some(12));
        assert_eq!(mailbox.uid_validity(), Some(3857529045));
        assert_eq!(mailbox.uid_next(), Some(4392));
        assert_eq!(
            mailbox.flags(),
            Some("(\\Answered \\Flagged \\Deleted \\Seen \\Draft)")
        );
    }

    #[test]
    fn examine_is_read_only() {
        let blob = b"* 3 EXISTS\r\n\
            * 0 RECENT\r\n\
            * OK [PERMANENTFLAGS ()] No permanent flags permitted\r\n\
            * OK [HIGHESTMODSEQ 715194045007]\r\n\
            A0002 OK [READ-ONLY] EXAMINE completed\r\n";
        let mailbox = match parse("A0002 EXAMINE \"blurdybloop\"", blob) {
            Response::Select(m) => m,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(mailbox.header.command, crate::command::Command::Examine);
        assert_eq!(mailbox.name, "blurdybloop");
        assert!(mailbox.is_read_only());
        assert_eq!(mailbox.permanent_flags(), Some("()"));
        assert_eq!(mailbox.highest_mod_seq(), Some(715194045007));
    }

    #[test]
    fn select_with_inline_capability() {
        let blob = b"* 1 EXISTS\r\n\
            * OK [CAPABILITY IMAP4rev1 UIDPLUS]\r\n\
            A0003 OK [READ-WRITE] done\r\n";
        let mailbox = match parse("A0003 SELECT INBOX", blob) {
            Response::Select(m) => m,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(mailbox.capability(), Some("IMAP4rev1 UIDPLUS"));
    }

    #[test]
    fn search_collects_indices_in_order() {
        let blob = b"* SEARCH 2 84 882\r\nA0002 OK SEARCH completed\r\n";
        match parse("A0002 SEARCH TEXT \"string not in mailbox\"", blob) {
            Response::Search(r) => {
                assert_eq!(r.header.status, Status::Ok);
                assert_eq!(r.ids, vec![2, 84, 882]);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn search_empty_and_multi_line() {
        let blob = b"* SEARCH\r\nA0002 OK SEARCH completed\r\n";
        match parse("A0002 SEARCH UNSEEN", blob) {
            Response::Search(r) => assert!(r.ids.is_empty()),
            other => panic!("unexpected response: {:?}", other),
        }

        let blob = b"* SEARCH 23 42\r\n* SEARCH 4711\r\nA0003 OK done\r\n";
        match parse("A0003 UID SEARCH ALL", blob) {
            Response::Search(r) => assert_eq!(r.ids, vec![23, 42, 4711]),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn list_quoted_and_atom_names() {
        let blob = b"* LIST (\\HasNoChildren) \".\" \"INBOX\"\r\n\
            * LIST (\\Noselect) \"/\" foo\r\n\
            A0004 OK LIST completed\r\n";
        let list = match parse("A0004 LIST \"\" *", blob) {
            Response::List(l) => l,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(list.entries.len(), 2);
        assert_eq!(list.entries[0].attributes(), "(\\HasNoChildren)");
        assert_eq!(list.entries[0].delimiter(), Some('.'));
        assert_eq!(list.entries[0].name(), "\"INBOX\"");
        assert_eq!(list.entries[0].name_unquoted(), "INBOX");
        assert_eq!(list.entries[1].delimiter(), Some('/'));
        assert_eq!(list.entries[1].name(), "foo");
    }

    #[test]
    fn lsub_entries() {
        let blob = b"* LSUB () \".\" #news.comp.mail.mime\r\nA0005 OK LSUB completed\r\n";
        let list = match parse("A0005 LSUB \"#news.\" \"comp.mail.*\"", blob) {
            Response::List(l) => l,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(list.entries.len(), 1);
        assert_eq!(list.entries[0].name(), "#news.comp.mail.mime");
    }

    #[test]
    fn status_counters() {
        let blob = b"* STATUS INBOX (MESSAGES 231 UIDNEXT 44292)\r\nA0004 OK STATUS completed\r\n";
        let status = match parse("A0004 STATUS INBOX (MESSAGES UIDNEXT)", blob) {
            Response::Status(s) => s,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(status.mailbox, "INBOX");
        assert_eq!(status.get("MESSAGES"), Some(231));
        assert_eq!(status.get("UIDNEXT"), Some(44292));
        assert_eq!(status.get("RECENT"), None);
    }

    #[test]
    fn expunge_sequences() {
        let blob = b"* 3 EXPUNGE\r\n* 3 EXPUNGE\r\n* 5 EXPUNGE\r\n* 8 EXISTS\r\n\
            A0006 OK EXPUNGE completed\r\n";
        match parse("A0006 EXPUNGE", blob) {
            Response::Expunge(e) => {
                assert_eq!(e.expunged, vec![3, 3, 5]);
                assert_eq!(e.exists, vec![8]);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn store_echoes_flag_updates() {
        let blob = b"* 2 FETCH (FLAGS (\\Deleted \\Seen))\r\n\
            * 4 FETCH (FLAGS (\\Deleted \\Flagged \\Seen))\r\n\
            A0007 OK STORE completed\r\n";
        match parse("A0007 STORE 2:4 +FLAGS (\\Deleted)", blob) {
            Response::Store(s) => {
                assert_eq!(s.updates.len(), 2);
                assert_eq!(s.updates[0].index, 2);
                assert_eq!(s.updates[0].flags, "(\\Deleted \\Seen)");
                assert_eq!(s.updates[1].index, 4);
                assert_eq!(s.updates[1].flags, "(\\Deleted \\Flagged \\Seen)");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn capability_listing() {
        let blob = b"* CAPABILITY IMAP4rev1 STARTTLS AUTH=GSSAPI LOGINDISABLED\r\n\
            A0008 OK CAPABILITY completed\r\n";
        let caps = match parse("A0008 CAPABILITY", blob) {
            Response::Capability(c) => c,
            other => panic!("unexpected response: {:?}", other),
        };
        assert!(caps.has("IMAP4rev1"));
        assert!(caps.has("starttls"));
        assert!(!caps.has("IDLE"));
    }

    #[test]
    fn noop_keeps_untagged_lines() {
        let blob = b"* 22 EXPUNGE\r\n* 23 EXISTS\r\n* 3 RECENT\r\n* 14 FETCH (FLAGS (\\Seen \\Deleted))\r\n\
            A0009 OK NOOP completed\r\n";
        match parse("A0009 NOOP", blob) {
            Response::Untagged(r) => {
                assert_eq!(r.lines.len(), 4);
                assert_eq!(r.lines[0], "* 22 EXPUNGE");
                assert_eq!(r.lines[3], "* 14 FETCH (FLAGS (\\Seen \\Deleted))");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn logout_sets_bye_seen() {
        let blob = b"* BYE IMAP4rev1 Server logging out\r\nA0005 OK LOGOUT completed\r\n";
        match parse("A0005 LOGOUT", blob) {
            Response::Logout(r) => {
                assert_eq!(r.header.status, Status::Ok);
                assert!(r.header.bye_seen);
                assert!(r.lines.len() >= 1);
                assert_eq!(r.lines[0], "* BYE IMAP4rev1 Server logging out");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn default_routine_handles_no_and_bad() {
        let blob = b"A0010 NO CREATE failed: permission denied\r\n";
        match parse("A0010 CREATE owatagusiam", blob) {
            Response::Simple(h) => {
                assert_eq!(h.status, Status::No);
                assert_eq!(
                    h.message.as_deref(),
                    Some("A0010 NO CREATE failed: permission denied")
                );
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let blob = b"A0011 BAD command unknown\r\n";
        match parse("A0011 RENAME a b", blob) {
            Response::Simple(h) => assert_eq!(h.status, Status::Bad),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn untagged_no_is_skipped() {
        let blob = b"* NO Disk is 98% full, please delete unnecessary data\r\n\
            A0012 OK CHECK completed\r\n";
        match parse("A0012 CHECK", blob) {
            Response::Simple(h) => assert_eq!(h.status, Status::Ok),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn garbage_line_fails_the_parse() {
        let blob = b"total nonsense\r\nA0013 OK done\r\n";
        match parse_response("A0013 CLOSE", blob) {
            Err(Error::Parse(ParseError::Unexpected(line))) => {
                assert_eq!(line, "total nonsense");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_tagged_terminator_fails() {
        let blob = b"* 1 EXISTS\r\n";
        match parse_response("A0014 SELECT INBOX", blob) {
            Err(Error::Parse(ParseError::MissingStatus)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn fetch_simple_items() {
        let blob = b"* 24 FETCH (FLAGS (\\Seen) UID 4827943)\r\n\
            * 25 FETCH (FLAGS (\\Seen) RFC822.SIZE 44827)\r\n\
            A0015 OK FETCH completed\r\n";
        let fetch = match parse("A0015 FETCH 24:25 (FLAGS UID)", blob) {
            Response::Fetch(f) => f,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(fetch.messages.len(), 2);
        assert_eq!(fetch.messages[0].index, 24);
        assert_eq!(fetch.messages[0].text("FLAGS"), Some("(\\Seen)"));
        assert_eq!(fetch.messages[0].number("UID"), Some(4827943));
        assert_eq!(fetch.messages[1].index, 25);
        assert_eq!(fetch.messages[1].number("RFC822.SIZE"), Some(44827));
    }

    #[test]
    fn fetch_with_literal() {
        let blob = b"* 1 FETCH (RFC822.SIZE 44827 BODY[HEADER] {14}\r\nfrom: aa@b.c\r\n)\r\n\
            A0003 OK FETCH completed\r\n";
        let fetch = match parse("A0003 FETCH 1 (RFC822.SIZE BODY[HEADER])", blob) {
            Response::Fetch(f) => f,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(fetch.messages.len(), 1);
        let message = &fetch.messages[0];
        assert_eq!(message.index, 1);
        assert_eq!(message.number("RFC822.SIZE"), Some(44827));
        let header = message
            .value("* 1 FETCH (RFC822.SIZE 44827 BODY[HEADER]")
            .expect("literal keyed by its prefix line");
        assert_eq!(header.as_literal(), Some(&b"from: aa@b.c\r\n"[..]));
        assert_eq!(message.literal("BODY[HEADER]"), Some(&b"from: aa@b.c\r\n"[..]));
    }

    #[test]
    fn fetch_literal_is_byte_exact() {
        // literal content that looks like IMAP framing must be captured
        // verbatim, parens and CRLFs included
        let payload = b")\r\nA0016 OK fake\r\n##";
        assert_eq!(payload.len(), 20);
        let mut blob = Vec::new();
        blob.extend_from_slice(b"* 7 FETCH (BODY[1] {20}\r\n");
        blob.extend_from_slice(payload);
        blob.extend_from_slice(b")\r\nA0016 OK FETCH completed\r\n");
        let fetch = match parse_response("A0016 FETCH 7 BODY[1]", &blob).unwrap() {
            Response::Fetch(f) => f,
            other => panic!("unexpected response: {:?}", other),
        };
        let literal = fetch.messages[0].literal("BODY[1]").unwrap();
        assert_eq!(literal.len(), 20);
        assert_eq!(literal, &payload[..]);
    }

    #[test]
    fn fetch_two_literals_stay_distinguishable() {
        let blob = b"* 3 FETCH (RFC822.HEADER {8}\r\nA: b\r\nX\r\n BODY[2] {3}\r\nabc)\r\n\
            A0017 OK FETCH completed\r\n";
        let fetch = match parse("A0017 FETCH 3 (RFC822.HEADER BODY[2])", blob) {
            Response::Fetch(f) => f,
            other => panic!("unexpected response: {:?}", other),
        };
        let message = &fetch.messages[0];
        assert_eq!(message.literal("RFC822.HEADER"), Some(&b"A: b\r\nX\r"[..]));
        assert_eq!(message.literal("BODY[2]"), Some(&b"abc"[..]));
        assert_eq!(message.items().count(), 2);
    }

    #[test]
    fn fetch_internaldate_and_bodystructure() {
        let blob = b"* 12 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" \
            BODYSTRUCTURE (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 3028 92))\r\n\
            A0018 OK FETCH completed\r\n";
        let fetch = match parse("A0018 FETCH 12 (INTERNALDATE BODYSTRUCTURE)", blob) {
            Response::Fetch(f) => f,
            other => panic!("unexpected response: {:?}", other),
        };
        let message = &fetch.messages[0];
        assert_eq!(
            message.text("INTERNALDATE"),
            Some("\"17-Jul-1996 02:44:25 -0700\"")
        );
        assert_eq!(
            message.text("BODYSTRUCTURE"),
            Some("(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 3028 92)")
        );
    }

    #[test]
    fn uid_fetch_dispatches_to_fetch() {
        let blob = b"* 37 FETCH (UID 74)\r\nA0019 OK UID FETCH completed\r\n";
        match parse("A0019 UID FETCH 74 (UID)", blob) {
            Response::Fetch(f) => assert_eq!(f.messages[0].number("UID"), Some(74)),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn unknown_fetch_item_aborts() {
        let blob = b"* 1 FETCH (X-NONSTANDARD 1)\r\nA0020 OK FETCH completed\r\n";
        match parse_response("A0020 FETCH 1 X-NONSTANDARD", blob) {
            Err(Error::Parse(ParseError::UnknownFetchItem(line))) => {
                assert!(line.contains("X-NONSTANDARD"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn transport_framing_helpers() {
        assert!(is_tagged_status_line(b"A0001 OK done\r\n", "A0001"));
        assert!(is_tagged_status_line(b"A0001 no sorry\r\n", "A0001"));
        assert!(is_tagged_status_line(b"A0001 BAD\r\n", "A0001"));
        assert!(!is_tagged_status_line(b"A0001 OKAY\r\n", "A0001"));
        assert!(!is_tagged_status_line(b"A0002 OK done\r\n", "A0001"));
        assert!(!is_tagged_status_line(b"* OK ready\r\n", "A0001"));

        assert_eq!(literal_octets(b"* 1 FETCH (BODY[] {310}\r\n"), Some(310));
        assert_eq!(literal_octets(b"a APPEND x {0}\r\n"), Some(0));
        assert_eq!(literal_octets(b"* 1 FETCH (UID 7)\r\n"), None);
        assert_eq!(literal_octets(b"* weird {}\r\n"), None);
    }
}
