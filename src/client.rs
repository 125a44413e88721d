//! The [`Client`] and [`Session`] types, and the transport plumbing they
//! share: tagged command framing, literal-aware response reading, and the
//! typed session operations.

use std::io::{BufRead, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::ops::{Deref, DerefMut};

use bufstream::BufStream;
use log::debug;

use crate::error::{Error, ParseError, Result, ValidateError};
use crate::parse::{self, parse_response};
use crate::types::*;

static TAG_PREFIX: &str = "A";
const INITIAL_TAG: u32 = 0;

/// Unwrap a result or hand the client back to the caller together with the
/// error, so a failed login does not consume the connection.
macro_rules! ok_or_unauth_client_err {
    ($r:expr, $self:expr) => {
        match $r {
            Ok(o) => o,
            Err(e) => return Err((e, $self)),
        }
    };
}

/// Computes the response to each challenge of an
/// [`AUTHENTICATE`](https://tools.ietf.org/html/rfc3501#section-6.2.2)
/// exchange (e.g. CRAM-MD5 or XOAUTH2). Challenges arrive base64-decoded
/// and responses are base64-encoded before they are sent.
pub trait Authenticator {
    /// The raw response bytes for one challenge.
    type Response: AsRef<[u8]>;
    /// Derive the response to the given (decoded) server challenge.
    fn process(&self, challenge: &[u8]) -> Self::Response;
}

/// An unauthenticated handle to an IMAP server.
///
/// The `Client` owns the transport exclusively: it tags outgoing commands
/// with `A0001`, `A0002`, ... and collects each raw response up to the
/// matching tagged status line, literal `{N}` blocks included. Logging in
/// (or authenticating) turns it into a [`Session`].
pub struct Client<T: Read + Write> {
    stream: BufStream<T>,
    tag: u32,
    greeting_read: bool,
}

impl<T: Read + Write> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("tag", &self.tag).finish()
    }
}

/// An authenticated IMAP session, with one method per protocol command.
///
/// The typed operations raise [`Error::No`]/[`Error::Bad`] when the server
/// answers non-OK; [`Session::execute`] and [`Session::send_command`] leave
/// that decision to the caller. All operations are synchronous and run on
/// the caller's thread; a session must not be shared between threads.
pub struct Session<T: Read + Write> {
    client: Client<T>,
}

impl<T: Read + Write> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("client", &self.client).finish()
    }
}

// A session *is* a client, with more rights.
impl<T: Read + Write> Deref for Session<T> {
    type Target = Client<T>;

    fn deref(&self) -> &Client<T> {
        &self.client
    }
}

impl<T: Read + Write> DerefMut for Session<T> {
    fn deref_mut(&mut self) -> &mut Client<T> {
        &mut self.client
    }
}

impl Client<TcpStream> {
    /// Connect to the server on a plain TCP socket and read its greeting.
    ///
    /// Use [`ClientBuilder`](crate::ClientBuilder) for TLS or STARTTLS
    /// connections.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Client<TcpStream>> {
        let stream = TcpStream::connect(addr)?;
        let mut client = Client::new(stream);
        client.read_greeting()?;
        Ok(client)
    }
}

impl<T: Read + Write> Client<T> {
    /// Wrap an already-connected stream. The server greeting is not read;
    /// call [`Client::read_greeting`] if the stream is fresh.
    pub fn new(stream: T) -> Client<T> {
        Client {
            stream: BufStream::new(stream),
            tag: INITIAL_TAG,
            greeting_read: false,
        }
    }

    /// Yield the underlying stream, flushing any buffered writes.
    pub fn into_inner(self) -> Result<T> {
        Ok(self.stream.into_inner()?)
    }

    /// Read the `* OK` greeting the server sends when a connection opens.
    /// Reading it twice is an error.
    pub fn read_greeting(&mut self) -> Result<Vec<u8>> {
        if self.greeting_read {
            return Err(Error::GreetingAlreadyRead);
        }
        let mut greeting = Vec::new();
        self.readline(&mut greeting)?;
        self.greeting_read = true;
        Ok(greeting)
    }

    /// Record that the greeting was consumed elsewhere (STARTTLS reads it
    /// on the cleartext socket before the upgrade).
    pub(crate) fn mark_greeting_read(&mut self) {
        self.greeting_read = true;
    }

    /// Log in with a plaintext password, consuming the client.
    ///
    /// On failure the client is handed back alongside the error so the
    /// caller can retry or fall back to another mechanism.
    pub fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> ::std::result::Result<Session<T>, (Error, Client<T>)> {
        let username = ok_or_unauth_client_err!(validate_str(username), self);
        let password = ok_or_unauth_client_err!(validate_str(password), self);
        ok_or_unauth_client_err!(
            self.run_command_and_check_ok(&format!("LOGIN {} {}", username, password)),
            self
        );
        Ok(Session::new(self))
    }

    /// Authenticate with the given SASL mechanism, consuming the client.
    pub fn authenticate<A: Authenticator>(
        mut self,
        auth_type: &str,
        authenticator: &A,
    ) -> ::std::result::Result<Session<T>, (Error, Client<T>)> {
        let command_line = self.create_command(&format!("AUTHENTICATE {}", auth_type));
        ok_or_unauth_client_err!(self.write_line(command_line.as_bytes()), self);
        let tag = tag_of(&command_line).to_string();

        let mut blob: Vec<u8> = Vec::new();
        loop {
            let line_start = blob.len();
            ok_or_unauth_client_err!(self.readline(&mut blob), self);
            let line = &blob[line_start..];
            if line.starts_with(b"+") {
                let challenge = trim_challenge(&line[1..]);
                let decoded = match base64::decode(challenge) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        let challenge = String::from_utf8_lossy(challenge).into_owned();
                        return Err((
                            Error::Parse(ParseError::Authentication(challenge, Some(e))),
                            self,
                        ));
                    }
                };
                let answer = base64::encode(authenticator.process(&decoded));
                // the continuation line is not part of the response proper
                blob.truncate(line_start);
                ok_or_unauth_client_err!(self.write_line(answer.as_bytes()), self);
            } else if parse::is_tagged_status_line(line, &tag) {
                break;
            }
        }

        let response = ok_or_unauth_client_err!(parse_response(&command_line, &blob), self);
        ok_or_unauth_client_err!(check_status(response), self);
        Ok(Session::new(self))
    }

    /// Run a command and fail unless the tagged reply is `OK`.
    pub fn run_command_and_check_ok(&mut self, command: &str) -> Result<()> {
        let (command_line, blob) = self.run_command(command)?;
        check_status(parse_response(&command_line, &blob)?).map(|_| ())
    }

    /// Tag a command, send it, and collect the raw response blob. Returns
    /// the tagged command line (which the parser needs) and the blob.
    pub(crate) fn run_command(&mut self, untagged_command: &str) -> Result<(String, Vec<u8>)> {
        let command_line = self.create_command(untagged_command);
        self.write_line(command_line.as_bytes())?;
        let blob = self.read_response(tag_of(&command_line))?;
        Ok((command_line, blob))
    }

    /// Read lines until the tagged `OK`/`NO`/`BAD` for `tag` arrives.
    ///
    /// A line whose tail announces a `{N}` literal is followed by exactly
    /// `N` raw octets, copied into the blob verbatim before line reading
    /// resumes; the terminator check never looks inside literal data.
    pub(crate) fn read_response(&mut self, tag: &str) -> Result<Vec<u8>> {
        let mut blob = Vec::new();
        loop {
            let line_start = blob.len();
            self.readline(&mut blob)?;
            if let Some(count) = parse::literal_octets(&blob[line_start..]) {
                self.read_octets(count, &mut blob)?;
                continue;
            }
            if parse::is_tagged_status_line(&blob[line_start..], tag) {
                return Ok(blob);
            }
        }
    }

    /// Read one LF-terminated line into `into`, terminator included.
    pub(crate) fn readline(&mut self, into: &mut Vec<u8>) -> Result<usize> {
        let read = self.stream.read_until(b'\n', into)?;
        if read == 0 {
            return Err(Error::ConnectionLost);
        }
        debug!("S: {}", String::from_utf8_lossy(&into[into.len() - read..]));
        Ok(read)
    }

    /// Write `content` followed by CR LF, and flush.
    pub(crate) fn write_line(&mut self, content: &[u8]) -> Result<()> {
        self.stream.write_all(content)?;
        self.stream.write_all(b"\r\n")?;
        self.stream.flush()?;
        debug!("C: {}", String::from_utf8_lossy(content));
        Ok(())
    }

    pub(crate) fn stream_mut(&mut self) -> &mut T {
        self.stream.get_mut()
    }

    fn read_octets(&mut self, count: usize, into: &mut Vec<u8>) -> Result<()> {
        let start = into.len();
        into.resize(start + count, 0);
        self.stream.read_exact(&mut into[start..])?;
        Ok(())
    }

    /// Tags are unique for the lifetime of the session.
    pub(crate) fn create_command(&mut self, command: &str) -> String {
        self.tag += 1;
        format!("{}{:04} {}", TAG_PREFIX, self.tag, command)
    }
}

impl<T: Read + Write> Session<T> {
    pub(crate) fn new(client: Client<T>) -> Session<T> {
        Session { client }
    }

    /// Run a command and parse its response, without raising on a non-OK
    /// status; inspect [`Response::status`] to tell how the command fared.
    pub fn execute(&mut self, command: &str) -> Result<Response> {
        let (command_line, blob) = self.run_command(command)?;
        parse_response(&command_line, &blob)
    }

    /// Run a command and return the raw response blob, untouched.
    pub fn send_command(&mut self, command: &str) -> Result<Vec<u8>> {
        let (_, blob) = self.run_command(command)?;
        Ok(blob)
    }

    /// Select a mailbox for read-write access.
    pub fn select(&mut self, mailbox_name: &str) -> Result<Mailbox> {
        let mailbox = validate_str(mailbox_name)?;
        match check_status(self.execute(&format!("SELECT {}", mailbox))?)? {
            Response::Select(m) => Ok(m),
            other => Err(unexpected(other)),
        }
    }

    /// Like [`Session::select`], but read-only.
    pub fn examine(&mut self, mailbox_name: &str) -> Result<Mailbox> {
        let mailbox = validate_str(mailbox_name)?;
        match check_status(self.execute(&format!("EXAMINE {}", mailbox))?)? {
            Response::Select(m) => Ok(m),
            other => Err(unexpected(other)),
        }
    }

    /// Search the selected mailbox; returns message sequence numbers.
    pub fn search(&mut self, query: &str) -> Result<Vec<u64>> {
        self.search_command(&format!("SEARCH {}", query))
    }

    /// Like [`Session::search`], returning UIDs instead.
    pub fn uid_search(&mut self, query: &str) -> Result<Vec<u64>> {
        self.search_command(&format!("UID SEARCH {}", query))
    }

    /// Fetch `query` items for the messages in `sequence_set`.
    pub fn fetch(&mut self, sequence_set: &str, query: &str) -> Result<FetchResult> {
        self.fetch_command(&format!("FETCH {} {}", sequence_set, query))
    }

    /// Like [`Session::fetch`], addressing messages by UID.
    pub fn uid_fetch(&mut self, uid_set: &str, query: &str) -> Result<FetchResult> {
        self.fetch_command(&format!("UID FETCH {} {}", uid_set, query))
    }

    /// Alter message flags, e.g. `store("1:3", "+FLAGS (\\Deleted)")`.
    pub fn store(&mut self, sequence_set: &str, flags: &str) -> Result<StoreResult> {
        self.store_command(&format!("STORE {} {}", sequence_set, flags))
    }

    /// Like [`Session::store`], addressing messages by UID.
    pub fn uid_store(&mut self, uid_set: &str, flags: &str) -> Result<StoreResult> {
        self.store_command(&format!("UID STORE {} {}", uid_set, flags))
    }

    /// Copy messages to the end of the given mailbox.
    pub fn copy(&mut self, sequence_set: &str, mailbox_name: &str) -> Result<()> {
        let mailbox = validate_str(mailbox_name)?;
        self.run_command_and_check_ok(&format!("COPY {} {}", sequence_set, mailbox))
    }

    /// Like [`Session::copy`], addressing messages by UID.
    pub fn uid_copy(&mut self, uid_set: &str, mailbox_name: &str) -> Result<()> {
        let mailbox = validate_str(mailbox_name)?;
        self.run_command_and_check_ok(&format!("UID COPY {} {}", uid_set, mailbox))
    }

    /// List mailboxes matching `mailbox_pattern` under `reference_name`.
    pub fn list(
        &mut self,
        reference_name: Option<&str>,
        mailbox_pattern: Option<&str>,
    ) -> Result<MailboxList> {
        let reference = validate_str(reference_name.unwrap_or(""))?;
        let pattern = validate_str(mailbox_pattern.unwrap_or("*"))?;
        match check_status(self.execute(&format!("LIST {} {}", reference, pattern))?)? {
            Response::List(l) => Ok(l),
            other => Err(unexpected(other)),
        }
    }

    /// Like [`Session::list`], restricted to subscribed mailboxes.
    pub fn lsub(
        &mut self,
        reference_name: Option<&str>,
        mailbox_pattern: Option<&str>,
    ) -> Result<MailboxList> {
        let reference = validate_str(reference_name.unwrap_or(""))?;
        let pattern = validate_str(mailbox_pattern.unwrap_or("*"))?;
        match check_status(self.execute(&format!("LSUB {} {}", reference, pattern))?)? {
            Response::List(l) => Ok(l),
            other => Err(unexpected(other)),
        }
    }

    /// Query mailbox counters without selecting it, e.g.
    /// `status("INBOX", "(MESSAGES UNSEEN)")`.
    pub fn status(&mut self, mailbox_name: &str, data_items: &str) -> Result<MailboxStatus> {
        let mailbox = validate_str(mailbox_name)?;
        match check_status(self.execute(&format!("STATUS {} {}", mailbox, data_items))?)? {
            Response::Status(s) => Ok(s),
            other => Err(unexpected(other)),
        }
    }

    /// Create a mailbox.
    pub fn create(&mut self, mailbox_name: &str) -> Result<()> {
        let mailbox = validate_str(mailbox_name)?;
        self.run_command_and_check_ok(&format!("CREATE {}", mailbox))
    }

    /// Permanently remove a mailbox.
    pub fn delete(&mut self, mailbox_name: &str) -> Result<()> {
        let mailbox = validate_str(mailbox_name)?;
        self.run_command_and_check_ok(&format!("DELETE {}", mailbox))
    }

    /// Rename a mailbox.
    pub fn rename(&mut self, current_name: &str, new_name: &str) -> Result<()> {
        let current = validate_str(current_name)?;
        let new = validate_str(new_name)?;
        self.run_command_and_check_ok(&format!("RENAME {} {}", current, new))
    }

    /// Add a mailbox to the server's set of subscribed mailboxes.
    pub fn subscribe(&mut self, mailbox_name: &str) -> Result<()> {
        let mailbox = validate_str(mailbox_name)?;
        self.run_command_and_check_ok(&format!("SUBSCRIBE {}", mailbox))
    }

    /// Remove a mailbox from the server's set of subscribed mailboxes.
    pub fn unsubscribe(&mut self, mailbox_name: &str) -> Result<()> {
        let mailbox = validate_str(mailbox_name)?;
        self.run_command_and_check_ok(&format!("UNSUBSCRIBE {}", mailbox))
    }

    /// Request a checkpoint of the selected mailbox.
    pub fn check(&mut self) -> Result<()> {
        self.run_command_and_check_ok("CHECK")
    }

    /// Close the selected mailbox, expunging deleted messages silently.
    pub fn close(&mut self) -> Result<()> {
        self.run_command_and_check_ok("CLOSE")
    }

    /// Expunge messages flagged `\Deleted` from the selected mailbox.
    pub fn expunge(&mut self) -> Result<ExpungeResult> {
        match check_status(self.execute("EXPUNGE")?)? {
            Response::Expunge(e) => Ok(e),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the server what it can do.
    pub fn capability(&mut self) -> Result<CapabilityList> {
        match check_status(self.execute("CAPABILITY")?)? {
            Response::Capability(c) => Ok(c),
            other => Err(unexpected(other)),
        }
    }

    /// Do nothing, but collect any untagged state the server volunteers.
    pub fn noop(&mut self) -> Result<RawLines> {
        match check_status(self.execute("NOOP")?)? {
            Response::Untagged(r) => Ok(r),
            other => Err(unexpected(other)),
        }
    }

    /// Append a message to a mailbox, uploading it as a `{N}` literal.
    pub fn append(&mut self, mailbox_name: &str, content: &[u8]) -> Result<()> {
        let mailbox = validate_str(mailbox_name)?;
        let command_line = self
            .client
            .create_command(&format!("APPEND {} {{{}}}", mailbox, content.len()));
        self.client.write_line(command_line.as_bytes())?;
        let tag = tag_of(&command_line).to_string();

        let mut blob = Vec::new();
        self.client.readline(&mut blob)?;
        if blob.starts_with(b"+") {
            self.client.stream.write_all(content)?;
            self.client.write_line(b"")?;
            blob = self.client.read_response(&tag)?;
        } else if !parse::is_tagged_status_line(&blob, &tag) {
            let rest = self.client.read_response(&tag)?;
            blob.extend(rest);
        }
        check_status(parse_response(&command_line, &blob)?).map(|_| ())
    }

    /// Log out. The server's `BYE` is expected and not an error; the
    /// transport closes when the session is dropped.
    pub fn logout(&mut self) -> Result<()> {
        match check_status(self.execute("LOGOUT")?)? {
            Response::Logout(_) => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Start an [`IDLE`](https://tools.ietf.org/html/rfc2177) wait on the
    /// selected mailbox.
    pub fn idle(&mut self) -> crate::extensions::idle::Handle<'_, T> {
        crate::extensions::idle::Handle::make(self)
    }

    fn search_command(&mut self, command: &str) -> Result<Vec<u64>> {
        match check_status(self.execute(command)?)? {
            Response::Search(r) => Ok(r.ids),
            other => Err(unexpected(other)),
        }
    }

    fn fetch_command(&mut self, command: &str) -> Result<FetchResult> {
        match check_status(self.execute(command)?)? {
            Response::Fetch(f) => Ok(f),
            other => Err(unexpected(other)),
        }
    }

    fn store_command(&mut self, command: &str) -> Result<StoreResult> {
        match check_status(self.execute(command)?)? {
            Response::Store(s) => Ok(s),
            other => Err(unexpected(other)),
        }
    }
}

/// Raise `NO`/`BAD` statuses as errors, preserving the server's message.
pub(crate) fn check_status(response: Response) -> Result<Response> {
    match response.status() {
        Status::Ok => Ok(response),
        Status::No => Err(Error::No(
            response.message().unwrap_or("NO response").to_string(),
        )),
        Status::Bad => Err(Error::Bad(
            response.message().unwrap_or("BAD response").to_string(),
        )),
    }
}

fn unexpected(response: Response) -> Error {
    Error::Parse(ParseError::Unexpected(format!("{:?}", response)))
}

pub(crate) fn tag_of(command_line: &str) -> &str {
    command_line.split(' ').next().unwrap_or("")
}

/// Quote a user-supplied string argument, rejecting line terminators, which
/// a quoted string cannot carry.
fn validate_str(value: &str) -> Result<String> {
    for c in value.chars() {
        if c == '\r' || c == '\n' {
            return Err(Error::Validate(ValidateError(c)));
        }
    }
    Ok(format!(
        "\"{}\"",
        value.replace('\\', "\\\\").replace('"', "\\\"")
    ))
}

fn trim_challenge(line: &[u8]) -> &[u8] {
    let mut line = line;
    while line.first() == Some(&b' ') {
        line = &line[1..];
    }
    while matches!(line.last(), Some(&b'\r') | Some(&b'\n')) {
        line = &line[..line.len() - 1];
    }
    line
}
