//! Adds support for the IMAP IDLE command specified in [RFC
//! 2177](https://tools.ietf.org/html/rfc2177).

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

#[cfg(feature = "native-tls")]
use native_tls::TlsStream;
#[cfg(feature = "rustls-tls")]
use rustls_connector::TlsStream as RustlsStream;

use crate::client::{check_status, tag_of, Session};
use crate::error::{Error, ParseError, Result};
use crate::parse::{self, parse_response};
use crate::types::{RawLines, Response};

/// `Handle` allows a client to block waiting for changes to the remote
/// mailbox.
///
/// The handle issues the [`IDLE` command](https://tools.ietf.org/html/rfc2177#section-3)
/// and then deliberately blocks on the transport: the wait ends when the
/// server volunteers an untagged status line, or when a read timeout set
/// via [`Handle::timeout`] fires. Either way `DONE` is sent and the
/// exchange completes with the usual tagged reply.
///
/// ```no_run
/// # #[cfg(feature = "native-tls")]
/// # fn main() -> Result<(), imapkit::Error> {
/// use imapkit::extensions::idle::WaitOutcome;
///
/// let client = imapkit::ClientBuilder::new("imap.example.com", 993).native_tls()?;
/// let mut session = client.login("user", "password").map_err(|(e, _)| e)?;
/// session.select("INBOX")?;
/// match session.idle().wait()? {
///     WaitOutcome::MailboxChanged(lines) => println!("changed: {:?}", lines.lines),
///     WaitOutcome::TimedOut => println!("nothing happened"),
/// }
/// # Ok(())
/// # }
/// # #[cfg(not(feature = "native-tls"))]
/// # fn main() {}
/// ```
///
/// As long as a `Handle` is active the mailbox cannot be otherwise
/// accessed.
#[derive(Debug)]
pub struct Handle<'a, T: Read + Write> {
    session: &'a mut Session<T>,
    timeout: Option<Duration>,
    done: bool,
    tag: Option<String>,
}

/// The result of a wait on a [`Handle`].
#[derive(Debug, Eq, PartialEq)]
pub enum WaitOutcome {
    /// The configured read timeout expired before the server reported
    /// anything.
    TimedOut,
    /// The server reported a change; the untagged lines it sent are inside.
    MailboxChanged(RawLines),
}

/// Must be implemented for a transport in order for a [`Session`] to use
/// IDLE with a timeout.
pub trait SetReadTimeout {
    /// Set the timeout for subsequent reads to the given one.
    ///
    /// If `timeout` is `None`, the read timeout should be removed.
    ///
    /// See also `std::net::TcpStream::set_read_timeout`.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;
}

impl<'a, T: Read + Write + 'a> Handle<'a, T> {
    pub(crate) fn make(session: &'a mut Session<T>) -> Self {
        Handle {
            session,
            timeout: None,
            done: true,
            tag: None,
        }
    }

    fn terminate(&mut self) -> Result<()> {
        if !self.done {
            self.done = true;
            self.session.write_line(b"DONE")?;
            if let Some(tag) = self.tag.take() {
                self.session.read_response(&tag).map(|_| ())
            } else {
                Ok(())
            }
        } else {
            Ok(())
        }
    }
}

impl<'a, T: SetReadTimeout + Read + Write + 'a> Handle<'a, T> {
    /// Bound the wait: give up and report [`WaitOutcome::TimedOut`] after
    /// `interval` without server activity.
    ///
    /// Servers may log off a client whose IDLE has been running too long;
    /// RFC 2177 advises re-issuing IDLE at least every 29 minutes.
    pub fn timeout(&mut self, interval: Duration) -> &mut Self {
        self.timeout = Some(interval);
        self
    }

    /// Issue IDLE and block until the mailbox changes or the timeout fires.
    pub fn wait(&mut self) -> Result<WaitOutcome> {
        let command_line = self.session.create_command("IDLE");
        self.session.write_line(command_line.as_bytes())?;
        let tag = tag_of(&command_line).to_string();

        // The server acknowledges IDLE with a `+` continuation; a tagged
        // reply at this point is a rejection.
        let mut ack = Vec::new();
        self.session.readline(&mut ack)?;
        if !ack.starts_with(b"+") {
            let mut blob = ack;
            if !parse::is_tagged_status_line(&blob, &tag) {
                let rest = self.session.read_response(&tag)?;
                blob.extend(rest);
            }
            check_status(parse_response(&command_line, &blob)?)?;
            return Err(Error::Parse(ParseError::Unexpected(
                "IDLE completed without a continuation".to_string(),
            )));
        }
        self.done = false;
        self.tag = Some(tag.clone());

        if let Some(interval) = self.timeout {
            self.session.stream_mut().set_read_timeout(Some(interval))?;
        }

        let mut blob = Vec::new();
        let timed_out = loop {
            let line_start = blob.len();
            match self.session.readline(&mut blob) {
                Ok(_) => {
                    // Dovecot's keep-alive chatter does not end the wait
                    if blob[line_start..].eq_ignore_ascii_case(b"* OK Still here\r\n") {
                        blob.truncate(line_start);
                        continue;
                    }
                    break false;
                }
                Err(Error::Io(ref e))
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    break true;
                }
                Err(e) => return Err(e),
            }
        };

        if self.timeout.is_some() {
            let _ = self.session.stream_mut().set_read_timeout(None);
        }

        // End the IDLE; the remaining untagged lines and the tagged reply
        // complete the blob, which then parses like a NOOP response.
        self.done = true;
        self.tag = None;
        self.session.write_line(b"DONE")?;
        blob.extend(self.session.read_response(&tag)?);
        let response = check_status(parse_response(&command_line, &blob)?)?;
        let lines = match response {
            Response::Untagged(lines) => lines,
            other => {
                return Err(Error::Parse(ParseError::Unexpected(format!(
                    "{:?}",
                    other
                ))))
            }
        };

        if timed_out {
            Ok(WaitOutcome::TimedOut)
        } else {
            Ok(WaitOutcome::MailboxChanged(lines))
        }
    }
}

impl<'a, T: Read + Write + 'a> Drop for Handle<'a, T> {
    fn drop(&mut self) {
        // we don't want to panic here if we can't terminate the Idle
        let _ = self.terminate().is_ok();
    }
}

impl SetReadTimeout for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        TcpStream::set_read_timeout(self, timeout).map_err(Error::Io)
    }
}

#[cfg(feature = "native-tls")]
impl SetReadTimeout for TlsStream<TcpStream> {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.get_ref().set_read_timeout(timeout).map_err(Error::Io)
    }
}

#[cfg(feature = "rustls-tls")]
impl SetReadTimeout for RustlsStream<TcpStream> {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.get_ref().set_read_timeout(timeout).map_err(Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_stream::MockStream;

    impl SetReadTimeout for MockStream {
        fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> Result<()> {
            Ok(())
        }
    }

    fn session(response: &[u8]) -> Session<MockStream> {
        Session::new(crate::Client::new(MockStream::new(response.to_vec())))
    }

    #[test]
    fn idle_waits_for_one_untagged_line() {
        let mut session = session(
            b"+ idling\r\n\
              * 23 EXISTS\r\n\
              A0001 OK IDLE terminated\r\n",
        );
        let outcome = session.idle().wait().unwrap();
        match outcome {
            WaitOutcome::MailboxChanged(lines) => {
                assert_eq!(lines.lines, vec!["* 23 EXISTS"]);
            }
            WaitOutcome::TimedOut => panic!("expected a mailbox change"),
        }
    }

    #[test]
    fn idle_rejection_surfaces_as_error() {
        let mut session = session(b"A0001 NO IDLE not supported\r\n");
        match session.idle().wait() {
            Err(Error::No(msg)) => assert_eq!(msg, "A0001 NO IDLE not supported"),
            other => panic!("unexpected result: {:?}", other),
        };
    }

    #[test]
    fn keepalive_chatter_is_ignored() {
        let mut session = session(
            b"+ idling\r\n\
              * OK Still here\r\n\
              * 1 RECENT\r\n\
              A0001 OK IDLE terminated\r\n",
        );
        match session.idle().wait().unwrap() {
            WaitOutcome::MailboxChanged(lines) => {
                assert_eq!(lines.lines, vec!["* 1 RECENT"]);
            }
            WaitOutcome::TimedOut => panic!("expected a mailbox change"),
        };
    }
}
