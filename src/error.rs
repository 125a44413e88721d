//! IMAP error types.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
#[cfg(any(feature = "native-tls", feature = "rustls-tls"))]
use std::net::TcpStream;
use std::result;
use std::str::Utf8Error;

use base64::DecodeError;
use bufstream::IntoInnerError as BufError;
#[cfg(feature = "native-tls")]
use native_tls::Error as TlsError;
#[cfg(feature = "native-tls")]
use native_tls::HandshakeError as TlsHandshakeError;
#[cfg(feature = "rustls-tls")]
use rustls_connector::HandshakeError as RustlsHandshakeError;

/// A convenience wrapper around `Result` for `imapkit::Error`.
pub type Result<T> = result::Result<T, Error>;

/// A set of errors that can occur while talking to an IMAP server.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    ///
    /// The session should be considered broken: subsequent commands on the same
    /// transport will fail.
    Io(IoError),
    /// An error from the `native_tls` library during the TLS handshake.
    #[cfg(feature = "native-tls")]
    TlsHandshake(TlsHandshakeError<TcpStream>),
    /// An error from the `native_tls` library while managing the socket.
    #[cfg(feature = "native-tls")]
    Tls(TlsError),
    /// An error from the `rustls-connector` library during the TLS handshake.
    #[cfg(feature = "rustls-tls")]
    RustlsHandshake(RustlsHandshakeError<TcpStream>),
    /// The connection was terminated unexpectedly mid-response.
    ConnectionLost,
    /// A `BAD` response from the IMAP server, carrying the server's message.
    Bad(String),
    /// A `NO` response from the IMAP server, carrying the server's message.
    No(String),
    /// Error parsing a server response. The specific response is discarded but
    /// the session may continue with further commands.
    Parse(ParseError),
    /// Command inputs were not valid [IMAP
    /// strings](https://tools.ietf.org/html/rfc3501#section-4.3).
    Validate(ValidateError),
    /// Returned when trying to read the server greeting more than once.
    GreetingAlreadyRead,
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl<T> From<BufError<T>> for Error {
    fn from(err: BufError<T>) -> Error {
        Error::Io(err.into())
    }
}

#[cfg(feature = "native-tls")]
impl From<TlsHandshakeError<TcpStream>> for Error {
    fn from(err: TlsHandshakeError<TcpStream>) -> Error {
        Error::TlsHandshake(err)
    }
}

#[cfg(feature = "native-tls")]
impl From<TlsError> for Error {
    fn from(err: TlsError) -> Error {
        Error::Tls(err)
    }
}

#[cfg(feature = "rustls-tls")]
impl From<RustlsHandshakeError<TcpStream>> for Error {
    fn from(err: RustlsHandshakeError<TcpStream>) -> Error {
        Error::RustlsHandshake(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io: {}", e),
            #[cfg(feature = "native-tls")]
            Error::Tls(e) => write!(f, "tls: {}", e),
            #[cfg(feature = "native-tls")]
            Error::TlsHandshake(e) => write!(f, "tls handshake: {}", e),
            #[cfg(feature = "rustls-tls")]
            Error::RustlsHandshake(e) => write!(f, "tls handshake: {}", e),
            Error::ConnectionLost => f.write_str("connection lost"),
            Error::Bad(msg) => write!(f, "BAD response: {}", msg),
            Error::No(msg) => write!(f, "NO response: {}", msg),
            Error::Parse(e) => fmt::Display::fmt(e, f),
            Error::Validate(e) => fmt::Display::fmt(e, f),
            Error::GreetingAlreadyRead => f.write_str("greeting can only be read once"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            #[cfg(feature = "native-tls")]
            Error::Tls(e) => Some(e),
            Error::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// An error occurred while trying to parse a server response.
///
/// Every variant carries the offending line (or blob region) verbatim so
/// callers can see exactly what the server sent.
#[derive(Debug)]
#[non_exhaustive]
pub enum ParseError {
    /// A line matched neither the expected payload grammar for the dispatched
    /// command nor any recognised status form.
    Unexpected(String),
    /// A FETCH response contained an item token the parser does not recognise.
    UnknownFetchItem(String),
    /// A parenthesised list was opened but never closed on the line.
    UnclosedList(String),
    /// The response blob ended without a tagged `OK`/`NO`/`BAD` line.
    MissingStatus,
    /// A `{N}` literal announced more octets than the response contains.
    TruncatedLiteral(String),
    /// The client could not find or decode the server's authentication challenge.
    Authentication(String, Option<DecodeError>),
    /// The client received data that was not UTF-8 encoded.
    DataNotUtf8(Vec<u8>, Utf8Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Unexpected(line) => write!(f, "unexpected response line: [{}]", line),
            ParseError::UnknownFetchItem(line) => write!(f, "unknown FETCH item in: [{}]", line),
            ParseError::UnclosedList(line) => write!(f, "unclosed list in: [{}]", line),
            ParseError::MissingStatus => f.write_str("response ended without a tagged status line"),
            ParseError::TruncatedLiteral(line) => write!(f, "literal truncated after: [{}]", line),
            ParseError::Authentication(line, _) => {
                write!(f, "unable to parse authentication response: [{}]", line)
            }
            ParseError::DataNotUtf8(_, e) => write!(f, "response data is not UTF-8: {}", e),
        }
    }
}

impl StdError for ParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ParseError::Authentication(_, Some(e)) => Some(e),
            ParseError::DataNotUtf8(_, e) => Some(e),
            _ => None,
        }
    }
}

/// An [invalid character](https://tools.ietf.org/html/rfc3501#section-4.3) was found in an input
/// string.
#[derive(Debug)]
pub struct ValidateError(pub char);

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // print character in debug form because invalid ones are often whitespaces
        write!(f, "invalid character in input: {:?}", self.0)
    }
}

impl StdError for ValidateError {}
