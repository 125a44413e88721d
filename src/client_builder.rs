use crate::client::Client;
use crate::error::Result;
use std::io::{Read, Write};
use std::net::TcpStream;

#[cfg(feature = "native-tls")]
use native_tls::{TlsConnector, TlsStream};
#[cfg(feature = "rustls-tls")]
use rustls_connector::{RustlsConnector, TlsStream as RustlsStream};

/// Builds a connected, greeting-consumed [`Client`] over an encrypted
/// transport.
///
/// Two connection shapes are supported. The default is implicit TLS (port
/// 993 style): the TCP socket is handed to the TLS handshake immediately,
/// and the server greeting is read over the encrypted stream. Calling
/// [`starttls`](ClientBuilder::starttls) switches to the upgrade dance
/// instead: the greeting arrives in the clear, the builder issues
/// `STARTTLS` and waits for its `OK`, and only then does the handshake run
/// over the same socket. In both shapes the builder leaves the greeting
/// consumed, so a `Client` it returns is ready for `login` without any
/// further setup (and without a second, hanging greeting read after an
/// upgrade).
///
/// Failures keep their cause: socket problems come back as `Error::Io`, a
/// handshake the TLS library rejects as `Error::TlsHandshake` (or
/// `Error::RustlsHandshake`), and a server that answers `STARTTLS` with
/// `NO` or `BAD` as `Error::No`/`Error::Bad` carrying the server's own
/// words. The builder itself takes no user-supplied protocol strings;
/// credentials and mailbox names are validated later, when the returned
/// [`Client`] quotes them for `login` and friends (CR or LF there is an
/// `Error::Validate`, never a smuggled command line).
///
/// ```no_run
/// # #[cfg(feature = "native-tls")]
/// # fn main() -> Result<(), imapkit::Error> {
/// // implicit TLS on 993
/// let direct = imapkit::ClientBuilder::new("imap.example.com", 993).native_tls()?;
///
/// // cleartext connect on 143, upgraded before anything sensitive is sent
/// let upgraded = imapkit::ClientBuilder::new("imap.example.com", 143)
///     .starttls()
///     .native_tls()?;
/// # Ok(())
/// # }
/// # #[cfg(not(feature = "native-tls"))]
/// # fn main() {}
/// ```
pub struct ClientBuilder<D>
where
    D: AsRef<str>,
{
    domain: D,
    port: u16,
    starttls: bool,
}

impl<D> ClientBuilder<D>
where
    D: AsRef<str>,
{
    /// Start building a connection to `domain:port`. The domain is used
    /// both to resolve the address and as the name presented during the
    /// TLS handshake.
    pub fn new(domain: D, port: u16) -> Self {
        ClientBuilder {
            domain,
            port,
            starttls: false,
        }
    }

    /// Upgrade via `STARTTLS` instead of connecting with implicit TLS.
    ///
    /// The greeting and the `STARTTLS` exchange happen on the cleartext
    /// socket; the handshake given to [`connect`](ClientBuilder::connect)
    /// (or one of the preset transports) runs afterwards, over the same
    /// socket.
    #[cfg(any(feature = "native-tls", feature = "rustls-tls"))]
    pub fn starttls(&mut self) -> &mut Self {
        self.starttls = true;
        self
    }

    /// Connect with a stock `native-tls` configuration.
    #[cfg(feature = "native-tls")]
    #[cfg_attr(docsrs, doc(cfg(feature = "native-tls")))]
    pub fn native_tls(&mut self) -> Result<Client<TlsStream<TcpStream>>> {
        self.connect(|domain, tcp| {
            let ssl_conn = TlsConnector::builder().build()?;
            Ok(TlsConnector::connect(&ssl_conn, domain, tcp)?)
        })
    }

    /// Connect with a stock `rustls` configuration, trusting the
    /// platform's native certificate store.
    #[cfg(feature = "rustls-tls")]
    #[cfg_attr(docsrs, doc(cfg(feature = "rustls-tls")))]
    pub fn rustls(&mut self) -> Result<Client<RustlsStream<TcpStream>>> {
        self.connect(|domain, tcp| {
            let ssl_conn = RustlsConnector::new_with_native_certs()?;
            Ok(ssl_conn.connect(domain, tcp)?)
        })
    }

    /// Connect with a caller-supplied TLS initialisation, for setups the
    /// stock transports cannot express (private CAs, pinned certificates,
    /// tuned protocol parameters).
    ///
    /// `handshake` receives the domain and the connected [`TcpStream`] and
    /// must return the encrypted stream. When
    /// [`starttls`](ClientBuilder::starttls) was requested, the socket has
    /// already carried the greeting and the accepted `STARTTLS` command by
    /// the time `handshake` sees it; the returned [`Client`] is marked
    /// accordingly so it will not try to read a greeting that the server
    /// will never send again.
    pub fn connect<F, C>(&mut self, handshake: F) -> Result<Client<C>>
    where
        F: FnOnce(&str, TcpStream) -> Result<C>,
        C: Read + Write,
    {
        if self.starttls {
            let tcp = TcpStream::connect((self.domain.as_ref(), self.port))?;
            let mut client = Client::new(tcp);
            client.read_greeting()?;
            client.run_command_and_check_ok("STARTTLS")?;
            let tcp = client.into_inner()?;

            let tls = handshake(self.domain.as_ref(), tcp)?;
            let mut client = Client::new(tls);
            // the greeting came before the upgrade; don't wait for another
            client.mark_greeting_read();
            Ok(client)
        } else {
            let tcp = TcpStream::connect((self.domain.as_ref(), self.port))?;
            let tls = handshake(self.domain.as_ref(), tcp)?;
            let mut client = Client::new(tls);
            client.read_greeting()?;
            Ok(client)
        }
    }
}
