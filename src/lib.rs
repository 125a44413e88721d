//! imapkit is a blocking IMAP 4rev1 ([RFC 3501](https://tools.ietf.org/html/rfc3501))
//! client for Rust.
//!
//! The crate covers the client side of the protocol: connecting (plain,
//! TLS, or STARTTLS), tagging and issuing commands, collecting each raw
//! response up to its tagged terminator (literal `{N}` blocks included),
//! parsing responses into typed values, and turning `BODYSTRUCTURE`
//! strings into a walkable MIME part tree.
//!
//! To connect, use the [`ClientBuilder`]. This gives you an unauthenticated
//! [`Client`]; logging in turns it into a [`Session`], which has one method
//! per protocol command:
//!
//! ```no_run
//! # #[cfg(feature = "native-tls")]
//! # fn fetch_inbox_top() -> imapkit::Result<Option<String>> {
//! let client = imapkit::ClientBuilder::new("imap.example.com", 993).native_tls()?;
//!
//! // the client we have here is unauthenticated;
//! // to do anything useful with the e-mails, we need to log in
//! let mut session = client
//!     .login("me@example.com", "password")
//!     .map_err(|e| e.0)?;
//!
//! // we want to fetch the first email in the INBOX mailbox
//! let inbox = session.select("INBOX")?;
//! println!("{} messages", inbox.exists().unwrap_or(0));
//!
//! // fetch message number 1 in this mailbox, along with its RFC822 field.
//! // RFC 822 dictates the format of the body of e-mails
//! let messages = session.fetch("1", "RFC822")?;
//! let message = match messages.messages.first() {
//!     Some(m) => m,
//!     None => return Ok(None),
//! };
//!
//! // extract the message's body
//! let body = message.literal("RFC822").unwrap_or(b"");
//! let body = std::str::from_utf8(body)
//!     .expect("message was not valid utf-8")
//!     .to_string();
//!
//! // be nice to the server and log out
//! session.logout()?;
//!
//! Ok(Some(body))
//! # }
//! ```
//!
//! Responses can also be parsed by hand: [`Session::send_command`] returns
//! the raw blob and [`parse::parse_response`] turns a blob into a
//! [`types::Response`]. Body structures fetched with
//! `FETCH <n> BODYSTRUCTURE` parse separately via [`body_structure::parse`],
//! and [`body_structure::walk`] visits every MIME part in pre-order; see
//! [`body_structure::collect_attachments`] for pulling out attachment
//! metadata.
//!
//! A session is single-threaded and blocking: every operation runs to
//! completion on the caller's thread, and the [`IDLE`](Session::idle)
//! extension deliberately leans on that to wait for server events. Use one
//! session per thread; sessions share nothing.
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod body_structure;
mod client;
mod client_builder;
mod command;
pub mod error;
pub mod extensions;
pub mod parse;
pub mod types;

#[cfg(test)]
mod mock_stream;

pub use crate::client::{Authenticator, Client, Session};
pub use crate::client_builder::ClientBuilder;
pub use crate::command::Command;
pub use crate::error::{Error, Result};
