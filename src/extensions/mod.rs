//! Implementations of IMAP extension commands.

pub mod idle;
