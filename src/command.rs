//! The closed set of IMAP commands this crate issues and parses.

/// Every IMAP verb the response parser recognises.
///
/// The variant determines which parse routine a response blob is dispatched
/// to; verbs without a dedicated routine fall back to plain status parsing.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Command {
    StartTls,
    Authenticate,
    Login,
    Capability,
    Select,
    Examine,
    Create,
    Delete,
    Rename,
    Subscribe,
    Unsubscribe,
    List,
    Lsub,
    Status,
    Append,
    Check,
    Close,
    Expunge,
    Search,
    Fetch,
    Store,
    Copy,
    Uid,
    Noop,
    Logout,
    Idle,
}

impl Command {
    /// Look up a verb, case-insensitively.
    pub fn parse(word: &str) -> Option<Command> {
        let word = word.to_ascii_uppercase();
        Some(match word.as_str() {
            "STARTTLS" => Command::StartTls,
            "AUTHENTICATE" => Command::Authenticate,
            "LOGIN" => Command::Login,
            "CAPABILITY" => Command::Capability,
            "SELECT" => Command::Select,
            "EXAMINE" => Command::Examine,
            "CREATE" => Command::Create,
            "DELETE" => Command::Delete,
            "RENAME" => Command::Rename,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "LIST" => Command::List,
            "LSUB" => Command::Lsub,
            "STATUS" => Command::Status,
            "APPEND" => Command::Append,
            "CHECK" => Command::Check,
            "CLOSE" => Command::Close,
            "EXPUNGE" => Command::Expunge,
            "SEARCH" => Command::Search,
            "FETCH" => Command::Fetch,
            "STORE" => Command::Store,
            "COPY" => Command::Copy,
            "UID" => Command::Uid,
            "NOOP" => Command::Noop,
            "LOGOUT" => Command::Logout,
            "IDLE" => Command::Idle,
            _ => return None,
        })
    }

    /// The canonical verb, as written on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::StartTls => "STARTTLS",
            Command::Authenticate => "AUTHENTICATE",
            Command::Login => "LOGIN",
            Command::Capability => "CAPABILITY",
            Command::Select => "SELECT",
            Command::Examine => "EXAMINE",
            Command::Create => "CREATE",
            Command::Delete => "DELETE",
            Command::Rename => "RENAME",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::List => "LIST",
            Command::Lsub => "LSUB",
            Command::Status => "STATUS",
            Command::Append => "APPEND",
            Command::Check => "CHECK",
            Command::Close => "CLOSE",
            Command::Expunge => "EXPUNGE",
            Command::Search => "SEARCH",
            Command::Fetch => "FETCH",
            Command::Store => "STORE",
            Command::Copy => "COPY",
            Command::Uid => "UID",
            Command::Noop => "NOOP",
            Command::Logout => "LOGOUT",
            Command::Idle => "IDLE",
        }
    }

    /// Resolve the effective verb of a tagged command line.
    ///
    /// `UID FETCH`, `UID SEARCH` and friends dispatch as the verb that
    /// follows the `UID` prefix.
    pub fn of_line(command_line: &str) -> Option<Command> {
        let mut words = command_line.split_whitespace();
        let _tag = words.next()?;
        let verb = Command::parse(words.next()?)?;
        if verb == Command::Uid {
            Command::parse(words.next()?)
        } else {
            Some(verb)
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
