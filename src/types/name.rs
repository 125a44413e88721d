/// A mailbox that matches a `LIST` or `LSUB` command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Name {
    pub(crate) attributes: String,
    pub(crate) delimiter: Option<char>,
    pub(crate) name: String,
}

impl Name {
    pub(crate) fn new(attributes: String, delimiter: Option<char>, name: String) -> Name {
        Name {
            attributes,
            delimiter,
            name,
        }
    }

    /// The parenthesised name attributes (`(\HasNoChildren)`), as sent.
    pub fn attributes(&self) -> &str {
        &self.attributes
    }

    /// The hierarchy delimiter is a character used to delimit levels of hierarchy in a mailbox
    /// name.  A client can use it to create child mailboxes, and to search higher or lower levels
    /// of naming hierarchy.  `None` means that no hierarchy exists; the name is a "flat" name.
    pub fn delimiter(&self) -> Option<char> {
        self.delimiter
    }

    /// The mailbox name. Quoted names keep their surrounding quotes, atom
    /// names are returned as-is (RFC 3501 section 7.2.2 allows both forms).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The mailbox name with any surrounding quotes stripped.
    pub fn name_unquoted(&self) -> &str {
        self.name
            .strip_prefix('"')
            .and_then(|n| n.strip_suffix('"'))
            .unwrap_or(&self.name)
    }
}
