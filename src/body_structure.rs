//! Parsing of `FETCH ... BODYSTRUCTURE` strings into a MIME part tree.
//!
//! A body structure is a nested parenthesised list: a single-part message is
//! one group starting with a quoted type (`("TEXT" "PLAIN" ...)`), a
//! multipart message is a group of nested groups followed by the multipart
//! subtype and optional extension data. The tree built here owns its
//! children exclusively (no back-pointers), addresses every part with a
//! dotted part number (`1`, `1.2`, `2.1.3`), and keeps the raw substring
//! each part was parsed from, so a part can be re-fetched with
//! `FETCH <n> BODY[<part_no>]`.

use crate::error::{Error, ParseError, Result};

/// The sentinel the protocol uses for an absent field.
pub const NIL: &str = "NIL";

/// One level of the tree: the parts of a multipart container (or the single
/// part of a non-multipart message), plus the container's trailing data.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BodyNode {
    /// Part number of the owning part; empty at the root.
    pub part_level: String,
    /// The parts at this level, in on-the-wire order. Always non-empty for
    /// a parsed node.
    pub parts: Vec<BodyPart>,
    /// For multipart containers, everything after the child groups: the
    /// quoted subtype and any extension fields, verbatim.
    pub extended: String,
}

/// One part of the tree, either a leaf or a nested multipart.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BodyPart {
    /// Dotted 1-based part number, e.g. `2.1`. A child's number is its
    /// parent's number extended by `.` and the child's index.
    pub part_no: String,
    /// The raw parenthesised substring this part was parsed from.
    pub raw: String,
    pub kind: PartKind,
}

/// What a [`BodyPart`] contains.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PartKind {
    /// A leaf with its parsed fields.
    Single(PartFields),
    /// A nested multipart with at least one child part.
    Multipart(BodyNode),
}

impl BodyPart {
    /// The parsed fields, when this part is a leaf.
    pub fn fields(&self) -> Option<&PartFields> {
        match &self.kind {
            PartKind::Single(fields) => Some(fields),
            PartKind::Multipart(_) => None,
        }
    }

    /// The nested level, when this part is a multipart container.
    pub fn children(&self) -> Option<&BodyNode> {
        match &self.kind {
            PartKind::Single(_) => None,
            PartKind::Multipart(node) => Some(node),
        }
    }
}

/// The fields of a single-part body, in protocol order. Scalar fields are
/// stored with their quotes stripped; list-valued fields (`parameter_list`,
/// `disposition`) keep their raw parenthesised form. Absent trailing fields
/// are empty; an explicit `NIL` on the wire is kept as the [`NIL`] sentinel.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PartFields {
    pub part_type: String,
    pub subtype: String,
    pub parameter_list: String,
    pub id: String,
    pub description: String,
    pub encoding: String,
    pub size: String,
    /// Line count; only present when the type is `TEXT`.
    pub text_lines: String,
    pub md5: String,
    pub disposition: String,
    pub language: String,
    pub location: String,
    /// Whatever follows the known fields. Normally empty.
    pub extended: String,
}

/// Build the part tree for a BODYSTRUCTURE string, as returned in a FETCH
/// response item.
///
/// ```
/// use imapkit::body_structure;
///
/// let tree = body_structure::parse(
///     "(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 1152 23)",
/// )
/// .unwrap();
/// let fields = tree.parts[0].fields().unwrap();
/// assert_eq!(fields.part_type, "TEXT");
/// assert_eq!(fields.size, "1152");
/// ```
pub fn parse(body_structure: &str) -> Result<BodyNode> {
    let raw = body_structure.trim();
    let mut root = BodyNode::default();
    build_node(&mut root, raw)?;
    Ok(root)
}

/// Walk the tree in pre-order, visiting every part exactly once. The
/// visitor receives the level that owns the part, the part itself, and the
/// caller's state; the tree is never modified by a walk.
pub fn walk<S, F>(node: &BodyNode, visit: &mut F, state: &mut S)
where
    F: FnMut(&BodyNode, &BodyPart, &mut S),
{
    for part in &node.parts {
        visit(node, part, state);
        if let PartKind::Multipart(child) = &part.kind {
            walk(child, visit, state);
        }
    }
}

/// An attachment found by [`collect_attachments`]. All fields come from the
/// body structure; the octets themselves must be fetched separately with
/// `FETCH <n> BODY[part_no]`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Attachment {
    pub part_no: String,
    pub encoding: String,
    pub file_name: String,
    pub creation_date: String,
    pub modification_date: String,
    pub size: String,
}

/// Accumulator state for [`collect_attachments`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AttachmentList {
    pub attachments: Vec<Attachment>,
}

/// A visitor that records every leaf that looks like an attachment: a part
/// with a `FILENAME` disposition parameter, or a non-text part with base64
/// transfer encoding.
///
/// Pass it to [`walk`]:
///
/// ```
/// use imapkit::body_structure::{self, AttachmentList};
///
/// let tree = body_structure::parse(
///     "((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"UTF-8\") NIL NIL \"7BIT\" 42 3)\
///      (\"APPLICATION\" \"PDF\" (\"NAME\" \"a.pdf\") NIL NIL \"BASE64\" 1024) \"MIXED\")",
/// )
/// .unwrap();
/// let mut found = AttachmentList::default();
/// body_structure::walk(&tree, &mut body_structure::collect_attachments, &mut found);
/// assert_eq!(found.attachments.len(), 1);
/// assert_eq!(found.attachments[0].part_no, "2");
/// ```
pub fn collect_attachments(_node: &BodyNode, part: &BodyPart, state: &mut AttachmentList) {
    let fields = match part.fields() {
        Some(fields) => fields,
        None => return,
    };
    let file_name = parameter_value(&fields.disposition, "FILENAME")
        .or_else(|| parameter_value(&fields.parameter_list, "NAME"));
    let base64 = fields.encoding.eq_ignore_ascii_case("BASE64");
    let non_text = !fields.part_type.eq_ignore_ascii_case("TEXT");
    if file_name.is_none() && !(non_text && base64) {
        return;
    }
    state.attachments.push(Attachment {
        part_no: part.part_no.clone(),
        encoding: fields.encoding.clone(),
        file_name: file_name.unwrap_or_default(),
        creation_date: parameter_value(&fields.disposition, "CREATION-DATE").unwrap_or_default(),
        modification_date: parameter_value(&fields.disposition, "MODIFICATION-DATE")
            .unwrap_or_default(),
        size: fields.size.clone(),
    });
}

/// The quoted value following `"KEY"` in a parameter list, if any.
fn parameter_value(list: &str, key: &str) -> Option<String> {
    let bytes = list.as_bytes();
    let needle = key.as_bytes();
    let mut i = 0;
    while i + needle.len() <= bytes.len() {
        if bytes[i..i + needle.len()].eq_ignore_ascii_case(needle) {
            let rest = &list[i + needle.len()..];
            let rest = rest.trim_start_matches('"').trim_start();
            if let Some(open) = rest.find('"') {
                if let Some(len) = rest[open + 1..].find('"') {
                    return Some(rest[open + 1..open + 1 + len].to_string());
                }
            }
            return None;
        }
        i += 1;
    }
    None
}

// ---------------------------------------------------------------------------
// Tree construction.
// ---------------------------------------------------------------------------

/// Fill `node` from one balanced `( ... )` group. Nested groups ahead of
/// the subtype mean multipart; a leading quoted string means single-part.
fn build_node(node: &mut BodyNode, raw: &str) -> Result<()> {
    let inner = inner_of(raw)?;
    let mut rest = inner.trim_start();

    if rest.starts_with('(') {
        let mut index = 1u32;
        while rest.starts_with('(') {
            let child_raw = balanced_group(rest)?;
            let part_no = if node.part_level.is_empty() {
                index.to_string()
            } else {
                format!("{}.{}", node.part_level, index)
            };
            let kind = if is_multipart(child_raw)? {
                let mut child = BodyNode {
                    part_level: part_no.clone(),
                    parts: Vec::new(),
                    extended: String::new(),
                };
                build_node(&mut child, child_raw)?;
                PartKind::Multipart(child)
            } else {
                PartKind::Single(parse_fields(child_raw)?)
            };
            node.parts.push(BodyPart {
                part_no,
                raw: child_raw.to_string(),
                kind,
            });
            rest = rest[child_raw.len()..].trim_start();
            index += 1;
        }
        node.extended = rest.trim().to_string();
    } else {
        // single-part message: the whole group is the one (and only) part
        let part_no = if node.part_level.is_empty() {
            "1".to_string()
        } else {
            node.part_level.clone()
        };
        node.parts.push(BodyPart {
            part_no,
            raw: raw.to_string(),
            kind: PartKind::Single(parse_fields(raw)?),
        });
    }
    Ok(())
}

/// Whether a balanced group is a multipart (nested group first) rather than
/// a single part (quoted type first).
fn is_multipart(raw: &str) -> Result<bool> {
    Ok(inner_of(raw)?.trim_start().starts_with('('))
}

/// Strip the outer parens of a balanced group.
fn inner_of(raw: &str) -> Result<&str> {
    let raw = raw.trim();
    if raw.starts_with('(') && raw.ends_with(')') {
        Ok(&raw[1..raw.len() - 1])
    } else {
        Err(Error::Parse(ParseError::Unexpected(raw.to_string())))
    }
}

/// The balanced `( ... )` group at the start of `s`. Quoted strings are
/// honoured so a paren inside a filename does not unbalance the scan.
fn balanced_group(s: &str) -> Result<&str> {
    let bytes = s.as_bytes();
    debug_assert!(bytes.first() == Some(&b'('));
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' if !in_quotes => in_quotes = true,
            b'"' if bytes.get(i.wrapping_sub(1)) != Some(&b'\\') => in_quotes = false,
            b'(' if !in_quotes => depth += 1,
            b')' if !in_quotes => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&s[..=i]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(Error::Parse(ParseError::UnclosedList(s.to_string())))
}

// ---------------------------------------------------------------------------
// Leaf field parsing.
// ---------------------------------------------------------------------------

/// Consume the fixed field order of a single-part group: type, subtype,
/// parameter list, id, description, encoding, size, then `text_lines` for
/// TEXT parts, then the optional extension fields.
fn parse_fields(raw: &str) -> Result<PartFields> {
    let inner = inner_of(raw)?;
    let mut tokens = Tokens::new(inner);
    let mut fields = PartFields {
        part_type: unquote(tokens.next_or_nil()?),
        subtype: unquote(tokens.next_or_nil()?),
        parameter_list: tokens.next_or_nil()?.to_string(),
        id: unquote(tokens.next_or_nil()?),
        description: unquote(tokens.next_or_nil()?),
        encoding: unquote(tokens.next_or_nil()?),
        size: unquote(tokens.next_or_nil()?),
        ..PartFields::default()
    };
    if fields.part_type.eq_ignore_ascii_case("TEXT") {
        fields.text_lines = unquote(tokens.next_or_nil()?);
    }
    if let Some(token) = tokens.next()? {
        fields.md5 = unquote(token);
    }
    if let Some(token) = tokens.next()? {
        fields.disposition = token.to_string();
    }
    if let Some(token) = tokens.next()? {
        fields.language = unquote(token);
    }
    if let Some(token) = tokens.next()? {
        fields.location = unquote(token);
    }
    fields.extended = tokens.rest().trim().to_string();
    Ok(fields)
}

/// Strip the quotes of a quoted token; `NIL`, lists and bare numbers pass
/// through unchanged.
fn unquote(token: &str) -> String {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
        .to_string()
}

/// Tokenizer over the inside of a body-part group: quoted strings, balanced
/// lists and bare atoms (`NIL`, numbers).
struct Tokens<'a> {
    s: &'a str,
}

impl<'a> Tokens<'a> {
    fn new(s: &'a str) -> Tokens<'a> {
        Tokens { s }
    }

    fn next(&mut self) -> Result<Option<&'a str>> {
        self.s = self.s.trim_start();
        if self.s.is_empty() {
            return Ok(None);
        }
        let token = if self.s.starts_with('(') {
            balanced_group(self.s)?
        } else if self.s.starts_with('"') {
            match self.s[1..].find('"') {
                Some(len) => &self.s[..len + 2],
                None => return Err(Error::Parse(ParseError::Unexpected(self.s.to_string()))),
            }
        } else {
            let end = self
                .s
                .find(|c: char| c == ' ' || c == ')' || c == '(')
                .unwrap_or_else(|| self.s.len());
            &self.s[..end]
        };
        self.s = &self.s[token.len()..];
        Ok(Some(token))
    }

    /// Mandatory field: absent means the server elided it, which we map to
    /// the `NIL` sentinel rather than failing.
    fn next_or_nil(&mut self) -> Result<&'a str> {
        Ok(self.next()?.unwrap_or(NIL))
    }

    fn rest(&self) -> &'a str {
        self.s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PART_MIXED: &str = "((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 1152 23) (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\" \"NAME\" \"cc.diff\") \"<960723163407.20117h@cac.washington.edu>\" \"Compiler diff\" \"BASE64\" 4554 73) \"MIXED\")";

    #[test]
    fn single_part_leaf() {
        let tree = parse(
            "(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 3028 92)",
        )
        .unwrap();
        assert_eq!(tree.parts.len(), 1);
        let part = &tree.parts[0];
        assert_eq!(part.part_no, "1");
        let fields = part.fields().unwrap();
        assert_eq!(fields.part_type, "TEXT");
        assert_eq!(fields.subtype, "PLAIN");
        assert_eq!(fields.parameter_list, "(\"CHARSET\" \"US-ASCII\")");
        assert_eq!(fields.id, NIL);
        assert_eq!(fields.description, NIL);
        assert_eq!(fields.encoding, "7BIT");
        assert_eq!(fields.size, "3028");
        assert_eq!(fields.text_lines, "92");
        assert_eq!(fields.md5, "");
        assert_eq!(fields.extended, "");
    }

    #[test]
    fn non_text_leaf_has_no_text_lines() {
        let tree = parse(
            "(\"APPLICATION\" \"OCTET-STREAM\" (\"NAME\" \"x.bin\") NIL NIL \"BASE64\" 2048)",
        )
        .unwrap();
        let fields = tree.parts[0].fields().unwrap();
        assert_eq!(fields.part_type, "APPLICATION");
        assert_eq!(fields.size, "2048");
        assert_eq!(fields.text_lines, "");
    }

    #[test]
    fn multipart_mixed_two_children() {
        let tree = parse(TWO_PART_MIXED).unwrap();
        assert_eq!(tree.part_level, "");
        assert_eq!(tree.parts.len(), 2);
        assert!(tree.extended.contains("\"MIXED\""));

        let first = &tree.parts[0];
        assert_eq!(first.part_no, "1");
        let fields = first.fields().unwrap();
        assert_eq!(fields.part_type, "TEXT");
        assert_eq!(fields.subtype, "PLAIN");
        assert_eq!(fields.size, "1152");
        assert_eq!(fields.text_lines, "23");

        let second = &tree.parts[1];
        assert_eq!(second.part_no, "2");
        let fields = second.fields().unwrap();
        assert_eq!(fields.encoding, "BASE64");
        assert_eq!(fields.size, "4554");
        assert_eq!(fields.text_lines, "73");
        assert!(fields.parameter_list.contains("\"NAME\" \"cc.diff\""));
        assert_eq!(fields.id, "<960723163407.20117h@cac.washington.edu>");
        assert_eq!(fields.description, "Compiler diff");
    }

    #[test]
    fn nested_multipart_part_numbers() {
        // multipart/mixed containing (text, multipart/alternative(text, html))
        let input = "((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1)\
            ((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 20 2)\
            (\"TEXT\" \"HTML\" NIL NIL NIL \"QUOTED-PRINTABLE\" 30 3) \"ALTERNATIVE\")\
            \"MIXED\")";
        let tree = parse(input).unwrap();
        assert_eq!(tree.parts.len(), 2);
        assert_eq!(tree.parts[0].part_no, "1");
        assert_eq!(tree.parts[1].part_no, "2");

        let alternative = tree.parts[1].children().unwrap();
        assert_eq!(alternative.part_level, "2");
        assert_eq!(alternative.parts.len(), 2);
        assert_eq!(alternative.parts[0].part_no, "2.1");
        assert_eq!(alternative.parts[1].part_no, "2.2");
        assert!(alternative.extended.contains("\"ALTERNATIVE\""));
        assert_eq!(
            alternative.parts[1].fields().unwrap().encoding,
            "QUOTED-PRINTABLE"
        );
    }

    #[test]
    fn child_part_numbers_extend_their_parents() {
        let input = "(((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 1 1)\
            (\"TEXT\" \"HTML\" NIL NIL NIL \"7BIT\" 2 1) \"ALTERNATIVE\")\
            (\"IMAGE\" \"PNG\" (\"NAME\" \"p.png\") NIL NIL \"BASE64\" 3)\
            \"RELATED\")";
        let tree = parse(input).unwrap();
        let mut seen = Vec::new();
        walk(
            &tree,
            &mut |node: &BodyNode, part: &BodyPart, seen: &mut Vec<(String, String)>| {
                seen.push((node.part_level.clone(), part.part_no.clone()));
            },
            &mut seen,
        );
        assert_eq!(
            seen,
            vec![
                ("".to_string(), "1".to_string()),
                ("1".to_string(), "1.1".to_string()),
                ("1".to_string(), "1.2".to_string()),
                ("".to_string(), "2".to_string()),
            ]
        );
        // every part number extends its owning level's number
        for (level, part_no) in &seen {
            if level.is_empty() {
                assert!(!part_no.contains('.'));
            } else {
                assert!(part_no.starts_with(&format!("{}.", level)));
            }
        }
    }

    #[test]
    fn walk_is_preorder_and_complete() {
        let tree = parse(TWO_PART_MIXED).unwrap();
        let mut order = Vec::new();
        walk(
            &tree,
            &mut |_node: &BodyNode, part: &BodyPart, order: &mut Vec<String>| {
                order.push(part.part_no.clone());
            },
            &mut order,
        );
        assert_eq!(order, vec!["1", "2"]);
    }

    #[test]
    fn raw_substring_is_kept() {
        let tree = parse(TWO_PART_MIXED).unwrap();
        assert!(tree.parts[0].raw.starts_with("(\"TEXT\" \"PLAIN\""));
        assert!(tree.parts[1].raw.contains("cc.diff"));
    }

    #[test]
    fn attachments_by_disposition_filename() {
        let input = "((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"UTF-8\") NIL NIL \"7BIT\" 42 3)\
            (\"APPLICATION\" \"ZIP\" NIL NIL NIL \"BASE64\" 9000 NIL \
            (\"ATTACHMENT\" (\"FILENAME\" \"logs.zip\" \"CREATION-DATE\" \"Mon, 1 Jan 2018 10:00:00 +0000\")) NIL NIL)\
            \"MIXED\")";
        let tree = parse(input).unwrap();
        let mut found = AttachmentList::default();
        walk(&tree, &mut collect_attachments, &mut found);
        assert_eq!(found.attachments.len(), 1);
        let attachment = &found.attachments[0];
        assert_eq!(attachment.part_no, "2");
        assert_eq!(attachment.encoding, "BASE64");
        assert_eq!(attachment.file_name, "logs.zip");
        assert_eq!(attachment.creation_date, "Mon, 1 Jan 2018 10:00:00 +0000");
        assert_eq!(attachment.size, "9000");
    }

    #[test]
    fn inline_text_is_not_an_attachment() {
        let tree = parse(
            "(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"UTF-8\") NIL NIL \"BASE64\" 100 5)",
        )
        .unwrap();
        let mut found = AttachmentList::default();
        walk(&tree, &mut collect_attachments, &mut found);
        assert!(found.attachments.is_empty());
    }

    #[test]
    fn named_base64_part_counts_even_without_disposition() {
        let tree = parse(TWO_PART_MIXED).unwrap();
        let mut found = AttachmentList::default();
        walk(&tree, &mut collect_attachments, &mut found);
        // part 2 carries NAME "cc.diff" in its parameter list
        assert_eq!(found.attachments.len(), 1);
        assert_eq!(found.attachments[0].file_name, "cc.diff");
        assert_eq!(found.attachments[0].part_no, "2");
    }

    #[test]
    fn unbalanced_input_is_rejected() {
        match parse("((\"TEXT\" \"PLAIN\"") {
            Err(Error::Parse(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
