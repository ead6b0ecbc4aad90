//! Bare-URL, email, and `www.` autolink recognizers.
//!
//! Each recognizer is handed the full inline span and the position of the active character that
//! triggered it (`:` for a URL scheme, `@` for an email, `w` for `www.`), so it can look both
//! backward (to find the scheme/local-part already emitted as normal text) and forward (to find
//! where the address ends). `rewind` reports how many of those already-emitted bytes the autolink
//! claims, so the caller can retract them from the preceding `NormalText` node — grounded on
//! `char_autolink_url`/`char_autolink_email`/`char_autolink_www` in the upstream algorithm, which
//! does the same retraction via pointer arithmetic on the previously pushed node.

const URL_SCHEMES: &[&str] = &[
    "https", "http", "ftps", "ftp", "mailto", "file", "irc", "gopher", "news", "nntp", "telnet",
    "git", "ssh",
];

/// Result of a successful autolink match.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct AutolinkMatch {
    /// Bytes consumed starting at the triggering active character.
    pub len: usize,
    /// Bytes to retract from the immediately preceding `NormalText` node.
    pub rewind: usize,
}

fn is_link_end(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'<' || b == b'>'
}

/// Recognize a scheme-prefixed URL ending at the `:` found at `span[pos]`.
pub(crate) fn autolink_url(span: &[u8], pos: usize) -> Option<AutolinkMatch> {
    debug_assert_eq!(span.get(pos), Some(&b':'));

    let mut start = pos;
    while start > 0 && span[start - 1].is_ascii_alphabetic() {
        start -= 1;
    }
    if start == pos {
        return None;
    }
    // The scheme must sit at a word boundary: not itself preceded by an identifier character.
    if start > 0 && (span[start - 1].is_ascii_alphanumeric() || span[start - 1] == b'_') {
        return None;
    }

    let scheme = &span[start..pos];
    if !URL_SCHEMES
        .iter()
        .any(|s| scheme.eq_ignore_ascii_case(s.as_bytes()))
    {
        return None;
    }

    let mut end = pos + 1;
    while end < span.len() && !is_link_end(span[end]) {
        end += 1;
    }
    if end <= pos + 1 {
        return None;
    }

    Some(AutolinkMatch {
        len: end - pos,
        rewind: pos - start,
    })
}

fn is_email_local_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'+')
}

fn is_email_domain_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-')
}

/// Recognize `local@domain.tld` centered on the `@` found at `span[pos]`. The domain must contain
/// at least one `.`; the local part rewinds into the preceding normal text.
pub(crate) fn autolink_email(span: &[u8], pos: usize) -> Option<AutolinkMatch> {
    debug_assert_eq!(span.get(pos), Some(&b'@'));

    let mut start = pos;
    while start > 0 && is_email_local_byte(span[start - 1]) {
        start -= 1;
    }
    if start == pos {
        return None;
    }

    let mut end = pos + 1;
    let mut seen_dot = false;
    while end < span.len() && is_email_domain_byte(span[end]) {
        seen_dot |= span[end] == b'.';
        end += 1;
    }
    if !seen_dot || end == pos + 1 || span[end - 1] == b'.' {
        return None;
    }

    Some(AutolinkMatch {
        len: end - pos,
        rewind: pos - start,
    })
}

/// Recognize a `www.`-prefixed address starting at `span[pos]`. The caller is responsible for
/// prepending `http://` when constructing the link node; this recognizer never rewinds (`www.`
/// itself is the start of the match, nothing precedes it to retract).
pub(crate) fn autolink_www(span: &[u8], pos: usize) -> Option<AutolinkMatch> {
    if !span[pos..].starts_with(b"www.") {
        return None;
    }
    if pos > 0 && span[pos - 1].is_ascii_alphanumeric() {
        return None;
    }

    let mut end = pos;
    while end < span.len() && !is_link_end(span[end]) {
        end += 1;
    }
    if end <= pos + 4 {
        return None;
    }

    Some(AutolinkMatch { len: end - pos, rewind: 0 })
}
