//! Byte-level text utilities shared by Pass 1 and both halves of Pass 2.
//!
//! Every function here is grounded directly on the upstream algorithm's `hbuf_*` helpers
//! (`document.c`): counting spaces, classifying whitespace, expanding tabs, collapsing forced
//! linebreaks into single spaces, and undoing backslash escapes.

use crate::byte_lookup::is_utf8_continuation;

/// Number of consecutive ASCII spaces starting at `off`, never reading past `end`, and never
/// counting more than `cap` of them unless `cap == 0` (unbounded).
pub(crate) fn count_spaces(data: &[u8], off: usize, end: usize, cap: usize) -> usize {
    let limit = if cap == 0 { end } else { end.min(off + cap) };
    let mut i = off;
    while i < limit && data[i] == b' ' {
        i += 1;
    }
    i - off
}

/// True only for a plain space or a newline — tabs and carriage returns are eliminated earlier in
/// the pipeline (tab expansion in Pass 1, CR/CRLF normalization in Pass 1) and are never expected
/// here.
pub(crate) fn is_space(c: u8) -> bool {
    c == b' ' || c == b'\n'
}

/// Copy `src` into `dst`, expanding each tab to the next 4-column tab stop. Bytes with the UTF-8
/// continuation-byte pattern (`10xxxxxx`) don't advance the column counter, so multi-byte
/// characters are measured in columns rather than bytes.
pub(crate) fn expand_tabs(dst: &mut Vec<u8>, src: &[u8]) {
    let mut column = 0usize;
    for &b in src {
        if b == b'\t' {
            let spaces = 4 - (column % 4);
            dst.resize(dst.len() + spaces, b' ');
            column += spaces;
        } else {
            dst.push(b);
            if !is_utf8_continuation(b) {
                column += 1;
            }
        }
    }
}

/// Copy `src` into `dst`, replacing each `\n` with a single space and collapsing a space that
/// already precedes it — used to turn a multi-line link-reference id or paragraph into a
/// single-line, space-normalized lookup key.
pub(crate) fn replace_spacing(dst: &mut Vec<u8>, src: &[u8]) {
    for &b in src {
        if b == b'\n' {
            if dst.last() != Some(&b' ') {
                dst.push(b' ');
            }
        } else {
            dst.push(b);
        }
    }
}

/// Copy `src` into `dst`, consuming each `\` as an escape and emitting the following byte
/// verbatim. A trailing, unmatched `\` at the end of `src` is dropped rather than emitted — this
/// matches the upstream algorithm's behavior exactly and is not "fixed" here.
pub(crate) fn unescape_text(dst: &mut Vec<u8>, src: &[u8]) {
    let mut i = 0;
    while i < src.len() {
        let start = i;
        while i < src.len() && src[i] != b'\\' {
            i += 1;
        }
        if i > start {
            dst.extend_from_slice(&src[start..i]);
        }
        if i + 1 >= src.len() {
            break;
        }
        dst.push(src[i + 1]);
        i += 2;
    }
}

/// True iff `data[pos]` is preceded by an odd number of consecutive backslashes (i.e. is itself
/// escaped, rather than being itself an escaping backslash).
pub(crate) fn is_escaped(data: &[u8], pos: usize) -> bool {
    let mut i = pos;
    while i >= 1 && data[i - 1] == b'\\' {
        i -= 1;
    }
    (pos - i) % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_bounded_by_cap() {
        assert_eq!(count_spaces(b"    x", 0, 5, 0), 4);
        assert_eq!(count_spaces(b"    x", 0, 5, 2), 2);
    }

    #[test]
    fn tabs_align_to_four_columns() {
        let mut out = Vec::new();
        expand_tabs(&mut out, b"a\tb");
        assert_eq!(out, b"a   b");

        let mut out = Vec::new();
        expand_tabs(&mut out, b"\t");
        assert_eq!(out, b"    ");
    }

    #[test]
    fn spacing_collapses_repeated_newlines() {
        let mut out = Vec::new();
        replace_spacing(&mut out, b"a\n\nb");
        assert_eq!(out, b"a b");
    }

    #[test]
    fn unescape_drops_trailing_lone_backslash() {
        let mut out = Vec::new();
        unescape_text(&mut out, br"a\*b\");
        assert_eq!(out, b"a*b");
    }

    #[test]
    fn escaped_detection_is_parity_based() {
        assert!(is_escaped(br"\*", 1));
        assert!(!is_escaped(br"\\*", 2));
    }
}
