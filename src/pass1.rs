//! Pass 1: the reference/footnote/metadata scanner.
//!
//! Scans the raw input once, in document order, to pull out reference-style link definitions,
//! footnote definitions, and (optionally) front-matter metadata, leaving behind a "cleaned" text
//! buffer — BOM stripped, tabs expanded, line endings normalized to `\n` — for the block parser to
//! consume in Pass 2. Grounded on the upstream algorithm's `lowdown_buf_parse`/`is_ref`/
//! `is_footnote`/`parse_metadata`.

use crate::options::{Extensions, Options};
use crate::reftable::normalize_key as normalize_metadata_key;
use crate::reftable::{FootnoteRef, LinkRef, MetadataEntry, ReferenceTables};
use crate::text::{expand_tabs, is_escaped};

const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Run Pass 1 over `input`, returning the populated reference tables and the cleaned text buffer
/// Pass 2 should parse.
pub(crate) fn run(input: &[u8], options: &Options) -> (ReferenceTables, Vec<u8>) {
    let input = strip_bom(input);
    let normalized = normalize_newlines(input);

    let mut tables = ReferenceTables::default();

    let mut offset = 0;
    if options.has(Extensions::METADATA) && normalized.first().is_some_and(u8::is_ascii_alphanumeric)
    {
        offset = parse_metadata_block(&normalized, &mut tables.metadata);
        log::trace!("pass1: recognized {} metadata entries", tables.metadata.len());
    }
    apply_metadata_overrides(&mut tables.metadata, options.metadata_overrides());
    // Canonical ordering: `title` first, everything else in encounter order (a stable sort
    // preserves that relative order).
    tables.metadata.sort_by_key(|e| if e.key == "title" { 0 } else { 1 });

    let lines = split_lines(&normalized[offset..]);
    let mut cleaned = Vec::with_capacity(normalized.len());
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if is_blank_line(line) {
            cleaned.push(b'\n');
            i += 1;
            continue;
        }

        if options.has(Extensions::FOOTNOTES) {
            if let Some((name, contents, consumed)) = scan_footnote_def(&lines[i..]) {
                tables.footnotes.push(FootnoteRef {
                    name,
                    contents,
                    is_used: false,
                    num: 0,
                });
                i += consumed;
                continue;
            }
        }

        if let Some((name, link, title, consumed)) = scan_link_ref(&lines[i..]) {
            tables.link_refs.push(LinkRef { name, link, title });
            i += consumed;
            continue;
        }

        expand_tabs(&mut cleaned, line);
        cleaned.push(b'\n');
        i += 1;
    }

    if cleaned.last() != Some(&b'\n') {
        cleaned.push(b'\n');
    }

    (tables, cleaned)
}

fn strip_bom(input: &[u8]) -> &[u8] {
    if input.starts_with(&BOM) {
        &input[3..]
    } else {
        input
    }
}

/// Normalize `\r\n` and lone `\r` to `\n`.
fn normalize_newlines(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'\r' {
            out.push(b'\n');
            i += if input.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    out
}

fn split_lines(input: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = input.split(|&b| b == b'\n').collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

fn is_blank_line(line: &[u8]) -> bool {
    line.iter().all(|&b| b == b' ' || b == b'\t')
}

fn count_leading_ws(data: &[u8]) -> usize {
    data.iter().take_while(|&&b| b == b' ' || b == b'\t').count()
}

fn trim_leading_ws(data: &[u8]) -> &[u8] {
    &data[count_leading_ws(data)..]
}

// ---- Metadata -------------------------------------------------------------------------------

/// Parse the leading metadata paragraph starting at offset 0 of `data`, appending recognized
/// entries to `metadata`. Returns the byte offset of the first line following the block
/// (including the terminating blank line, which is consumed).
fn parse_metadata_block(data: &[u8], metadata: &mut Vec<MetadataEntry>) -> usize {
    let mut pos = 0;
    let mut current: Option<usize> = None;

    loop {
        if pos >= data.len() {
            break;
        }
        let line_end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| pos + p)
            .unwrap_or(data.len());
        let line = &data[pos..line_end];

        if line.is_empty() {
            pos = (line_end + 1).min(data.len());
            break;
        }

        let starts_with_indent = line[0] == b' ' || line[0] == b'\t';
        let colon = find_unescaped_colon(line);

        if !starts_with_indent && colon.is_some() {
            let colon = colon.unwrap();
            let key = normalize_metadata_key(&line[..colon]);
            let value = trim_leading_ws(&line[colon + 1..]);
            metadata.push(MetadataEntry {
                key,
                value: (!value.is_empty()).then(|| String::from_utf8_lossy(value).into_owned()),
            });
            current = Some(metadata.len() - 1);
        } else if let Some(idx) = current {
            let continuation = trim_leading_ws(line);
            let entry = &mut metadata[idx];
            let mut value = entry.value.take().unwrap_or_default();
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(&String::from_utf8_lossy(continuation));
            entry.value = Some(value);
        }
        // A line that is neither a recognizable `key:` nor a continuation of one is silently
        // dropped from the metadata block — best-effort, matching the rest of this crate.

        if line_end >= data.len() {
            pos = data.len();
            break;
        }
        pos = line_end + 1;
    }

    pos
}

fn find_unescaped_colon(line: &[u8]) -> Option<usize> {
    (0..line.len()).find(|&i| line[i] == b':' && !is_escaped(line, i))
}

fn apply_metadata_overrides(metadata: &mut Vec<MetadataEntry>, overrides: &[(String, String)]) {
    for (key, value) in overrides {
        let key = normalize_metadata_key(key.as_bytes());
        if let Some(entry) = metadata.iter_mut().find(|e| e.key == key) {
            entry.value = Some(value.clone());
        } else {
            metadata.push(MetadataEntry {
                key,
                value: Some(value.clone()),
            });
        }
    }
}

// ---- Footnote & link-reference definitions --------------------------------------------------

/// Recognize `[^name]: contents` at `lines[0]`, absorbing indented continuation lines. Returns
/// the footnote's name, its (possibly multi-line) contents, and the number of lines consumed.
fn scan_footnote_def(lines: &[&[u8]]) -> Option<(Option<String>, String, usize)> {
    let first = lines[0];
    let rest = first.strip_prefix(b"[^")?;
    let close = rest.iter().position(|&b| b == b']')?;
    if rest.get(close + 1) != Some(&b':') {
        return None;
    }
    let name = String::from_utf8_lossy(&rest[..close]).into_owned();
    let body_start = close + 2 + count_leading_ws(&rest[close + 2..]);

    let mut contents = Vec::new();
    contents.extend_from_slice(&rest[body_start..]);

    let mut consumed = 1;
    while consumed < lines.len() {
        let line = lines[consumed];
        if line.is_empty() || !(line[0] == b' ' || line[0] == b'\t') {
            break;
        }
        if !contents.is_empty() {
            contents.push(b'\n');
        }
        contents.extend_from_slice(trim_leading_ws(line));
        consumed += 1;
    }

    Some((
        (!name.is_empty()).then_some(name),
        String::from_utf8_lossy(&contents).into_owned(),
        consumed,
    ))
}

/// Recognize `[name]: link "title"` at `lines[0]`, with an optional wrapped title on the next,
/// indented line.
fn scan_link_ref(lines: &[&[u8]]) -> Option<(Option<String>, String, Option<String>, usize)> {
    let first = lines[0];
    if first.first() != Some(&b'[') {
        return None;
    }
    let close = first.iter().position(|&b| b == b']')?;
    if first.get(close + 1) != Some(&b':') {
        return None;
    }
    let name = String::from_utf8_lossy(&first[1..close]).into_owned();
    if name.is_empty() {
        return None;
    }

    let mut i = close + 2;
    i += count_leading_ws(&first[i..]);
    if i >= first.len() {
        return None;
    }

    let link_start = i;
    let link_end = if first[i] == b'<' {
        i + first[i..].iter().position(|&b| b == b'>')? + 1
    } else {
        let mut e = i;
        while e < first.len() && !first[e].is_ascii_whitespace() {
            e += 1;
        }
        e
    };
    let mut link = String::from_utf8_lossy(&first[link_start..link_end]).into_owned();
    if let Some(stripped) = link.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        link = stripped.to_string();
    }

    let mut consumed = 1;
    let mut title = parse_title(&first[link_end..]);
    if title.is_none() && consumed < lines.len() {
        let next = lines[consumed];
        if next.first().is_some_and(|&b| b == b' ' || b == b'\t') {
            if let Some(t) = parse_title(next) {
                title = Some(t);
                consumed += 1;
            }
        }
    }

    Some((Some(name), link, title, consumed))
}

fn parse_title(bytes: &[u8]) -> Option<String> {
    let s = trim_leading_ws(bytes);
    let quote = *s.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let end = s[1..].iter().position(|&b| b == quote)?;
    Some(String::from_utf8_lossy(&s[1..=end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(ext: Extensions) -> Options {
        Options::new().with_extensions(ext)
    }

    #[test]
    fn strips_bom_and_normalizes_newlines() {
        let mut input = BOM.to_vec();
        input.extend_from_slice(b"a\r\nb\rc\n");
        let (_, cleaned) = run(&input, &opts(Extensions::empty()));
        assert_eq!(cleaned, b"a\nb\nc\n");
    }

    #[test]
    fn extracts_link_reference() {
        let input = b"[id]: http://example.com \"title\"\n\nuse [x][id]\n";
        let (tables, cleaned) = run(input, &opts(Extensions::empty()));
        let r = tables.find_link("id").unwrap();
        assert_eq!(r.link, "http://example.com");
        assert_eq!(r.title.as_deref(), Some("title"));
        assert!(!cleaned.windows(4).any(|w| w == b"[id]"), "the reference-definition line is consumed, not copied through");
        assert_eq!(cleaned, b"\nuse [x][id]\n");
    }

    #[test]
    fn extracts_footnote_definition_with_continuation() {
        let input = b"[^n]: first line\n  continued\ntext\n";
        let (tables, _) = run(input, &opts(Extensions::FOOTNOTES));
        let f = &tables.footnotes[0];
        assert_eq!(f.name.as_deref(), Some("n"));
        assert_eq!(f.contents, "first line\ncontinued");
    }

    #[test]
    fn metadata_continuation_without_colon() {
        let input = b"title: Hello\n  World\nauthor: me\n\nbody\n";
        let (tables, cleaned) = run(input, &opts(Extensions::METADATA));
        assert_eq!(tables.find_metadata("title").unwrap().value.as_deref(), Some("Hello World"));
        assert_eq!(tables.find_metadata("author").unwrap().value.as_deref(), Some("me"));
        assert_eq!(cleaned, b"body\n");
    }

    #[test]
    fn title_metadata_entry_sorts_first() {
        let input = b"author: me\ntitle: Hello\n\nbody\n";
        let (tables, _) = run(input, &opts(Extensions::METADATA));
        assert_eq!(tables.metadata[0].key, "title");
    }

    #[test]
    fn metadata_overrides_replace_existing_and_append_new() {
        let input = b"title: Hello\n\nbody\n";
        let options = opts(Extensions::METADATA)
            .with_metadata_overrides(vec![("title".into(), "Overridden".into()), ("extra".into(), "v".into())]);
        let (tables, _) = run(input, &options);
        assert_eq!(tables.find_metadata("title").unwrap().value.as_deref(), Some("Overridden"));
        assert_eq!(tables.find_metadata("extra").unwrap().value.as_deref(), Some("v"));
    }
}
