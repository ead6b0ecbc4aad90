//! The inline parser: active-character dispatch over a block-supplied span.
//!
//! A 256-entry [`ActiveChar`] table, built once per [`crate::Parser`] from its [`crate::Options`],
//! maps each byte to the inline construct it may start. The main loop in [`parse_span`] walks a
//! span left to right, accumulating runs of inactive bytes into `NormalText` nodes and calling out
//! to a trigger function whenever it crosses an active byte. A trigger that declines (returns
//! `None`) leaves its byte to be swept up as ordinary text — grounded on the upstream algorithm's
//! `active_char` array of function pointers and its "return 0 means not recognized" convention.

use crate::autolink;
use crate::error::Result;
use crate::node::{AutolinkType, NodeId, NodeKind, Tree};
use crate::options::{Extensions, Options};
use crate::reftable::{self, ReferenceTables};
use crate::text;

/// Which inline construct, if any, a byte may start.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ActiveChar {
    None,
    Emphasis,
    CodeSpan,
    LineBreak,
    Link,
    Image,
    Langle,
    Escape,
    Entity,
    AutolinkUrl,
    AutolinkEmail,
    AutolinkWww,
    Superscript,
    Math,
}

/// Immutable parsing configuration threaded through every recursive call.
pub(crate) struct Config<'a> {
    pub options: &'a Options,
    pub active: &'a [ActiveChar; 256],
}

/// Build the dispatch table for a given set of extensions. Bare-URL/email/`www.` autolinking is
/// only wired up when [`Extensions::AUTOLINK`] is set; `~`/`=` only become active delimiters when
/// strikethrough/highlight are enabled, so a disabled extension's trigger byte is simply inert.
pub(crate) fn build_active_table(options: &Options) -> [ActiveChar; 256] {
    let mut table = [ActiveChar::None; 256];
    table[b'\\' as usize] = ActiveChar::Escape;
    table[b'`' as usize] = ActiveChar::CodeSpan;
    table[b'\n' as usize] = ActiveChar::LineBreak;
    table[b'[' as usize] = ActiveChar::Link;
    table[b'!' as usize] = ActiveChar::Image;
    table[b'<' as usize] = ActiveChar::Langle;
    table[b'&' as usize] = ActiveChar::Entity;
    table[b'*' as usize] = ActiveChar::Emphasis;
    table[b'_' as usize] = ActiveChar::Emphasis;
    if options.has(Extensions::STRIKE) {
        table[b'~' as usize] = ActiveChar::Emphasis;
    }
    if options.has(Extensions::HILITE) {
        table[b'=' as usize] = ActiveChar::Emphasis;
    }
    if options.has(Extensions::SUPER) {
        table[b'^' as usize] = ActiveChar::Superscript;
    }
    if options.has(Extensions::MATH) {
        table[b'$' as usize] = ActiveChar::Math;
    }
    if options.has(Extensions::AUTOLINK) {
        table[b':' as usize] = ActiveChar::AutolinkUrl;
        table[b'@' as usize] = ActiveChar::AutolinkEmail;
        table[b'w' as usize] = ActiveChar::AutolinkWww;
    }
    table
}

struct Hit {
    /// Bytes to advance `i` by, starting at the triggering byte.
    consumed: usize,
    /// Bytes to retract from the pending `NormalText` run because this construct claims them.
    rewind: usize,
}

/// Parse `span` as inline content, emitting children of the tree's current cursor. `in_link_body`
/// suppresses autolinks and nested links while parsing a link's visible text.
pub(crate) fn parse_span(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    in_link_body: bool,
    span: &[u8],
) -> Result<()> {
    let mut i = 0;
    let mut text_start = 0;
    while i < span.len() {
        let kind = cfg.active[span[i] as usize];
        if kind == ActiveChar::None {
            i += 1;
            continue;
        }
        if in_link_body
            && matches!(
                kind,
                ActiveChar::AutolinkUrl | ActiveChar::AutolinkEmail | ActiveChar::AutolinkWww
            )
        {
            i += 1;
            continue;
        }
        match dispatch(tree, tables, cfg, in_link_body, span, i, kind)? {
            Some(hit) => {
                let text_end = i - hit.rewind;
                if text_end > text_start {
                    flush_text(tree, &span[text_start..text_end])?;
                }
                i += hit.consumed;
                text_start = i;
            }
            None => i += 1,
        }
    }
    if text_start < span.len() {
        flush_text(tree, &span[text_start..])?;
    }
    Ok(())
}

fn dispatch(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    in_link_body: bool,
    span: &[u8],
    i: usize,
    kind: ActiveChar,
) -> Result<Option<Hit>> {
    match kind {
        ActiveChar::None => unreachable!(),
        ActiveChar::Escape => trigger_escape(tree, cfg, span, i),
        ActiveChar::CodeSpan => trigger_codespan(tree, span, i),
        ActiveChar::LineBreak => trigger_linebreak(tree, span, i),
        ActiveChar::Entity => trigger_entity(tree, span, i),
        ActiveChar::Emphasis => trigger_emphasis(tree, tables, cfg, in_link_body, span, i),
        ActiveChar::Langle => trigger_langle(tree, span, i),
        ActiveChar::Superscript => trigger_superscript(tree, tables, cfg, in_link_body, span, i),
        ActiveChar::Math => trigger_math(tree, span, i),
        ActiveChar::AutolinkUrl => trigger_autolink_url(tree, span, i),
        ActiveChar::AutolinkEmail => trigger_autolink_email(tree, span, i),
        ActiveChar::AutolinkWww => trigger_autolink_www(tree, span, i),
        ActiveChar::Link => trigger_bracket(tree, tables, cfg, in_link_body, span, i, false),
        ActiveChar::Image => {
            if span.get(i + 1) != Some(&b'[') {
                return Ok(None);
            }
            trigger_bracket(tree, tables, cfg, in_link_body, span, i + 1, true)
                .map(|opt| opt.map(|h| Hit { consumed: h.consumed + 1, rewind: h.rewind }))
        }
    }
}

fn push_leaf(tree: &mut Tree, kind: NodeKind) -> Result<NodeId> {
    let id = tree.push(kind)?;
    tree.pop(id);
    Ok(id)
}

fn flush_text(tree: &mut Tree, bytes: &[u8]) -> Result<()> {
    push_leaf(tree, NodeKind::NormalText { text: String::from_utf8_lossy(bytes).into_owned() })?;
    Ok(())
}

// ---- Escape, entity, code span, line break ---------------------------------------------------

const ESCAPABLE: &[u8] = br#"\`*_{}[]()#+-.!:|&<>^~="$"#;

fn trigger_escape(tree: &mut Tree, cfg: &Config, span: &[u8], i: usize) -> Result<Option<Hit>> {
    let Some(&c) = span.get(i + 1) else { return Ok(None) };

    if cfg.options.has(Extensions::MATH) && (c == b'(' || c == b'[') {
        let close_byte = if c == b'(' { b')' } else { b']' };
        if let Some(close) = find_subslice(&span[i + 2..], &[b'\\', close_byte]) {
            let end = i + 2 + close;
            let text = String::from_utf8_lossy(&span[i + 2..end]).into_owned();
            push_leaf(tree, NodeKind::MathBlock { text, blockmode: c == b'[' })?;
            return Ok(Some(Hit { consumed: end + 2 - i, rewind: 0 }));
        }
    }

    if cfg.options.has(Extensions::COMMONMARK) && c == b'\n' {
        push_leaf(tree, NodeKind::LineBreak)?;
        return Ok(Some(Hit { consumed: 2, rewind: 0 }));
    }

    if !ESCAPABLE.contains(&c) {
        return Ok(None);
    }
    push_leaf(tree, NodeKind::NormalText { text: (c as char).to_string() })?;
    Ok(Some(Hit { consumed: 2, rewind: 0 }))
}

fn trigger_entity(tree: &mut Tree, span: &[u8], i: usize) -> Result<Option<Hit>> {
    let mut j = i + 1;
    if span.get(j) == Some(&b'#') {
        j += 1;
    }
    let start = j;
    while span.get(j).is_some_and(u8::is_ascii_alphanumeric) {
        j += 1;
    }
    if j == start || span.get(j) != Some(&b';') {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&span[i..=j]).into_owned();
    push_leaf(tree, NodeKind::Entity { text })?;
    Ok(Some(Hit { consumed: j + 1 - i, rewind: 0 }))
}

fn trigger_codespan(tree: &mut Tree, span: &[u8], i: usize) -> Result<Option<Hit>> {
    let open_len = run_length(span, i, b'`');
    let mut j = i + open_len;
    loop {
        let Some(rel) = find_run(&span[j..], b'`', open_len) else { return Ok(None) };
        let run_start = j + rel;
        let run_len = run_length(span, run_start, b'`');
        if run_len == open_len {
            let mut content = &span[i + open_len..run_start];
            if content.len() >= 2 && content.first() == Some(&b' ') && content.last() == Some(&b' ')
            {
                content = &content[1..content.len() - 1];
            }
            push_leaf(tree, NodeKind::CodeSpan { text: String::from_utf8_lossy(content).into_owned() })?;
            return Ok(Some(Hit { consumed: run_start + run_len - i, rewind: 0 }));
        }
        j = run_start + run_len;
    }
}

fn trigger_linebreak(tree: &mut Tree, span: &[u8], i: usize) -> Result<Option<Hit>> {
    if i < 2 || span[i - 1] != b' ' || span[i - 2] != b' ' {
        return Ok(None);
    }
    push_leaf(tree, NodeKind::LineBreak)?;
    let mut consumed = 1;
    while span.get(i + consumed) == Some(&b' ') {
        consumed += 1;
    }
    Ok(Some(Hit { consumed, rewind: 2 }))
}

// ---- Emphasis family --------------------------------------------------------------------------

fn trigger_emphasis(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    in_link_body: bool,
    span: &[u8],
    i: usize,
) -> Result<Option<Hit>> {
    let ch = span[i];
    let run = run_length(span, i, ch).min(3);
    if span.get(i + run).is_some_and(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let open_len = if ch == b'~' || ch == b'=' {
        if run < 2 {
            return Ok(None);
        }
        2
    } else {
        run
    };

    let Some(close_pos) = find_closing_run(span, i + open_len, ch, open_len) else {
        return Ok(None);
    };

    if cfg.options.has(Extensions::NO_INTRA_EMPHASIS)
        && open_len == 1
        && span.get(close_pos + open_len).is_some_and(u8::is_ascii_alphanumeric)
    {
        return Ok(None);
    }

    let inner = &span[i + open_len..close_pos];
    let kind = match (open_len, ch) {
        (3, _) => NodeKind::TripleEmphasis,
        (2, b'~') => NodeKind::Strikethrough,
        (2, b'=') => NodeKind::Highlight,
        (2, _) => NodeKind::DoubleEmphasis,
        _ => NodeKind::Emphasis,
    };
    let id = tree.push(kind)?;
    parse_span(tree, tables, cfg, in_link_body, inner)?;
    tree.pop(id);

    Ok(Some(Hit { consumed: close_pos + open_len - i, rewind: 0 }))
}

/// Scan forward from `from` for a run of at least `open_len` copies of `ch`, not immediately
/// preceded by whitespace, skipping over code spans and bracketed link/image constructs (plus
/// their `(url)`/`[ref]` trailer) along the way, so a delimiter inside either never closes the
/// emphasis early. Returns the start of the matched run.
fn find_closing_run(span: &[u8], from: usize, ch: u8, open_len: usize) -> Option<usize> {
    let mut j = from;
    while j < span.len() {
        match span[j] {
            b'`' => {
                let n = run_length(span, j, b'`');
                match find_run(&span[j + n..], b'`', n) {
                    Some(rel) => j = j + n + rel + n,
                    None => j += n,
                }
            }
            b'[' => {
                let Some(close) = find_matching_bracket(span, j) else {
                    j += 1;
                    continue;
                };
                let mut end = close + 1;
                match span.get(end) {
                    Some(&b'(') => {
                        if let Some(p) = find_matching_paren(span, end + 1) {
                            end = p + 1;
                        }
                    }
                    Some(&b'[') => {
                        if let Some(c2) = find_matching_bracket(span, end) {
                            end = c2 + 1;
                        }
                    }
                    _ => {}
                }
                j = end;
            }
            b if b == ch => {
                if j > 0 && span[j - 1].is_ascii_whitespace() {
                    j += run_length(span, j, ch);
                    continue;
                }
                let run_start = j;
                let len = run_length(span, j, ch);
                if len >= open_len {
                    return Some(run_start);
                }
                j += len;
            }
            _ => j += 1,
        }
    }
    None
}

fn run_length(span: &[u8], from: usize, byte: u8) -> usize {
    let mut n = 0;
    while span.get(from + n) == Some(&byte) {
        n += 1;
    }
    n
}

fn find_run(haystack: &[u8], byte: u8, n: usize) -> Option<usize> {
    let mut j = 0;
    while j < haystack.len() {
        if haystack[j] == byte {
            let start = j;
            let len = run_length(haystack, j, byte);
            if len >= n {
                return Some(start);
            }
            j += len;
        } else {
            j += 1;
        }
    }
    None
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    memchr::memmem::find(haystack, needle)
}

// ---- Superscript and math ----------------------------------------------------------------------

fn trigger_superscript(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    in_link_body: bool,
    span: &[u8],
    i: usize,
) -> Result<Option<Hit>> {
    let (inner_start, inner_end, consumed_end) = if span.get(i + 1) == Some(&b'(') {
        let Some(close) = find_matching_paren(span, i + 2) else { return Ok(None) };
        (i + 2, close, close + 1)
    } else {
        let mut j = i + 1;
        while j < span.len() && !span[j].is_ascii_whitespace() {
            j += 1;
        }
        if j == i + 1 {
            return Ok(None);
        }
        (i + 1, j, j)
    };
    let id = tree.push(NodeKind::Superscript)?;
    parse_span(tree, tables, cfg, in_link_body, &span[inner_start..inner_end])?;
    tree.pop(id);
    Ok(Some(Hit { consumed: consumed_end - i, rewind: 0 }))
}

fn find_matching_paren(span: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0;
    let mut j = start;
    while j < span.len() {
        match span[j] {
            b'\\' if j + 1 < span.len() => j += 2,
            b'(' => {
                depth += 1;
                j += 1;
            }
            b')' => {
                if depth == 0 {
                    return Some(j);
                }
                depth -= 1;
                j += 1;
            }
            _ => j += 1,
        }
    }
    None
}

fn trigger_math(tree: &mut Tree, span: &[u8], i: usize) -> Result<Option<Hit>> {
    let block = span.get(i + 1) == Some(&b'$');
    let marker: &[u8] = if block { b"$$" } else { b"$" };
    let start = i + marker.len();
    let Some(rel) = find_subslice(&span[start..], marker) else { return Ok(None) };
    let end = start + rel;
    let text = String::from_utf8_lossy(&span[start..end]).into_owned();
    push_leaf(tree, NodeKind::MathBlock { text, blockmode: block })?;
    Ok(Some(Hit { consumed: end + marker.len() - i, rewind: 0 }))
}

// ---- Angle-bracket tags and autolinks -----------------------------------------------------------

fn trigger_langle(tree: &mut Tree, span: &[u8], i: usize) -> Result<Option<Hit>> {
    let rest = &span[i..];

    if rest.starts_with(b"<!--") {
        let Some(rel) = find_subslice(&rest[4..], b"-->") else { return Ok(None) };
        let end = 4 + rel + 3;
        push_leaf(tree, NodeKind::RawHtml { text: String::from_utf8_lossy(&rest[..end]).into_owned() })?;
        return Ok(Some(Hit { consumed: end, rewind: 0 }));
    }

    let Some(close) = memchr::memchr(b'>', rest) else { return Ok(None) };
    let inner = &rest[1..close];
    if inner.is_empty() {
        return Ok(None);
    }

    if !inner.iter().any(|&b| b.is_ascii_whitespace()) {
        if let Some(colon) = inner.iter().position(|&b| b == b':') {
            let scheme = &inner[..colon];
            if !scheme.is_empty() && scheme.iter().all(u8::is_ascii_alphabetic) {
                let text = String::from_utf8_lossy(inner).into_owned();
                push_leaf(
                    tree,
                    NodeKind::LinkAuto { kind: AutolinkType::Normal, link: text.clone(), text },
                )?;
                return Ok(Some(Hit { consumed: close + 1, rewind: 0 }));
            }
        }
        if inner.iter().filter(|&&b| b == b'@').count() == 1 {
            let text = String::from_utf8_lossy(inner).into_owned();
            let link = format!("mailto:{text}");
            push_leaf(tree, NodeKind::LinkAuto { kind: AutolinkType::Email, link, text })?;
            return Ok(Some(Hit { consumed: close + 1, rewind: 0 }));
        }
    }

    if is_html_tag(inner) {
        let text = String::from_utf8_lossy(&rest[..=close]).into_owned();
        push_leaf(tree, NodeKind::RawHtml { text })?;
        return Ok(Some(Hit { consumed: close + 1, rewind: 0 }));
    }

    Ok(None)
}

fn is_html_tag(inner: &[u8]) -> bool {
    let mut s = inner;
    if s.first() == Some(&b'/') {
        s = &s[1..];
    }
    s = s.strip_suffix(b"/").unwrap_or(s);
    s.first().is_some_and(u8::is_ascii_alphabetic)
}

fn trigger_autolink_url(tree: &mut Tree, span: &[u8], i: usize) -> Result<Option<Hit>> {
    let Some(m) = autolink::autolink_url(span, i) else { return Ok(None) };
    let text = String::from_utf8_lossy(&span[i - m.rewind..i + m.len]).into_owned();
    push_leaf(tree, NodeKind::LinkAuto { kind: AutolinkType::Normal, link: text.clone(), text })?;
    Ok(Some(Hit { consumed: m.len, rewind: m.rewind }))
}

fn trigger_autolink_email(tree: &mut Tree, span: &[u8], i: usize) -> Result<Option<Hit>> {
    let Some(m) = autolink::autolink_email(span, i) else { return Ok(None) };
    let text = String::from_utf8_lossy(&span[i - m.rewind..i + m.len]).into_owned();
    let link = format!("mailto:{text}");
    push_leaf(tree, NodeKind::LinkAuto { kind: AutolinkType::Email, link, text })?;
    Ok(Some(Hit { consumed: m.len, rewind: m.rewind }))
}

fn trigger_autolink_www(tree: &mut Tree, span: &[u8], i: usize) -> Result<Option<Hit>> {
    let Some(m) = autolink::autolink_www(span, i) else { return Ok(None) };
    let text = String::from_utf8_lossy(&span[i - m.rewind..i + m.len]).into_owned();
    let link = format!("http://{text}");
    push_leaf(tree, NodeKind::LinkAuto { kind: AutolinkType::Normal, link, text })?;
    Ok(Some(Hit { consumed: m.len, rewind: m.rewind }))
}

// ---- Links, images, footnote refs, metadata refs -----------------------------------------------

fn trigger_bracket(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    in_link_body: bool,
    span: &[u8],
    i: usize,
    is_image: bool,
) -> Result<Option<Hit>> {
    if !is_image && in_link_body {
        return Ok(None);
    }
    let Some(close) = find_matching_bracket(span, i) else { return Ok(None) };
    let content = &span[i + 1..close];
    let after = close + 1;

    if !is_image && cfg.options.has(Extensions::FOOTNOTES) && content.first() == Some(&b'^') {
        return footnote_ref(tree, tables, span, i, after, &content[1..]);
    }
    if !is_image && cfg.options.has(Extensions::METADATA) && content.first() == Some(&b'%') {
        return metadata_ref(tree, tables, span, i, after, &content[1..]);
    }

    if span.get(after) == Some(&b'(') {
        if let Some((link, title, dims, end)) = parse_inline_dest(span, after) {
            let end = maybe_apply_image_attrs(tree, cfg, is_image, span, end);
            emit_link_or_image(tree, tables, cfg, in_link_body, is_image, content, link, title, dims)?;
            return Ok(Some(Hit { consumed: end - i, rewind: 0 }));
        }
        return literal(tree, span, i, after).map(Some);
    }

    if span.get(after) == Some(&b'[') {
        if let Some(close2) = find_matching_bracket(span, after) {
            let idtext = &span[after + 1..close2];
            let key = if idtext.is_empty() { space_normalize(content) } else { space_normalize(idtext) };
            let end = close2 + 1;
            return resolve_ref(tree, tables, cfg, in_link_body, is_image, span, i, end, content, &key);
        }
    }

    let key = space_normalize(content);
    resolve_ref(tree, tables, cfg, in_link_body, is_image, span, i, after, content, &key)
}

fn footnote_ref(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    span: &[u8],
    i: usize,
    after: usize,
    name_bytes: &[u8],
) -> Result<Option<Hit>> {
    let name = String::from_utf8_lossy(name_bytes).into_owned();
    match tables.find_footnote_index(&name) {
        Some(idx) if !tables.footnotes[idx].is_used => {
            let num = tables.footnotes.iter().filter(|f| f.is_used).count() + 1;
            tables.footnotes[idx].is_used = true;
            tables.footnotes[idx].num = num;
            push_leaf(tree, NodeKind::FootnoteRef { num })?;
            Ok(Some(Hit { consumed: after - i, rewind: 0 }))
        }
        _ => literal(tree, span, i, after).map(Some),
    }
}

fn metadata_ref(
    tree: &mut Tree,
    tables: &ReferenceTables,
    span: &[u8],
    i: usize,
    after: usize,
    key_bytes: &[u8],
) -> Result<Option<Hit>> {
    let key = reftable::normalize_key(key_bytes);
    if let Some(entry) = tables.find_metadata(&key) {
        if let Some(value) = entry.value.clone() {
            push_leaf(tree, NodeKind::NormalText { text: value })?;
        }
    }
    Ok(Some(Hit { consumed: after - i, rewind: 0 }))
}

fn literal(tree: &mut Tree, span: &[u8], start: usize, end: usize) -> Result<Hit> {
    push_leaf(tree, NodeKind::NormalText { text: String::from_utf8_lossy(&span[start..end]).into_owned() })?;
    Ok(Hit { consumed: end - start, rewind: 0 })
}

#[allow(clippy::too_many_arguments)]
fn resolve_ref(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    in_link_body: bool,
    is_image: bool,
    span: &[u8],
    i: usize,
    end: usize,
    content: &[u8],
    key: &str,
) -> Result<Option<Hit>> {
    let Some(r) = tables.find_link(key) else { return literal(tree, span, i, end).map(Some) };
    let link = r.link.clone();
    let title = r.title.clone();
    let end = maybe_apply_image_attrs(tree, cfg, is_image, span, end);
    emit_link_or_image(tree, tables, cfg, in_link_body, is_image, content, link, title, None)?;
    Ok(Some(Hit { consumed: end - i, rewind: 0 }))
}

#[allow(clippy::too_many_arguments)]
fn emit_link_or_image(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    in_link_body: bool,
    is_image: bool,
    content: &[u8],
    link: String,
    title: Option<String>,
    dims: Option<String>,
) -> Result<()> {
    if is_image {
        let alt = String::from_utf8_lossy(content).into_owned();
        push_leaf(
            tree,
            NodeKind::Image { link, title, dims, alt, attr_width: None, attr_height: None },
        )?;
    } else {
        let id = tree.push(NodeKind::Link { link, title })?;
        parse_span(tree, tables, cfg, true, content)?;
        tree.pop(id);
        let _ = in_link_body; // the nested call always sets in_link_body; kept for symmetry/readability
    }
    Ok(())
}

fn maybe_apply_image_attrs(tree: &mut Tree, cfg: &Config, is_image: bool, span: &[u8], end: usize) -> usize {
    if !is_image || !cfg.options.has(Extensions::IMG_EXT) {
        return end;
    }
    apply_image_attrs(tree, span, end)
}

/// `{width=.. height=..}` following an image. Appended to the image node created immediately
/// before this call. Unbalanced braces abort with no consumption.
fn apply_image_attrs(tree: &mut Tree, span: &[u8], start: usize) -> usize {
    if span.get(start) != Some(&b'{') {
        return start;
    }
    let Some(rel) = memchr::memchr(b'}', &span[start..]) else { return start };
    let end = start + rel;
    let body = &span[start + 1..end];
    let mut width = None;
    let mut height = None;
    for token in body.split(u8::is_ascii_whitespace).filter(|t| !t.is_empty()) {
        if let Some(eq) = token.iter().position(|&b| b == b'=') {
            let (key, val) = (&token[..eq], &token[eq + 1..]);
            let parsed = std::str::from_utf8(val).ok().and_then(|s| s.parse::<u32>().ok());
            match key {
                b"width" => width = parsed,
                b"height" => height = parsed,
                _ => {}
            }
        }
    }
    let current = tree.current();
    if let Some(node) = tree.last_child_mut(current) {
        if let NodeKind::Image { attr_width, attr_height, .. } = &mut node.kind {
            *attr_width = width;
            *attr_height = height;
        }
    }
    end + 1
}

fn find_matching_bracket(span: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut j = open;
    while j < span.len() {
        match span[j] {
            b'\\' if j + 1 < span.len() => j += 2,
            b'[' => {
                depth += 1;
                j += 1;
            }
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
                j += 1;
            }
            b'`' => {
                let n = run_length(span, j, b'`');
                match find_run(&span[j + n..], b'`', n) {
                    Some(rel) => j = j + n + rel + n,
                    None => j += n,
                }
            }
            _ => j += 1,
        }
    }
    None
}

fn space_normalize(bytes: &[u8]) -> String {
    let mut out = Vec::new();
    text::replace_spacing(&mut out, bytes);
    String::from_utf8_lossy(&out).into_owned()
}

fn count_ws(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_whitespace()).count()
}

/// Parse `(url "title" =WxH)` starting at `span[lparen] == '('`. Title and a `=WxH` dimension hint
/// may appear in either order; the URL allows balanced parens and backslash escapes.
fn parse_inline_dest(span: &[u8], lparen: usize) -> Option<(String, Option<String>, Option<String>, usize)> {
    let mut j = lparen + 1 + count_ws(&span[lparen + 1..]);

    let link_start = j;
    let link_end = if span.get(j) == Some(&b'<') {
        j + span[j..].iter().position(|&b| b == b'>')? + 1
    } else {
        let mut depth = 0i32;
        while j < span.len() {
            match span[j] {
                b'\\' if j + 1 < span.len() => j += 2,
                b'(' => {
                    depth += 1;
                    j += 1;
                }
                b')' if depth > 0 => {
                    depth -= 1;
                    j += 1;
                }
                b')' => break,
                b if b.is_ascii_whitespace() => break,
                _ => j += 1,
            }
        }
        j
    };
    let mut raw = &span[link_start..link_end];
    if let Some(stripped) = raw.strip_prefix(b"<").and_then(|s| s.strip_suffix(b">")) {
        raw = stripped;
    }
    let mut link_buf = Vec::new();
    text::unescape_text(&mut link_buf, raw);
    let link = String::from_utf8_lossy(&link_buf).into_owned();

    j = link_end;
    let mut title = None;
    let mut dims = None;
    loop {
        j += count_ws(&span[j..]);
        match span.get(j) {
            Some(&b')') => break,
            Some(&q) if q == b'"' || q == b'\'' => {
                let tstart = j + 1;
                let tend = tstart + span[tstart..].iter().position(|&b| b == q)?;
                title = Some(String::from_utf8_lossy(&span[tstart..tend]).into_owned());
                j = tend + 1;
            }
            Some(&b'=') => {
                let dstart = j + 1;
                let mut k = dstart;
                while k < span.len() && span[k] != b')' && !span[k].is_ascii_whitespace() {
                    k += 1;
                }
                dims = Some(String::from_utf8_lossy(&span[dstart..k]).into_owned());
                j = k;
            }
            _ => return None,
        }
    }
    Some((link, title, dims, j + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Tree;
    use crate::options::Options;

    fn run(src: &[u8], options: Options, tables: &mut ReferenceTables) -> crate::node::Document {
        let mut tree = Tree::new(options.maxdepth());
        let active = build_active_table(&options);
        let cfg = Config { options: &options, active: &active };
        parse_span(&mut tree, tables, &cfg, false, src).unwrap();
        tree.finish()
    }

    fn texts(doc: &crate::node::Document) -> Vec<String> {
        doc.iter_depth_first()
            .filter_map(|n| match &n.kind {
                NodeKind::NormalText { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plain_text_round_trips() {
        let mut tables = ReferenceTables::default();
        let doc = run(b"hello world", Options::new(), &mut tables);
        assert_eq!(texts(&doc), vec!["hello world"]);
    }

    #[test]
    fn single_emphasis_wraps_content() {
        let mut tables = ReferenceTables::default();
        let doc = run(b"a *b* c", Options::new(), &mut tables);
        let has_emphasis = doc.iter_depth_first().any(|n| matches!(n.kind, NodeKind::Emphasis));
        assert!(has_emphasis);
        assert_eq!(texts(&doc), vec!["a ", "b", " c"]);
    }

    #[test]
    fn emphasis_closing_run_skips_over_a_bracketed_link() {
        let mut tables = ReferenceTables::default();
        let doc = run(b"a *b [c*d](e)* f", Options::new(), &mut tables);

        let emphasis = doc
            .iter_depth_first()
            .find(|n| matches!(n.kind, NodeKind::Emphasis))
            .expect("the `*` inside [c*d] must not close the emphasis early");
        let child_kinds: Vec<&str> = doc
            .children(emphasis.id)
            .iter()
            .map(|&id| match &doc.node(id).kind {
                NodeKind::NormalText { .. } => "text",
                NodeKind::Link { .. } => "link",
                _ => "other",
            })
            .collect();
        assert_eq!(child_kinds, vec!["text", "link"], "emphasis spans the leading text and the whole link");

        let link = doc.iter_depth_first().find_map(|n| match &n.kind {
            NodeKind::Link { link, .. } => Some(link.clone()),
            _ => None,
        });
        assert_eq!(link.as_deref(), Some("e"), "the link inside the emphasis still resolves normally");

        assert_eq!(texts(&doc), vec!["a ", "b ", "c*d", " f"]);
    }

    #[test]
    fn code_span_trims_one_space_each_side() {
        let mut tables = ReferenceTables::default();
        let doc = run(b"` code `", Options::new(), &mut tables);
        let code = doc
            .iter_depth_first()
            .find_map(|n| match &n.kind {
                NodeKind::CodeSpan { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(code, "code");
    }

    #[test]
    fn escape_emits_literal_byte() {
        let mut tables = ReferenceTables::default();
        let doc = run(b"a\\*b", Options::new(), &mut tables);
        assert_eq!(texts(&doc), vec!["a", "*", "b"]);
    }

    #[test]
    fn reference_link_resolves() {
        let mut tables = ReferenceTables::default();
        tables.link_refs.push(crate::reftable::LinkRef {
            name: Some("id".into()),
            link: "http://example.com".into(),
            title: None,
        });
        let doc = run(b"see [text][id] now", Options::new(), &mut tables);
        let link = doc.iter_depth_first().find_map(|n| match &n.kind {
            NodeKind::Link { link, .. } => Some(link.clone()),
            _ => None,
        });
        assert_eq!(link.as_deref(), Some("http://example.com"));
    }

    #[test]
    fn unresolved_reference_falls_back_to_literal() {
        let mut tables = ReferenceTables::default();
        let doc = run(b"[text][missing]", Options::new(), &mut tables);
        assert_eq!(texts(&doc), vec!["[text][missing]"]);
    }

    #[test]
    fn autolink_url_is_recognized_when_enabled() {
        let mut tables = ReferenceTables::default();
        let options = Options::new().with_extensions(Extensions::AUTOLINK);
        let doc = run(b"see http://example.com now", options, &mut tables);
        let link = doc.iter_depth_first().find_map(|n| match &n.kind {
            NodeKind::LinkAuto { link, .. } => Some(link.clone()),
            _ => None,
        });
        assert_eq!(link.as_deref(), Some("http://example.com"));
    }

    #[test]
    fn footnote_reference_is_consumed_once() {
        let mut tables = ReferenceTables::default();
        tables.footnotes.push(crate::reftable::FootnoteRef {
            name: Some("n".into()),
            contents: "body".into(),
            is_used: false,
            num: 0,
        });
        let options = Options::new().with_extensions(Extensions::FOOTNOTES);
        let doc = run(b"a[^n] b[^n]", options, &mut tables);
        let refs: Vec<_> = doc
            .iter_depth_first()
            .filter(|n| matches!(n.kind, NodeKind::FootnoteRef { .. }))
            .collect();
        assert_eq!(refs.len(), 1);
        assert!(tables.footnotes[0].is_used);
    }
}
