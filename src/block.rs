//! The block parser: a line-oriented recognizer that walks the cleaned text buffer, tries each
//! block rule in priority order at the current line, and recurses into the inline parser for any
//! span of text that isn't itself a nested block. Grounded on the upstream algorithm's
//! `parse_block` dispatch and its per-construct `blockcode_*`/`parse_list*`/`parse_table*`
//! functions, reshaped around this crate's line-slice-based cursor instead of in-place buffer
//! mutation.

use crate::inline::{self, Config};
use crate::node::{CellFlags, ListFlags, NodeKind, Tree};
use crate::options::Extensions;
use crate::reftable::ReferenceTables;
use crate::error::Result;

const HTML_BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "del", "details", "dialog", "dd", "div", "dl",
    "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hgroup", "iframe", "ins", "li", "main", "math", "nav", "noscript", "ol", "p", "pre",
    "section", "script", "style", "table", "ul",
];

/// Parse `text` as a sequence of blocks, emitting them as children of the tree's current cursor.
/// Used both for the whole document body and recursively for blockquote/list-item contents.
pub(crate) fn parse_blocks(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    text: &[u8],
) -> Result<()> {
    let lines = split_lines(text);
    let mut i = 0;
    while i < lines.len() {
        i = parse_one(tree, tables, cfg, &lines, i)?;
    }
    Ok(())
}

fn parse_one(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    lines: &[&[u8]],
    i: usize,
) -> Result<usize> {
    if is_blank(lines[i]) {
        return Ok(i + 1);
    }
    if let Some(n) = try_atx_header(tree, tables, cfg, lines[i])? {
        return Ok(i + n);
    }
    if let Some(n) = try_html_block(tree, lines, i)? {
        return Ok(n);
    }
    if try_hrule_line(lines[i]) {
        leaf(tree, NodeKind::Hrule)?;
        return Ok(i + 1);
    }
    if cfg.options.has(Extensions::FENCED) {
        if let Some(n) = try_fenced_code(tree, lines, i)? {
            return Ok(n);
        }
    }
    if cfg.options.has(Extensions::TABLES) {
        if let Some(n) = try_table(tree, tables, cfg, lines, i)? {
            return Ok(n);
        }
    }
    if let Some(n) = try_blockquote(tree, tables, cfg, lines, i)? {
        return Ok(n);
    }
    if !cfg.options.has(Extensions::NO_CODE_INDENT) {
        if let Some(n) = try_indented_code(tree, lines, i)? {
            return Ok(n);
        }
    }
    if let Some(n) = try_list(tree, tables, cfg, lines, i, ListKind::Unordered)? {
        return Ok(n);
    }
    if let Some(n) = try_list(tree, tables, cfg, lines, i, ListKind::Ordered)? {
        return Ok(n);
    }
    try_paragraph(tree, tables, cfg, lines, i)
}

fn leaf(tree: &mut Tree, kind: NodeKind) -> Result<()> {
    let id = tree.push(kind)?;
    tree.pop(id);
    Ok(())
}

fn split_lines(text: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = text.split(|&b| b == b'\n').collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| b == b' ' || b == b'\t')
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().take_while(|&&b| b.is_ascii_whitespace()).count();
    let end = bytes.iter().rev().take_while(|&&b| b.is_ascii_whitespace()).count();
    if start + end >= bytes.len() {
        &bytes[0..0]
    } else {
        &bytes[start..bytes.len() - end]
    }
}

fn leading_spaces(line: &[u8]) -> usize {
    line.iter().take_while(|&&b| b == b' ').count()
}

// ---- ATX / setext headers ----------------------------------------------------------------------

fn atx_level(line: &[u8], cfg: &Config) -> Option<usize> {
    let indent = leading_spaces(line).min(3);
    let rest = &line[indent..];
    let level = rest.iter().take_while(|&&b| b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    if cfg.options.has(Extensions::COMMONMARK) && !matches!(rest.get(level), None | Some(&b' ')) {
        return None;
    }
    Some(level)
}

fn try_atx_header(tree: &mut Tree, tables: &mut ReferenceTables, cfg: &Config, line: &[u8]) -> Result<Option<usize>> {
    let Some(level) = atx_level(line, cfg) else { return Ok(None) };
    let indent = leading_spaces(line).min(3);
    let mut content = trim(&line[indent + level..]);
    let trailing_hashes = content.iter().rev().take_while(|&&b| b == b'#').count();
    if trailing_hashes > 0 {
        content = trim(&content[..content.len() - trailing_hashes]);
    }
    let id = tree.push(NodeKind::Header { level: (level - 1) as u8 })?;
    inline::parse_span(tree, tables, cfg, false, content)?;
    tree.pop(id);
    Ok(Some(1))
}

fn is_setext_underline(line: &[u8]) -> bool {
    let indent = leading_spaces(line).min(3);
    let rest = &line[indent..];
    !rest.is_empty() && (rest.iter().all(|&b| b == b'=') || rest.iter().all(|&b| b == b'-'))
}

// ---- HTML blocks ---------------------------------------------------------------------------

fn try_html_block(tree: &mut Tree, lines: &[&[u8]], i: usize) -> Result<Option<usize>> {
    let line = lines[i];
    if line.first() != Some(&b'<') {
        return Ok(None);
    }

    if line.len() >= 3 && line[..3].eq_ignore_ascii_case(b"<hr") && line.contains(&b'>') {
        leaf(tree, NodeKind::Hrule)?;
        return Ok(Some(i + 1));
    }

    if line.starts_with(b"<!--") {
        let mut j = i;
        let mut text = Vec::new();
        loop {
            text.extend_from_slice(lines[j]);
            text.push(b'\n');
            let closed = find_subslice(lines[j], b"-->").is_some();
            j += 1;
            if closed || j >= lines.len() {
                break;
            }
        }
        push_block_html(tree, text)?;
        return Ok(Some(j));
    }

    let Some(tag) = extract_tag_name(line) else { return Ok(None) };
    if !HTML_BLOCK_TAGS.iter().any(|t| t.as_bytes().eq_ignore_ascii_case(tag)) {
        return Ok(None);
    }

    let is_ins_or_del = tag.eq_ignore_ascii_case(b"ins") || tag.eq_ignore_ascii_case(b"del");
    let end = html_block_strict_end(lines, i, tag)
        .or_else(|| if is_ins_or_del { None } else { html_block_loose_end(lines, i, tag) });
    let Some(j) = end else { return Ok(None) };

    let mut text = Vec::new();
    for line in &lines[i..j] {
        text.extend_from_slice(line);
        text.push(b'\n');
    }
    push_block_html(tree, text)?;
    Ok(Some(j))
}

/// True if `bytes` is exactly `</tag>`, case-insensitively.
fn is_closing_tag(bytes: &[u8], tag: &[u8]) -> bool {
    bytes.len() == tag.len() + 3
        && bytes[0] == b'<'
        && bytes[1] == b'/'
        && bytes[2..2 + tag.len()].eq_ignore_ascii_case(tag)
        && bytes[bytes.len() - 1] == b'>'
}

fn line_contains_closing_tag(line: &[u8], tag: &[u8]) -> bool {
    let needle_len = tag.len() + 3;
    if line.len() < needle_len {
        return false;
    }
    memchr::memchr_iter(b'<', line)
        .any(|start| start + needle_len <= line.len() && is_closing_tag(&line[start..start + needle_len], tag))
}

/// Strict scan: find a line whose trimmed content is exactly the closing tag, followed by a
/// blank line. Lines that fail the blank-line check don't stop the scan — later lines are still
/// tried, matching the upstream algorithm's `htmlblock_find_end_strict`.
fn html_block_strict_end(lines: &[&[u8]], i: usize, tag: &[u8]) -> Option<usize> {
    for j in i..lines.len() {
        if is_closing_tag(trim(lines[j]), tag) && lines.get(j + 1).is_some_and(|l| is_blank(l)) {
            return Some(j + 1);
        }
    }
    None
}

/// Loose scan: find the first line containing the closing tag anywhere, with no requirement on
/// what follows. Excluded for `ins`/`del` by the caller, following original Markdown.pl.
fn html_block_loose_end(lines: &[&[u8]], i: usize, tag: &[u8]) -> Option<usize> {
    (i..lines.len()).find(|&j| line_contains_closing_tag(lines[j], tag)).map(|j| j + 1)
}

fn push_block_html(tree: &mut Tree, mut text: Vec<u8>) -> Result<()> {
    text.pop(); // trailing '\n' added by the loop that built it
    leaf(tree, NodeKind::BlockHtml { text: String::from_utf8_lossy(&text).into_owned() })
}

fn extract_tag_name(line: &[u8]) -> Option<&[u8]> {
    let mut s = &line[1..];
    if s.first() == Some(&b'/') {
        s = &s[1..];
    }
    let len = s.iter().take_while(|&&b| b.is_ascii_alphanumeric()).count();
    (len > 0).then(|| &s[..len])
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    memchr::memmem::find(haystack, needle)
}

// ---- Horizontal rule ------------------------------------------------------------------------

fn try_hrule_line(line: &[u8]) -> bool {
    let indent = leading_spaces(line).min(3);
    let rest = &line[indent..];
    let Some(&first) = rest.iter().find(|&&b| b != b' ') else { return false };
    if !matches!(first, b'*' | b'-' | b'_') {
        return false;
    }
    if !rest.iter().all(|&b| b == b' ' || b == first) {
        return false;
    }
    rest.iter().filter(|&&b| b == first).count() >= 3
}

// ---- Fenced code ----------------------------------------------------------------------------

fn fence_prefix(line: &[u8]) -> Option<(usize, u8, usize)> {
    let indent = leading_spaces(line).min(3);
    let rest = &line[indent..];
    let ch = *rest.first()?;
    if ch != b'`' && ch != b'~' {
        return None;
    }
    let len = rest.iter().take_while(|&&b| b == ch).count();
    (len >= 3).then_some((indent, ch, len))
}

fn try_fenced_code(tree: &mut Tree, lines: &[&[u8]], i: usize) -> Result<Option<usize>> {
    let Some((indent, ch, fence_len)) = fence_prefix(lines[i]) else { return Ok(None) };
    let lang_raw = trim(&lines[i][indent + fence_len..]);
    let lang = (!lang_raw.is_empty()).then(|| String::from_utf8_lossy(lang_raw).into_owned());

    let mut j = i + 1;
    let mut text = Vec::new();
    while j < lines.len() {
        let l = lines[j];
        let li = leading_spaces(l).min(3);
        let rest = &l[li..];
        let run = rest.iter().take_while(|&&b| b == ch).count();
        if run >= fence_len && rest[run..].iter().all(|&b| b == b' ') {
            j += 1;
            break;
        }
        text.extend_from_slice(l);
        text.push(b'\n');
        j += 1;
    }
    log::trace!("fenced code block matched: lang={lang:?}, fence='{}'x{fence_len}", ch as char);
    leaf(tree, NodeKind::BlockCode { text: String::from_utf8_lossy(&text).into_owned(), lang })?;
    Ok(Some(j))
}

// ---- Indented code --------------------------------------------------------------------------

fn try_indented_code(tree: &mut Tree, lines: &[&[u8]], i: usize) -> Result<Option<usize>> {
    if leading_spaces(lines[i]) < 4 {
        return Ok(None);
    }
    let mut j = i;
    let mut text = Vec::new();
    loop {
        if j >= lines.len() {
            break;
        }
        if is_blank(lines[j]) {
            let mut k = j;
            while k < lines.len() && is_blank(lines[k]) {
                k += 1;
            }
            if k < lines.len() && leading_spaces(lines[k]) >= 4 {
                for _ in j..k {
                    text.push(b'\n');
                }
                j = k;
                continue;
            }
            break;
        }
        if leading_spaces(lines[j]) < 4 {
            break;
        }
        text.extend_from_slice(&lines[j][4..]);
        text.push(b'\n');
        j += 1;
    }
    leaf(tree, NodeKind::BlockCode { text: String::from_utf8_lossy(&text).into_owned(), lang: None })?;
    Ok(Some(j))
}

// ---- Tables -----------------------------------------------------------------------------------

fn split_table_row(line: &[u8]) -> Option<Vec<&[u8]>> {
    if !line.contains(&b'|') {
        return None;
    }
    let mut body = trim(line);
    if body.first() == Some(&b'|') {
        body = &body[1..];
    }
    if body.last() == Some(&b'|') {
        body = &body[..body.len() - 1];
    }
    let mut cells = Vec::new();
    let mut start = 0;
    let mut k = 0;
    while k < body.len() {
        match body[k] {
            b'\\' if k + 1 < body.len() => k += 2,
            b'|' => {
                cells.push(&body[start..k]);
                start = k + 1;
                k += 1;
            }
            _ => k += 1,
        }
    }
    cells.push(&body[start..]);
    Some(cells)
}

fn try_table(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    lines: &[&[u8]],
    i: usize,
) -> Result<Option<usize>> {
    if i + 1 >= lines.len() {
        return Ok(None);
    }
    let Some(header_cells) = split_table_row(lines[i]) else { return Ok(None) };
    let Some(delim_cells) = split_table_row(lines[i + 1]) else { return Ok(None) };
    if delim_cells.len() != header_cells.len() {
        return Ok(None);
    }
    let mut aligns = Vec::with_capacity(delim_cells.len());
    for cell in &delim_cells {
        let c = trim(cell);
        if c.is_empty() || !c.iter().all(|&b| b == b'-' || b == b':') {
            return Ok(None);
        }
        if c.iter().filter(|&&b| b == b'-').count() < 3 {
            return Ok(None);
        }
        let mut flags = CellFlags::empty();
        if c.first() == Some(&b':') {
            flags |= CellFlags::ALIGN_LEFT;
        }
        if c.last() == Some(&b':') {
            flags |= CellFlags::ALIGN_RIGHT;
        }
        aligns.push(flags);
    }

    let columns = header_cells.len();
    let table_id = tree.push(NodeKind::TableBlock { columns })?;
    let header_id = tree.push(NodeKind::TableHeader { columns, aligns: aligns.clone() })?;
    let header_row = tree.push(NodeKind::TableRow)?;
    for (col, cell) in header_cells.iter().enumerate() {
        let cell_id = tree.push(NodeKind::TableCell { col, columns, flags: aligns[col] | CellFlags::HEADER })?;
        inline::parse_span(tree, tables, cfg, false, trim(cell))?;
        tree.pop(cell_id);
    }
    tree.pop(header_row);
    tree.pop(header_id);

    let body_id = tree.push(NodeKind::TableBody)?;
    let mut j = i + 2;
    while j < lines.len() && !is_blank(lines[j]) {
        let Some(cells) = split_table_row(lines[j]) else { break };
        let row_id = tree.push(NodeKind::TableRow)?;
        for col in 0..columns {
            let content = cells.get(col).copied().unwrap_or(b"");
            let cell_id = tree.push(NodeKind::TableCell { col, columns, flags: aligns[col] })?;
            inline::parse_span(tree, tables, cfg, false, trim(content))?;
            tree.pop(cell_id);
        }
        tree.pop(row_id);
        j += 1;
    }
    tree.pop(body_id);
    tree.pop(table_id);
    Ok(Some(j))
}

// ---- Blockquote ---------------------------------------------------------------------------

fn blockquote_prefix_len(line: &[u8]) -> Option<usize> {
    let indent = leading_spaces(line).min(3);
    if line.get(indent) != Some(&b'>') {
        return None;
    }
    let mut len = indent + 1;
    if line.get(len) == Some(&b' ') {
        len += 1;
    }
    Some(len)
}

fn try_blockquote(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    lines: &[&[u8]],
    i: usize,
) -> Result<Option<usize>> {
    if blockquote_prefix_len(lines[i]).is_none() {
        return Ok(None);
    }
    let mut j = i;
    let mut inner = Vec::new();
    loop {
        if j >= lines.len() {
            break;
        }
        if let Some(prefix) = blockquote_prefix_len(lines[j]) {
            inner.extend_from_slice(&lines[j][prefix..]);
            inner.push(b'\n');
            j += 1;
        } else if is_blank(lines[j]) && lines.get(j + 1).is_some_and(|l| blockquote_prefix_len(l).is_some()) {
            inner.push(b'\n');
            j += 1;
        } else {
            break;
        }
    }
    let id = tree.push(NodeKind::Blockquote)?;
    parse_blocks(tree, tables, cfg, &inner)?;
    tree.pop(id);
    Ok(Some(j))
}

// ---- Lists ------------------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

fn match_list_marker(line: &[u8], kind: ListKind, cfg: &Config) -> Option<(usize, u32)> {
    let indent = leading_spaces(line);
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    match kind {
        ListKind::Unordered => {
            if rest.len() >= 2 && matches!(rest[0], b'*' | b'+' | b'-') && rest[1] == b' ' {
                Some((indent + 2, 0))
            } else {
                None
            }
        }
        ListKind::Ordered => {
            let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
            let max_digits = if cfg.options.has(Extensions::COMMONMARK) { 9 } else { usize::MAX };
            if digits == 0 || digits > max_digits {
                return None;
            }
            let term = rest.get(digits);
            let accepted = term == Some(&b'.') || (cfg.options.has(Extensions::COMMONMARK) && term == Some(&b')'));
            if !accepted || rest.get(digits + 1) != Some(&b' ') {
                return None;
            }
            let num: u32 = std::str::from_utf8(&rest[..digits]).ok()?.parse().ok()?;
            Some((indent + digits + 2, num))
        }
    }
}

fn is_fence_start(line: &[u8]) -> bool {
    fence_prefix(line).is_some()
}

fn try_list(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    lines: &[&[u8]],
    i: usize,
    kind: ListKind,
) -> Result<Option<usize>> {
    let Some((_, start_num)) = match_list_marker(lines[i], kind, cfg) else { return Ok(None) };

    let mut items: Vec<(u32, Vec<u8>, bool)> = Vec::new();
    let mut block_style = false;
    let mut j = i;

    while j < lines.len() {
        let Some((marker_len, num)) = match_list_marker(lines[j], kind, cfg) else { break };
        let own_indent = leading_spaces(lines[j]);
        let strip = marker_len;
        let mut item_text = Vec::new();
        item_text.extend_from_slice(&lines[j][strip.min(lines[j].len())..]);
        item_text.push(b'\n');

        let mut k = j + 1;
        let mut has_blank_continuation = false;
        let mut in_fence = false;
        loop {
            if k >= lines.len() {
                break;
            }
            let l = lines[k];
            if is_blank(l) {
                let mut m = k;
                while m < lines.len() && is_blank(lines[m]) {
                    m += 1;
                }
                let continues = m < lines.len()
                    && (in_fence || leading_spaces(lines[m]) >= strip)
                    && match_list_marker(lines[m], kind, cfg).is_none();
                if continues {
                    has_blank_continuation = true;
                    for _ in k..m {
                        item_text.push(b'\n');
                    }
                    k = m;
                    continue;
                }
                break;
            }
            if !in_fence {
                if let Some((_, _)) = match_list_marker(l, kind, cfg) {
                    if leading_spaces(l) <= own_indent {
                        break;
                    }
                }
                if leading_spaces(l) < strip {
                    break;
                }
            }
            if is_fence_start(&l[strip.min(l.len())..]) {
                in_fence = !in_fence;
            }
            item_text.extend_from_slice(&l[strip.min(l.len())..]);
            item_text.push(b'\n');
            k += 1;
        }

        if has_blank_continuation {
            block_style = true;
        }
        items.push((num, item_text, has_blank_continuation));
        j = k;
    }

    let mut flags = match kind {
        ListKind::Unordered => ListFlags::UNORDERED,
        ListKind::Ordered => ListFlags::ORDERED,
    };
    if block_style {
        flags |= ListFlags::BLOCK;
    }

    let list_id = tree.push(NodeKind::List { flags, start: start_num })?;
    for (num, text, _) in &items {
        let item_id = tree.push(NodeKind::ListItem { flags, num: *num })?;
        if block_style {
            parse_blocks(tree, tables, cfg, text)?;
        } else {
            let mut flat = Vec::new();
            crate::text::replace_spacing(&mut flat, trim(text));
            inline::parse_span(tree, tables, cfg, false, &flat)?;
        }
        tree.pop(item_id);
    }
    tree.pop(list_id);
    Ok(Some(j))
}

// ---- Definition lists ---------------------------------------------------------------------

fn deflist_prefix_len(line: &[u8]) -> Option<usize> {
    let indent = leading_spaces(line).min(3);
    if line.get(indent) == Some(&b':') && line.get(indent + 1) == Some(&b' ') {
        Some(indent + 2)
    } else {
        None
    }
}

// ---- Paragraphs, including setext reclassification ---------------------------------------------

fn starts_new_block(line: &[u8], cfg: &Config, is_continuation: bool) -> bool {
    atx_level(line, cfg).is_some()
        || try_hrule_line(line)
        || blockquote_prefix_len(line).is_some()
        || (is_continuation && cfg.options.has(Extensions::DEFLIST) && deflist_prefix_len(line).is_some())
}

fn try_paragraph(
    tree: &mut Tree,
    tables: &mut ReferenceTables,
    cfg: &Config,
    lines: &[&[u8]],
    i: usize,
) -> Result<usize> {
    let mut j = i;
    while j < lines.len() && !is_blank(lines[j]) && !starts_new_block(lines[j], cfg, j > i) {
        j += 1;
    }
    let para_lines = &lines[i..j];

    if j < lines.len() && !para_lines.is_empty() && is_setext_underline(lines[j]) {
        let level = if lines[j].iter().find(|&&b| b != b' ') == Some(&b'=') { 1 } else { 2 };
        if para_lines.len() > 1 {
            emit_paragraph(tree, tables, cfg, &para_lines[..para_lines.len() - 1])?;
        }
        let id = tree.push(NodeKind::Header { level })?;
        inline::parse_span(tree, tables, cfg, false, trim(para_lines[para_lines.len() - 1]))?;
        tree.pop(id);
        return Ok(j + 1);
    }

    if cfg.options.has(Extensions::DEFLIST)
        && para_lines.len() == 1
        && j < lines.len()
        && deflist_prefix_len(lines[j]).is_some()
    {
        let def_id = tree.push(NodeKind::Definition { flags: ListFlags::DEF })?;
        let title_id = tree.push(NodeKind::DefinitionTitle)?;
        inline::parse_span(tree, tables, cfg, false, trim(para_lines[0]))?;
        tree.pop(title_id);
        let mut k = j;
        while k < lines.len() {
            let Some(prefix) = deflist_prefix_len(lines[k]) else { break };
            let data_id = tree.push(NodeKind::DefinitionData)?;
            inline::parse_span(tree, tables, cfg, false, trim(&lines[k][prefix..]))?;
            tree.pop(data_id);
            k += 1;
        }
        tree.pop(def_id);
        return Ok(k);
    }

    emit_paragraph(tree, tables, cfg, para_lines)?;
    Ok(j)
}

fn emit_paragraph(tree: &mut Tree, tables: &mut ReferenceTables, cfg: &Config, para_lines: &[&[u8]]) -> Result<()> {
    if para_lines.is_empty() {
        return Ok(());
    }
    let mut joined = Vec::new();
    for (idx, l) in para_lines.iter().enumerate() {
        if idx > 0 {
            joined.push(b'\n');
        }
        joined.extend_from_slice(l);
    }
    let id = tree.push(NodeKind::Paragraph { lines: para_lines.len(), beoln: false })?;
    inline::parse_span(tree, tables, cfg, false, &joined)?;
    tree.pop(id);
    Ok(())
}
