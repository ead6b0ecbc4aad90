//! End-to-end coverage: feed whole documents through [`mdast::parse`] and assert on the resulting
//! AST shape rather than any rendered form (there is no renderer in this crate).

use mdast::{parse, AutolinkType, CellFlags, Extensions, ListFlags, NodeKind, Options};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn kinds_containing<'a>(doc: &'a mdast::Document, pred: impl Fn(&NodeKind) -> bool) -> Vec<&'a NodeKind> {
    doc.iter_depth_first().map(|n| &n.kind).filter(|k| pred(k)).collect()
}

#[test]
fn heading_paragraph_and_list_roundtrip_into_an_ast() {
    init_logger();
    let doc = parse(b"# Title\n\nSome *text* and a [link](http://example.com).\n\n- one\n- two\n", &Options::new()).unwrap();

    let headers = kinds_containing(&doc, |k| matches!(k, NodeKind::Header { .. }));
    assert_eq!(headers.len(), 1);
    assert!(matches!(headers[0], NodeKind::Header { level: 0 }));

    assert!(doc.iter_depth_first().any(|n| matches!(n.kind, NodeKind::Emphasis)));

    let link = doc.iter_depth_first().find_map(|n| match &n.kind {
        NodeKind::Link { link, .. } => Some(link.clone()),
        _ => None,
    });
    assert_eq!(link.as_deref(), Some("http://example.com"));

    let items = kinds_containing(&doc, |k| matches!(k, NodeKind::ListItem { .. }));
    assert_eq!(items.len(), 2);
}

#[test]
fn reference_style_links_resolve_across_the_whole_document() {
    let src = b"See [the docs][ref] for more.\n\n[ref]: http://example.com/docs \"Docs\"\n";
    let doc = parse(src, &Options::new()).unwrap();
    let (link, title) = doc
        .iter_depth_first()
        .find_map(|n| match &n.kind {
            NodeKind::Link { link, title } => Some((link.clone(), title.clone())),
            _ => None,
        })
        .expect("reference link should resolve");
    assert_eq!(link, "http://example.com/docs");
    assert_eq!(title.as_deref(), Some("Docs"));
}

#[test]
fn footnotes_are_collected_into_a_trailing_block_in_first_use_order() {
    let options = Options::new().with_extensions(Extensions::FOOTNOTES);
    let src = b"first claim[^b], second claim[^a]\n\n[^a]: A note\n[^b]: B note\n";
    let doc = parse(src, &options).unwrap();

    let root_children = doc.children(doc.root());
    let footnotes_block = root_children
        .iter()
        .find(|&&id| matches!(doc.node(id).kind, NodeKind::FootnotesBlock))
        .copied()
        .expect("a footnotes block should be emitted");

    let nums: Vec<usize> = doc
        .children(footnotes_block)
        .iter()
        .filter_map(|&id| match doc.node(id).kind {
            NodeKind::FootnoteDef { num } => Some(num),
            _ => None,
        })
        .collect();
    assert_eq!(nums, vec![1, 2], "footnotes ordered by first reference, not by definition order");
}

#[test]
fn metadata_front_matter_becomes_meta_nodes_under_the_document_header() {
    let options = Options::new().with_extensions(Extensions::METADATA);
    let src = b"title: My Document\nauthor: Jane\n\nBody text.\n";
    let doc = parse(src, &options).unwrap();

    let header = doc.children(doc.root())[0];
    assert!(matches!(doc.node(header).kind, NodeKind::DocHeader));

    let entries: Vec<(String, Option<String>)> = doc
        .children(header)
        .iter()
        .filter_map(|&id| match &doc.node(id).kind {
            NodeKind::Meta { key, value } => Some((key.clone(), value.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(entries[0], ("title".to_string(), Some("My Document".to_string())), "title sorts first");
    assert!(entries.iter().any(|(k, v)| k == "author" && v.as_deref() == Some("Jane")));
}

#[test]
fn metadata_overrides_supplied_by_the_caller_take_precedence() {
    let options = Options::new()
        .with_extensions(Extensions::METADATA)
        .with_metadata_overrides(vec![("title".to_string(), "Overridden".to_string())]);
    let doc = parse(b"title: Original\n\nbody\n", &options).unwrap();
    let header = doc.children(doc.root())[0];
    let title = doc.children(header).iter().find_map(|&id| match &doc.node(id).kind {
        NodeKind::Meta { key, value } if key == "title" => Some(value.clone()),
        _ => None,
    });
    assert_eq!(title, Some(Some("Overridden".to_string())));
}

#[test]
fn blockquotes_and_nested_lists_recurse_through_the_block_parser() {
    let doc = parse(b"> # Quoted heading\n>\n> - nested one\n> - nested two\n", &Options::new()).unwrap();
    assert!(doc.iter_depth_first().any(|n| matches!(n.kind, NodeKind::Blockquote)));
    assert!(doc.iter_depth_first().any(|n| matches!(n.kind, NodeKind::Header { .. })));
    let items = kinds_containing(&doc, |k| matches!(k, NodeKind::ListItem { .. }));
    assert_eq!(items.len(), 2);
}

#[test]
fn fenced_code_blocks_are_not_inline_parsed() {
    let options = Options::new().with_extensions(Extensions::FENCED);
    let doc = parse(b"```rust\nlet x = *y;\n```\n", &options).unwrap();
    let code = doc.iter_depth_first().find_map(|n| match &n.kind {
        NodeKind::BlockCode { text, lang } => Some((text.clone(), lang.clone())),
        _ => None,
    });
    assert_eq!(code, Some(("let x = *y;\n".to_string(), Some("rust".to_string()))));
    assert!(!doc.iter_depth_first().any(|n| matches!(n.kind, NodeKind::Emphasis)));
}

#[test]
fn tables_carry_per_column_alignment_and_pad_short_rows() {
    let options = Options::new().with_extensions(Extensions::TABLES);
    let doc = parse(b"Name|Score\n:---|---:\nAda|100\nGrace|\n", &options).unwrap();

    let header_aligns = doc.iter_depth_first().find_map(|n| match &n.kind {
        NodeKind::TableHeader { aligns, .. } => Some(aligns.clone()),
        _ => None,
    });
    let aligns = header_aligns.expect("table header should be present");
    assert!(aligns[0].contains(CellFlags::ALIGN_LEFT));
    assert!(aligns[1].contains(CellFlags::ALIGN_RIGHT));

    let rows = kinds_containing(&doc, |k| matches!(k, NodeKind::TableRow));
    assert_eq!(rows.len(), 3, "one header row plus two body rows");
}

#[test]
fn html_blocks_pass_through_unparsed_while_inline_html_is_recognized() {
    let doc = parse(b"<div>\n  raw *not emphasis*\n</div>\n\nback to <em>inline</em> text.\n", &Options::new()).unwrap();
    let block_html = doc.iter_depth_first().any(|n| matches!(n.kind, NodeKind::BlockHtml { .. }));
    assert!(block_html);
    assert!(!doc.iter_depth_first().any(|n| matches!(n.kind, NodeKind::Emphasis)));
    assert!(doc.iter_depth_first().any(|n| matches!(n.kind, NodeKind::RawHtml { .. })));
}

#[test]
fn autolinks_recognize_bare_urls_and_angle_bracket_forms() {
    let options = Options::new().with_extensions(Extensions::AUTOLINK);
    let doc = parse(b"visit http://example.com or <mailto:a@example.com> today\n", &options).unwrap();
    let autolinks: Vec<(AutolinkType, String)> = doc
        .iter_depth_first()
        .filter_map(|n| match &n.kind {
            NodeKind::LinkAuto { kind, link, .. } => Some((*kind, link.clone())),
            _ => None,
        })
        .collect();
    assert!(autolinks.iter().any(|(k, l)| matches!(k, AutolinkType::Normal) && l == "http://example.com"));
    assert!(autolinks.iter().any(|(_, l)| l == "mailto:a@example.com"));
}

#[test]
fn setext_headers_reclassify_the_preceding_paragraph_line() {
    let doc = parse(b"Intro line.\n\nBig Heading\n===========\n", &Options::new()).unwrap();
    let paragraphs = kinds_containing(&doc, |k| matches!(k, NodeKind::Paragraph { .. }));
    assert_eq!(paragraphs.len(), 1, "only the unrelated intro paragraph remains a paragraph");
    let headers = kinds_containing(&doc, |k| matches!(k, NodeKind::Header { .. }));
    assert_eq!(headers.len(), 1);
}

#[test]
fn definition_lists_are_gated_on_the_deflist_extension() {
    let src = b"Term\n: First definition\n: Second definition\n";

    let without = parse(src, &Options::new()).unwrap();
    assert!(!without.iter_depth_first().any(|n| matches!(n.kind, NodeKind::Definition { .. })));

    let with = parse(src, &Options::new().with_extensions(Extensions::DEFLIST)).unwrap();
    let data_nodes = kinds_containing(&with, |k| matches!(k, NodeKind::DefinitionData));
    assert_eq!(data_nodes.len(), 2);
}

#[test]
fn block_style_list_items_are_flagged_and_block_parsed() {
    let src = "- first item\n\n  continued paragraph\n\n- second item\n";
    let doc = parse(src.as_bytes(), &Options::new()).unwrap();
    let list_flags = doc.iter_depth_first().find_map(|n| match n.kind {
        NodeKind::List { flags, .. } => Some(flags),
        _ => None,
    });
    assert!(list_flags.unwrap().contains(ListFlags::BLOCK));
    let paragraphs = kinds_containing(&doc, |k| matches!(k, NodeKind::Paragraph { .. }));
    assert_eq!(paragraphs.len(), 2, "item text plus the blank-line-separated continuation");
}

#[test]
fn exceeding_the_depth_limit_returns_an_error_instead_of_panicking() {
    let options = Options::new().with_maxdepth(4);
    let deeply_nested = "> ".repeat(20) + "too deep\n";
    let result = parse(deeply_nested.as_bytes(), &options);
    assert!(matches!(result, Err(mdast::Error::MaxDepthExceeded { max: 4 })));
}

#[test]
fn unbounded_depth_is_the_documented_escape_hatch() {
    let options = Options::new().with_maxdepth(0);
    let deeply_nested = "> ".repeat(50) + "fine\n";
    assert!(parse(deeply_nested.as_bytes(), &options).is_ok());
}

#[test]
fn byte_order_mark_and_crlf_newlines_are_normalized_away() {
    let mut src = vec![0xEF, 0xBB, 0xBF];
    src.extend_from_slice(b"# Title\r\n\r\nbody\r\n");
    let doc = parse(&src, &Options::new()).unwrap();
    let text = doc.iter_depth_first().find_map(|n| match &n.kind {
        NodeKind::NormalText { text } => Some(text.clone()),
        _ => None,
    });
    assert_eq!(text.as_deref(), Some("Title"));
}
