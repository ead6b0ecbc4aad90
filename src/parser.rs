//! The document driver: orchestrates Pass 1 → Pass 2 and assembles the final [`Document`].
//!
//! Grounded on the upstream algorithm's `lowdown_buf` entry point — create the root, open a
//! document-header region for metadata, run the reference/footnote/metadata scan, then hand the
//! cleaned buffer to the block parser, finishing with a synthesized footnotes section and a
//! document-footer marker.

use crate::block;
use crate::error::Result;
use crate::inline::{self, Config};
use crate::node::{Document, NodeKind, Tree};
use crate::options::{Extensions, Options};
use crate::pass1;

/// Parse `input` under `options`, returning the completed document or
/// [`crate::Error::MaxDepthExceeded`] if the tree nested deeper than `options.maxdepth()` allows.
pub fn parse(input: &[u8], options: &Options) -> Result<Document> {
    log::trace!("parse: {} bytes, extensions={:?}", input.len(), options.extensions());

    let mut tree = Tree::new(options.maxdepth());

    let header_id = tree.push(NodeKind::DocHeader)?;
    let (mut tables, cleaned) = pass1::run(input, options);
    for entry in &tables.metadata {
        let meta_id = tree.push(NodeKind::Meta { key: entry.key.clone(), value: entry.value.clone() })?;
        tree.pop(meta_id);
    }
    tree.pop(header_id);

    let active = inline::build_active_table(options);
    let cfg = Config { options, active: &active };
    block::parse_blocks(&mut tree, &mut tables, &cfg, &cleaned)?;

    if options.has(Extensions::FOOTNOTES) {
        emit_footnotes(&mut tree, &mut tables, &cfg)?;
    }

    let footer_id = tree.push(NodeKind::DocFooter)?;
    tree.pop(footer_id);

    Ok(tree.finish())
}

fn emit_footnotes(tree: &mut Tree, tables: &mut crate::reftable::ReferenceTables, cfg: &Config) -> Result<()> {
    let mut used: Vec<usize> = tables
        .footnotes
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_used)
        .map(|(idx, _)| idx)
        .collect();
    if used.is_empty() {
        return Ok(());
    }
    used.sort_by_key(|&idx| tables.footnotes[idx].num);

    let block_id = tree.push(NodeKind::FootnotesBlock)?;
    for idx in used {
        let num = tables.footnotes[idx].num;
        let contents = tables.footnotes[idx].contents.clone();
        let def_id = tree.push(NodeKind::FootnoteDef { num })?;
        block::parse_blocks(tree, tables, cfg, contents.as_bytes())?;
        tree.pop(def_id);
    }
    tree.pop(block_id);
    Ok(())
}

/// A reusable parser configuration. Construct once per document (or thread; `Parser` is `!Sync`
/// by nothing more than convention — nothing inside it is actually shared).
pub struct Parser {
    options: Options,
}

impl Parser {
    pub fn new(options: Options) -> Self {
        Parser { options }
    }

    pub fn parse(self, input: &[u8]) -> Result<Document> {
        parse(input, &self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn parses_minimal_document_with_markers() {
        let doc = parse(b"hello\n", &Options::new()).unwrap();
        let root = doc.node(doc.root());
        assert!(matches!(root.kind, NodeKind::Root));
        let kinds: Vec<_> = doc.children(doc.root()).iter().map(|&id| &doc.node(id).kind).collect();
        assert!(matches!(kinds[0], NodeKind::DocHeader));
        assert!(matches!(kinds.last().unwrap(), NodeKind::DocFooter));
    }

    #[test]
    fn metadata_entries_become_meta_nodes_under_header() {
        let options = Options::new().with_extensions(Extensions::METADATA);
        let doc = parse(b"title: Hello\n\nbody\n", &options).unwrap();
        let header = doc.children(doc.root())[0];
        let meta = doc.children(header).iter().find_map(|&id| match &doc.node(id).kind {
            NodeKind::Meta { key, value } => Some((key.clone(), value.clone())),
            _ => None,
        });
        assert_eq!(meta, Some(("title".to_string(), Some("Hello".to_string()))));
    }

    #[test]
    fn footnotes_render_in_order_of_first_use() {
        let options = Options::new().with_extensions(Extensions::FOOTNOTES);
        let doc = parse(b"a[^second] b[^first]\n\n[^first]: one\n[^second]: two\n", &options).unwrap();
        let nums: Vec<usize> = doc
            .iter_depth_first()
            .filter_map(|n| match n.kind {
                NodeKind::FootnoteDef { num } => Some(num),
                _ => None,
            })
            .collect();
        assert_eq!(nums, vec![1, 2]);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let options = Options::new().with_maxdepth(3);
        let deeply_nested = "> ".repeat(10) + "x\n";
        assert!(matches!(parse(deeply_nested.as_bytes(), &options), Err(crate::error::Error::MaxDepthExceeded { max: 3 })));
    }

    #[test]
    fn parser_builder_parses() {
        let parser = Parser::new(Options::new());
        let doc = parser.parse(b"hi\n").unwrap();
        assert!(!doc.is_empty());
    }
}
