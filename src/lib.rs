//! A two-pass Markdown parser: Pass 1 scans for reference-style link definitions, footnote
//! definitions, and optional front-matter metadata; Pass 2 recursively parses blocks, dispatching
//! to an active-character-driven inline parser, and emits a typed AST rooted at a single
//! [`Document`].
//!
//! Rendering, CLI plumbing, sandboxing, and file/network I/O are all out of scope — this crate
//! turns bytes into a tree and stops there. See [`parse`] and [`Parser`] for the entry points, and
//! [`node`] for the AST shape renderers walk.

mod autolink;
mod block;
mod buffer;
mod byte_lookup;
mod error;
mod inline;
mod node;
mod options;
mod parser;
mod pass1;
mod reftable;
mod text;

pub use buffer::Buffer;
pub use error::{Error, Result};
pub use node::{AutolinkType, CellFlags, DepthFirstIter, Document, ListFlags, Node, NodeId, NodeKind};
pub use options::{Extensions, Options, DEFAULT_MAX_DEPTH};
pub use parser::{parse, Parser};
pub use reftable::{FootnoteRef, LinkRef, MetadataEntry, ReferenceTables};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_parses_a_document() {
        let doc = parse(b"# Title\n\nSome *text*.\n", &Options::new()).unwrap();
        assert!(!doc.is_empty());
        let has_header = doc.iter_depth_first().any(|n| matches!(n.kind, NodeKind::Header { level: 0 }));
        assert!(has_header);
    }

    #[test]
    fn builder_api_matches_free_function() {
        let options = Options::new().with_extensions(Extensions::FOOTNOTES | Extensions::TABLES);
        let a = parse(b"hi\n", &options).unwrap();
        let b = Parser::new(options).parse(b"hi\n").unwrap();
        assert_eq!(a.len(), b.len());
    }
}
