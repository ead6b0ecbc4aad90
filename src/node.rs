//! The AST arena: typed nodes, stable ids, parent back-links, ordered children.
//!
//! Grounded on the upstream algorithm's `struct lowdown_node` / `pushnode`/`popnode` pair, but
//! expressed as a `Vec`-backed arena indexed by [`NodeId`] instead of individually heap-allocated,
//! manually `TAILQ`-linked nodes: this sidesteps the need for `Rc`/`RefCell` (parent is a plain
//! index, not an owning pointer) and makes teardown free (dropping the arena's `Vec` drops every
//! node, no explicit free pass required).

use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A stable index into a [`Document`]'s node arena. `0` always denotes the document's root.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Flags carried by `List` and `ListItem`/`Definition` nodes.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct ListFlags: u32 {
        const ORDERED   = 1 << 0;
        const UNORDERED = 1 << 1;
        const DEF       = 1 << 2;
        /// Items contain blank-line-separated content and are block-parsed rather than
        /// inline-parsed.
        const BLOCK     = 1 << 3;
        /// Internal: signals the enclosing list-item loop to stop. Never observed on a node
        /// returned from a finished parse.
        const LI_END    = 1 << 4;
    }
}

bitflags! {
    /// Alignment/role flags carried by `TableCell` (and the per-column alignment list on
    /// `TableHeader`).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct CellFlags: u32 {
        const ALIGN_LEFT  = 1 << 0;
        const ALIGN_RIGHT = 1 << 1;
        const HEADER      = 1 << 2;
    }
}

/// Which family of address an autolink matched.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AutolinkType {
    Normal,
    Email,
}

/// The variant-tagged payload of a [`Node`]. Rust's enum-with-fields is the natural replacement
/// for the upstream C union-of-structs-plus-tag; each arm below corresponds 1:1 to one
/// `LOWDOWN_*` node type.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeKind {
    // Structural markers.
    Root,
    DocHeader,
    DocFooter,
    Meta { key: String, value: Option<String> },

    // Blocks.
    Paragraph { lines: usize, beoln: bool },
    Header { level: u8 },
    Hrule,
    BlockCode { text: String, lang: Option<String> },
    BlockHtml { text: String },
    Blockquote,
    List { flags: ListFlags, start: u32 },
    ListItem { flags: ListFlags, num: u32 },
    Definition { flags: ListFlags },
    DefinitionTitle,
    DefinitionData,
    TableBlock { columns: usize },
    TableHeader { columns: usize, aligns: Vec<CellFlags> },
    TableBody,
    TableRow,
    TableCell { col: usize, columns: usize, flags: CellFlags },
    FootnotesBlock,
    FootnoteDef { num: usize },
    MathBlock { text: String, blockmode: bool },

    // Inlines.
    NormalText { text: String },
    Emphasis,
    DoubleEmphasis,
    TripleEmphasis,
    Strikethrough,
    Highlight,
    Superscript,
    LineBreak,
    CodeSpan { text: String },
    Entity { text: String },
    RawHtml { text: String },
    Link { link: String, title: Option<String> },
    LinkAuto { kind: AutolinkType, link: String, text: String },
    Image {
        link: String,
        title: Option<String>,
        dims: Option<String>,
        alt: String,
        attr_width: Option<u32>,
        attr_height: Option<u32>,
    },
    FootnoteRef { num: usize },
}

/// A single tree node: its kind/payload, its parent (if any), and its ordered children.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// The parsed document: a node arena plus the id of its root.
///
/// Dropping a `Document` drops every node in the arena — ordinary Rust ownership, unlike the
/// explicit `lowdown_node_free` teardown pass the upstream algorithm requires.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    pub(crate) fn new(nodes: Vec<Node>, root: NodeId) -> Self {
        Document { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// The number of nodes in the document, including structural markers.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first, pre-order traversal starting at the root.
    pub fn iter_depth_first(&self) -> DepthFirstIter<'_> {
        DepthFirstIter {
            doc: self,
            stack: vec![self.root],
        }
    }
}

/// Depth-first pre-order iterator over a [`Document`]'s nodes, returned by
/// [`Document::iter_depth_first`].
pub struct DepthFirstIter<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for DepthFirstIter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.doc.node(id);
        for &child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// Arena under construction during a parse. Owns the "current node" cursor: every block/inline
/// recognizer that opens a node pushes onto `current` and every recognizer that finishes one pops
/// it, incrementing/decrementing `depth` in lockstep.
pub(crate) struct Tree {
    nodes: Vec<Node>,
    current: NodeId,
    depth: usize,
    maxdepth: usize,
}

impl Tree {
    pub(crate) fn new(maxdepth: usize) -> Self {
        let root = Node {
            id: NodeId(0),
            kind: NodeKind::Root,
            parent: None,
            children: Vec::new(),
        };
        Tree {
            nodes: vec![root],
            current: NodeId(0),
            depth: 0,
            maxdepth,
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub(crate) fn current(&self) -> NodeId {
        self.current
    }

    /// Push a new node of `kind` as a child of the current cursor, make it the new cursor, and
    /// return its id. Fails if this would exceed `maxdepth`.
    pub(crate) fn push(&mut self, kind: NodeKind) -> crate::error::Result<NodeId> {
        if self.maxdepth != 0 && self.depth + 1 > self.maxdepth {
            log::debug!("parse tree depth limit ({}) exceeded", self.maxdepth);
            return Err(crate::error::Error::MaxDepthExceeded { max: self.maxdepth });
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            kind,
            parent: Some(self.current),
            children: Vec::new(),
        });
        self.nodes[self.current.index()].children.push(id);
        self.current = id;
        self.depth += 1;
        Ok(id)
    }

    /// Pop the cursor back to `n`'s parent. `n` must be the current cursor.
    pub(crate) fn pop(&mut self, n: NodeId) {
        debug_assert_eq!(self.current, n, "popnode called out of order");
        debug_assert!(self.depth > 0);
        self.depth -= 1;
        self.current = self.nodes[n.index()]
            .parent
            .expect("popped node must have a parent");
    }

    /// Returns the kind of the node currently at the front of the cursor's children, if any.
    pub(crate) fn last_child_kind(&self, parent: NodeId) -> Option<&NodeKind> {
        self.nodes[parent.index()]
            .children
            .last()
            .map(|id| &self.nodes[id.index()].kind)
    }

    pub(crate) fn last_child_mut(&mut self, parent: NodeId) -> Option<&mut Node> {
        let id = *self.nodes[parent.index()].children.last()?;
        Some(&mut self.nodes[id.index()])
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn finish(self) -> Document {
        Document::new(self.nodes, NodeId(0))
    }
}
