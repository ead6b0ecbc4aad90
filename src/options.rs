//! Parser configuration: the extension bitmask and the small set of numeric limits.

use bitflags::bitflags;

bitflags! {
    /// Optional dialect extensions beyond the traditional Markdown core. Mirrors the
    /// `ext_flags` bitmask this crate's algorithm is grounded on, one flag per named extension.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct Extensions: u32 {
        /// Pipe tables with an alignment row.
        const TABLES            = 1 << 0;
        /// Fenced code blocks (``` / ~~~).
        const FENCED             = 1 << 1;
        /// `[^name]` footnote references and definitions.
        const FOOTNOTES          = 1 << 2;
        /// Bare URL/`www.`/email autolinking outside of `<...>`.
        const AUTOLINK           = 1 << 3;
        /// `~~strikethrough~~`.
        const STRIKE             = 1 << 4;
        /// `==highlight==`.
        const HILITE             = 1 << 5;
        /// `^superscript^`.
        const SUPER              = 1 << 6;
        /// `$inline$` and `$$block$$` math spans.
        const MATH               = 1 << 7;
        /// Reject single `*`/`_` emphasis when it would split a word.
        const NO_INTRA_EMPHASIS  = 1 << 8;
        /// Disable 4-space indented code blocks.
        const NO_CODE_INDENT     = 1 << 9;
        /// Leading `key: value` front matter.
        const METADATA           = 1 << 10;
        /// CommonMark-flavored tweaks to ATX headers, ordered lists, and escaped linebreaks.
        const COMMONMARK         = 1 << 11;
        /// `: definition` lists following a one-line paragraph.
        const DEFLIST            = 1 << 12;
        /// `{width= height=}` attributes following an image.
        const IMG_EXT            = 1 << 13;
    }
}

/// Default tree-depth limit; matches the upstream algorithm's default. `0` means unbounded.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Parser configuration: which extensions are active, the depth limit, and any metadata key/value
/// pairs supplied by the caller that should override what Pass 1 finds in the document's own front
/// matter.
#[derive(Clone, Debug)]
pub struct Options {
    extensions: Extensions,
    maxdepth: usize,
    metadata_overrides: Vec<(String, String)>,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    pub fn new() -> Self {
        Self {
            extensions: Extensions::empty(),
            maxdepth: DEFAULT_MAX_DEPTH,
            metadata_overrides: Vec::new(),
        }
    }

    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_maxdepth(mut self, maxdepth: usize) -> Self {
        self.maxdepth = maxdepth;
        self
    }

    pub fn with_metadata_overrides(mut self, overrides: Vec<(String, String)>) -> Self {
        self.metadata_overrides = overrides;
        self
    }

    pub fn extensions(&self) -> Extensions {
        self.extensions
    }

    pub fn maxdepth(&self) -> usize {
        self.maxdepth
    }

    pub fn metadata_overrides(&self) -> &[(String, String)] {
        &self.metadata_overrides
    }

    pub fn has(&self, flag: Extensions) -> bool {
        self.extensions.contains(flag)
    }
}
