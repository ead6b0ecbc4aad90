//! Per-document reference tables: link definitions, footnote definitions, and metadata pairs.
//!
//! Populated once, append-only, during Pass 1 ([`crate::pass1`]); read (and, for footnotes,
//! mutated in place to record first use) during Pass 2. Lookup is a linear scan, grounded on the
//! upstream algorithm's `find_link_ref`/`find_footnote_ref` — appropriate at the scale a single
//! Markdown document's reference tables actually reach (tens of entries, not thousands).

/// A `[name]: link "title"` reference-style link definition.
#[derive(Clone, Debug, Default)]
pub struct LinkRef {
    /// Absent only for the degenerate "default" reference used by some callers; ordinary
    /// definitions always carry a name.
    pub name: Option<String>,
    pub link: String,
    pub title: Option<String>,
}

/// A `[^name]: contents` footnote definition.
#[derive(Clone, Debug, Default)]
pub struct FootnoteRef {
    pub name: Option<String>,
    pub contents: String,
    /// Set the first time this footnote is referenced from inline content. A second reference to
    /// an already-used footnote renders as literal text instead of a second `FootnoteRef` node —
    /// a deliberate upstream quirk, preserved rather than fixed.
    pub is_used: bool,
    /// 1-based order of first use; `0` until used.
    pub num: usize,
}

/// A single `key: value` front-matter entry.
#[derive(Clone, Debug, Default)]
pub struct MetadataEntry {
    pub key: String,
    pub value: Option<String>,
}

/// The three tables Pass 1 populates and Pass 2 consults.
#[derive(Clone, Debug, Default)]
pub struct ReferenceTables {
    pub link_refs: Vec<LinkRef>,
    pub footnotes: Vec<FootnoteRef>,
    pub metadata: Vec<MetadataEntry>,
}

impl ReferenceTables {
    pub fn find_link(&self, name: &str) -> Option<&LinkRef> {
        self.link_refs
            .iter()
            .find(|r| name_matches(r.name.as_deref(), name))
    }

    /// Returns the index of the matching footnote, if any, so the caller can mutate
    /// `is_used`/`num` in place.
    pub fn find_footnote_index(&self, name: &str) -> Option<usize> {
        self.footnotes
            .iter()
            .position(|f| name_matches(f.name.as_deref(), name))
    }

    pub fn find_metadata(&self, key: &str) -> Option<&MetadataEntry> {
        self.metadata.iter().find(|m| m.key == key)
    }
}

/// Absence of a name on both sides matches (the "default" reference); otherwise names compare
/// byte-exact, case-sensitive.
fn name_matches(have: Option<&str>, want: &str) -> bool {
    match have {
        None => want.is_empty(),
        Some(h) => h == want,
    }
}

/// Normalize a metadata key: ASCII letters/digits/`-`/`_` are lowercased and kept, whitespace is
/// dropped, anything else becomes `?`. Shared by [`crate::pass1`] (building the metadata table) and
/// [`crate::inline`] (resolving `[%key]` metadata references) so the two always agree.
pub(crate) fn normalize_key(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_whitespace() {
            continue;
        } else if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push((b as char).to_ascii_lowercase());
        } else {
            out.push('?');
        }
    }
    out
}
