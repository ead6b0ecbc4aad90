//! Growable byte buffer mirroring the operations the rest of the crate is grounded on.
//!
//! Byte-level, not rune-level: every index and length in this crate counts bytes, never Unicode
//! scalar values, matching the upstream `struct lowdown_buf` this type stands in for.

/// An owned, contiguous, growable byte sequence.
///
/// On allocation failure the process aborts — this type does not add a fallible wrapper around
/// the global allocator, matching the upstream algorithm's `xmalloc`-or-die convention.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Buffer(Vec<u8>);

impl Buffer {
    pub fn new(cap: usize) -> Self {
        Buffer(Vec::with_capacity(cap))
    }

    pub fn grow(&mut self, n: usize) {
        let additional = n.saturating_sub(self.0.capacity());
        if additional > 0 {
            self.0.reserve(additional);
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    pub fn append_byte(&mut self, b: u8) {
        self.0.push(b);
    }

    pub fn equal_bytes(&self, other: &[u8]) -> bool {
        self.0 == other
    }

    pub fn equal_str(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Decode as UTF-8, replacing ill-formed sequences. Every text-bearing node payload in this
    /// crate is ultimately materialized this way.
    pub fn into_string_lossy(self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl std::ops::Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        Buffer(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Buffer(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_compare() {
        let mut buf = Buffer::new(8);
        buf.append(b"hello");
        buf.append_byte(b'!');
        assert!(buf.equal_bytes(b"hello!"));
        assert!(buf.equal_str("hello!"));
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn grow_does_not_lose_contents() {
        let mut buf = Buffer::new(0);
        buf.append(b"abc");
        buf.grow(256);
        assert!(buf.equal_bytes(b"abc"));
    }
}
