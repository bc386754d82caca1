//! Dictionary coding (spec §4.5): maps distinct byte strings to small
//! integer ids, used both for local per-column dictionaries
//! (IPv4/HOST/PATH/URL/UUID) and the fixed global SEVERITY vocabulary.

use std::collections::HashMap;

use crate::bits::{Cursor, Writer};
use crate::classify::SEVERITY_VOCAB;
use crate::error::{self, ContainerError, Section};

/// A closed id <-> bytes mapping. Ids are assigned in first-appearance
/// order so the encoded id stream favors small varints for common values.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: Vec<Vec<u8>>,
    ids: HashMap<Vec<u8>, usize>,
}

impl Dictionary {
    #[must_use]
    pub fn build<'a>(values: impl Iterator<Item = &'a [u8]>) -> Self {
        let mut dict = Self::default();
        for v in values {
            dict.intern(v);
        }
        dict
    }

    /// The fixed global SEVERITY dictionary (spec §4.2): every container
    /// carries the same ids for the same severity words, so the column
    /// codec never needs to serialize it.
    #[must_use]
    pub fn severity() -> Self {
        let mut dict = Self::default();
        for word in SEVERITY_VOCAB {
            dict.intern(word.as_bytes());
        }
        dict
    }

    fn intern(&mut self, value: &[u8]) -> usize {
        if let Some(&id) = self.ids.get(value) {
            return id;
        }
        let id = self.entries.len();
        self.entries.push(value.to_vec());
        self.ids.insert(value.to_vec(), id);
        id
    }

    #[must_use]
    pub fn id_of(&self, value: &[u8]) -> Option<usize> {
        self.ids.get(value).copied()
    }

    #[must_use]
    pub fn value_of(&self, id: usize) -> Option<&[u8]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_varint(self.entries.len() as u64);
        for entry in &self.entries {
            w.write_length_prefixed(entry);
        }
    }

    pub fn read(c: &mut Cursor<'_>, section: Section) -> Result<Self, ContainerError> {
        let count = error::read_varint(c, section)? as usize;
        let mut dict = Self::default();
        for _ in 0..count {
            let len = error::read_varint(c, section)? as usize;
            let bytes = c.read_bytes(len)?;
            dict.intern(bytes);
        }
        Ok(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_interning_is_stable() {
        let dict = Dictionary::build([&b"a"[..], b"b", b"a", b"c"].into_iter());
        assert_eq!(dict.id_of(b"a"), Some(0));
        assert_eq!(dict.id_of(b"b"), Some(1));
        assert_eq!(dict.id_of(b"c"), Some(2));
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn test_dictionary_wire_roundtrip() {
        let dict = Dictionary::build([&b"host-a"[..], b"host-b"].into_iter());
        let mut w = Writer::new();
        dict.write(&mut w);
        let bytes = w.into_bytes();
        let mut c = Cursor::new(&bytes);
        let back = Dictionary::read(&mut c, Section::ColumnBlock).unwrap();
        assert_eq!(back.value_of(0), Some(&b"host-a"[..]));
        assert_eq!(back.value_of(1), Some(&b"host-b"[..]));
    }

    #[test]
    fn test_severity_dictionary_matches_vocab_order() {
        let dict = Dictionary::severity();
        for (i, word) in SEVERITY_VOCAB.iter().enumerate() {
            assert_eq!(dict.id_of(word.as_bytes()), Some(i));
        }
    }
}
