//! Self-describing binary container (spec §6, §7): magic `LSC1`, a fixed
//! header, an entropy-coded body of independently addressable sections, and
//! a footer recording where each one lives so a reader can seek straight to
//! the columns a query actually needs (spec §4.7's column-pruning
//! invariant) without decoding the rest of the file.
//!
//! Split into `write`/`read` the way the teacher splits serialization from
//! `read::Reader`, since the two sides share almost no logic beyond the
//! section layout defined here.

pub mod read;
pub mod write;

use bitflags::bitflags;

pub use read::Container;
pub use write::write;

/// Magic bytes at the start of every container.
pub const MAGIC: [u8; 4] = *b"LSC1";
pub const VERSION: u16 = 1;

/// Fixed-size header: magic(4) + version(2) + flags(2) + footer_offset(8).
pub const HEADER_LEN: usize = 4 + 2 + 2 + 8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ContainerFlags: u16 {
        /// Bit 0 (spec §6): an entropy dictionary trained on column payloads
        /// is embedded in the body and every section was compressed with it.
        const DICTIONARY_PRESENT = 0b0000_0001;
    }
}

/// One column's location within the file, found via the footer's
/// directory rather than by scanning — this is what makes column pruning
/// an O(1)-seek operation instead of a linear decode.
#[derive(Debug, Clone, Copy)]
pub struct ColumnLocation {
    pub offset: u64,
    pub compressed_len: u64,
}

/// Parsed footer: every section's location plus the checksum covering the
/// whole body (spec §7's `ChecksumMismatch`).
#[derive(Debug, Clone)]
pub struct Footer {
    pub n_lines: u64,
    pub n_templates: u32,
    pub template_table: ColumnLocation,
    pub globals: ColumnLocation,
    pub tid_stream: ColumnLocation,
    /// Flattened column directory: `columns[template_id][column_index]`.
    pub columns: Vec<Vec<ColumnLocation>>,
    /// Raw (uncompressed) embedded zstd dictionary, present iff
    /// [`ContainerFlags::DICTIONARY_PRESENT`] is set.
    pub dictionary: Option<ColumnLocation>,
    pub crc32: u32,
}

/// Reader lifecycle (spec §4.8). This implementation parses the footer
/// immediately after the header — the footer lives outside any entropy
/// frame at a known offset, so reading it costs nothing and is what makes
/// a footer-only `count()` and column pruning possible. Body sections
/// (template table, token pool, tid stream, columns) are decoded lazily on
/// first access, entering `BodyDecoded` at that point; see `DESIGN.md` for
/// why this trades the spec's literal `BODY_DECODED -> FOOTER_READ` order
/// for `FooterRead -> BodyDecoded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Unopened,
    HeaderParsed,
    FooterRead,
    BodyDecoded,
    Ready,
}
